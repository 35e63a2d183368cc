use crate::error::SetupError;
use crate::parser::types::{Collection, Folder, Request, ROOT_FOLDER};
use std::collections::{HashMap, HashSet};

/// Request id -> folder name, built once per run.
///
/// When a request is listed by several folders the first folder in
/// collection order owns it.
#[derive(Debug, Clone, Default)]
pub struct FolderIndex {
    owners: HashMap<String, String>,
}

impl FolderIndex {
    pub fn build(collection: &Collection) -> Self {
        let mut owners = HashMap::new();
        for folder in &collection.folders {
            for id in folder.order.iter().flatten() {
                owners
                    .entry(id.clone())
                    .or_insert_with(|| folder.name.clone());
            }
        }
        Self { owners }
    }

    /// Folder that owns the request, `root` when none does
    pub fn folder_of(&self, request_id: &str) -> &str {
        self.owners
            .get(request_id)
            .map(String::as_str)
            .unwrap_or(ROOT_FOLDER)
    }
}

/// Find a folder by name
pub fn resolve_folder<'a>(collection: &'a Collection, name: &str) -> Result<&'a Folder, SetupError> {
    collection
        .folders
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| SetupError::FolderNotFound(name.to_string()))
}

/// Keep the requests listed by the folder, in collection order
pub fn filter_by_folder(requests: Vec<Request>, folder: &Folder) -> Vec<Request> {
    let Some(order) = &folder.order else {
        return Vec::new();
    };
    let members: HashSet<&str> = order.iter().map(String::as_str).collect();

    requests
        .into_iter()
        .filter(|r| members.contains(r.id.as_str()))
        .collect()
}

/// Tag every request with the folder it is grouped under in reports
pub fn tag_folder_membership(requests: &mut [Request], index: &FolderIndex) {
    for request in requests {
        request.folder_name = Some(index.folder_of(&request.id).to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection() -> Collection {
        serde_json::from_str(
            r#"{
                "name": "shop",
                "folders": [
                    {"name": "Cart", "order": ["r3", "r1"]},
                    {"name": "Dup", "order": ["r1"]},
                    {"name": "Empty"}
                ],
                "requests": [{"id": "r1"}, {"id": "r2"}, {"id": "r3"}]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_missing_folder_is_setup_error() {
        let c = collection();
        let err = resolve_folder(&c, "Nope").unwrap_err();
        assert_eq!(err.to_string(), "The folder [Nope] does not exist.");
    }

    #[test]
    fn test_filter_keeps_collection_order() {
        let c = collection();
        let folder = resolve_folder(&c, "Cart").unwrap();
        let filtered = filter_by_folder(c.requests.clone(), folder);
        let ids: Vec<&str> = filtered.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["r1", "r3"]);
    }

    #[test]
    fn test_folder_without_order_is_empty() {
        let c = collection();
        let folder = resolve_folder(&c, "Empty").unwrap();
        assert!(filter_by_folder(c.requests.clone(), folder).is_empty());
    }

    #[test]
    fn test_tagging_first_folder_wins() {
        let c = collection();
        let index = FolderIndex::build(&c);
        let mut requests = c.requests.clone();
        tag_folder_membership(&mut requests, &index);

        assert_eq!(requests[0].folder(), "Cart");
        assert_eq!(requests[1].folder(), "root");
        assert_eq!(requests[2].folder(), "Cart");
    }
}
