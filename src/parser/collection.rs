use super::types::{Collection, Request};
use crate::error::ParseError;
use std::collections::HashSet;
use std::path::Path;

/// Parse a collection JSON file
pub fn load_collection(path: &Path) -> Result<Collection, ParseError> {
    let content = std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    serde_json::from_str(&content).map_err(|source| ParseError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Requests in run order: the collection's own order, then each folder's
/// order, then whatever was not referenced, in array order.
pub fn ordered_requests(collection: &Collection) -> Vec<Request> {
    let declared = collection
        .order
        .iter()
        .flatten()
        .chain(collection.folders.iter().flat_map(|f| f.order.iter().flatten()));

    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(collection.requests.len());

    for id in declared {
        if seen.contains(id.as_str()) {
            continue;
        }
        if let Some(request) = collection.requests.iter().find(|r| &r.id == id) {
            seen.insert(id.as_str());
            ordered.push(request.clone());
        }
    }

    for request in &collection.requests {
        if seen.insert(request.id.as_str()) {
            ordered.push(request.clone());
        }
    }

    ordered
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collection(json: &str) -> Collection {
        serde_json::from_str(json).unwrap()
    }

    fn ids(requests: &[Request]) -> Vec<&str> {
        requests.iter().map(|r| r.id.as_str()).collect()
    }

    #[test]
    fn test_array_order_without_declared_order() {
        let c = collection(r#"{"name": "c", "requests": [{"id": "b"}, {"id": "a"}]}"#);
        assert_eq!(ids(&ordered_requests(&c)), vec!["b", "a"]);
    }

    #[test]
    fn test_root_then_folders_then_leftovers() {
        let c = collection(
            r#"{
                "name": "c",
                "order": ["c3", "missing"],
                "folders": [
                    {"name": "F", "order": ["c2", "c1"]},
                    {"name": "G", "order": ["c1"]}
                ],
                "requests": [{"id": "c1"}, {"id": "c2"}, {"id": "c3"}, {"id": "c4"}]
            }"#,
        );
        assert_eq!(ids(&ordered_requests(&c)), vec!["c3", "c2", "c1", "c4"]);
    }
}
