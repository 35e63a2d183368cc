use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Folder tag used for requests that are not part of any folder
pub const ROOT_FOLDER: &str = "root";

/// Marker prefixed to request names once one of their runs failed
pub const FAIL_MARKER: &str = "FAIL:";

/// Marker used in display names of passing runs
pub const PASS_MARKER: &str = "PASS:";

/// A named variable, as stored in environments, globals and data rows.
///
/// Fields other than `key` and `value` (`type`, `enabled`, ...) are kept
/// untouched so documents round-trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: String,

    #[serde(default)]
    pub value: Value,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl KeyValue {
    pub fn new(key: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            extra: Map::new(),
        }
    }

    /// Value as it is substituted into requests and report names
    pub fn value_string(&self) -> String {
        value_to_string(&self.value)
    }
}

/// Render a JSON value the way variables are printed: strings bare, the rest as JSON
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// One record of a data file
pub type DataRow = Vec<KeyValue>;

/// Render a data row as `[name:value]` suffixes, in row order
pub fn data_row_suffix(row: &[KeyValue]) -> String {
    row.iter()
        .map(|kv| format!("[{}:{}]", kv.key, kv.value_string()))
        .collect()
}

/// Environment document (`{ id, name, values }`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Environment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub values: Vec<KeyValue>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A request collection as exported by the collection editor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Collection {
    #[serde(default)]
    pub id: String,

    #[serde(default)]
    pub name: String,

    /// Ids of requests living directly under the collection
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,

    #[serde(default)]
    pub folders: Vec<Folder>,

    #[serde(default)]
    pub requests: Vec<Request>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Collection {
    pub fn request_mut(&mut self, id: &str) -> Option<&mut Request> {
        self.requests.iter_mut().find(|r| r.id == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Folder {
    #[serde(default)]
    pub id: String,

    pub name: String,

    /// Member request ids, in the folder's own order
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Vec<String>>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    pub id: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub url: String,

    #[serde(default = "default_method")]
    pub method: String,

    /// Either legacy `Key: Value` lines or an array of `{ key, value }`
    #[serde(default)]
    pub headers: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_mode: Option<String>,

    /// Form entries for `urlencoded` / `params` modes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_mode_data: Option<String>,

    /// Test script evaluated against the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<String>,

    #[serde(default)]
    pub responses: Vec<Value>,

    /// Folder tag, set once before the first iteration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder_name: Option<String>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_method() -> String {
    "GET".to_string()
}

impl Request {
    pub fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            method: default_method(),
            headers: Value::Null,
            data_mode: None,
            data: None,
            raw_mode_data: None,
            tests: None,
            responses: Vec::new(),
            folder_name: None,
            extra: Map::new(),
        }
    }

    /// Folder tag, `root` when untagged
    pub fn folder(&self) -> &str {
        self.folder_name.as_deref().unwrap_or(ROOT_FOLDER)
    }

    /// Header pairs in declaration order, disabled entries skipped
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        match &self.headers {
            Value::String(lines) => lines
                .lines()
                .filter_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    let name = name.trim();
                    if name.is_empty() {
                        return None;
                    }
                    Some((name.to_string(), value.trim().to_string()))
                })
                .collect(),
            Value::Array(entries) => form_pairs(entries),
            _ => Vec::new(),
        }
    }

    /// Form entries of `urlencoded` / `params` bodies
    pub fn form_pairs(&self) -> Vec<(String, String)> {
        match &self.data {
            Some(Value::Array(entries)) => form_pairs(entries),
            _ => Vec::new(),
        }
    }

    pub fn is_marked_failed(&self) -> bool {
        self.name.starts_with(FAIL_MARKER)
    }

    pub fn mark_failed(&mut self) {
        if !self.is_marked_failed() {
            self.name = format!("{} {}", FAIL_MARKER, self.name);
        }
    }

    pub fn push_response(&mut self, record: ResponseRecord) {
        match serde_json::to_value(record) {
            Ok(value) => self.responses.push(value),
            Err(e) => log::warn!("Could not store response for {}: {}", self.id, e),
        }
    }
}

fn form_pairs(entries: &[Value]) -> Vec<(String, String)> {
    entries
        .iter()
        .filter(|entry| entry.get("enabled").and_then(Value::as_bool) != Some(false))
        .filter_map(|entry| {
            let key = entry.get("key")?.as_str()?;
            let value = entry.get("value").map(value_to_string).unwrap_or_default();
            Some((key.to_string(), value))
        })
        .collect()
}

/// A request after variable substitution, as it went on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedRequest {
    pub url: String,
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub data: Value,
    pub data_mode: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseCode {
    pub code: u16,
    pub name: String,
    pub detail: String,
}

impl ResponseCode {
    pub fn new(code: u16) -> Self {
        Self {
            code,
            ..Default::default()
        }
    }
}

/// Entry appended to a request's `responses` history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRecord {
    pub response_code: ResponseCode,
    pub time: u64,
    pub headers: BTreeMap<String, String>,
    pub text: String,
    pub language: String,
    pub id: String,
    pub name: String,
    pub request: ResolvedRequest,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_keeps_unknown_fields() {
        let json = r#"{
            "id": "c1",
            "name": "Users",
            "synced": false,
            "folders": [{ "id": "f1", "name": "Admin", "order": ["r1"], "owner": 7 }],
            "requests": [{
                "id": "r1",
                "name": "List users",
                "url": "{{host}}/users",
                "headers": "Accept: application/json\n",
                "collectionId": "c1"
            }]
        }"#;

        let collection: Collection = serde_json::from_str(json).unwrap();
        assert_eq!(collection.requests[0].method, "GET");
        assert_eq!(collection.extra.get("synced"), Some(&Value::Bool(false)));

        let out = serde_json::to_value(&collection).unwrap();
        assert_eq!(out["folders"][0]["owner"], 7);
        assert_eq!(out["requests"][0]["collectionId"], "c1");
        assert!(out["requests"][0].get("folderName").is_none());
    }

    #[test]
    fn test_header_pairs_from_lines_and_arrays() {
        let mut request = Request::new("r1", "Get", "http://localhost");
        request.headers = Value::String("Accept: text/plain\nX-Token: a:b\n\n".to_string());
        assert_eq!(
            request.header_pairs(),
            vec![
                ("Accept".to_string(), "text/plain".to_string()),
                ("X-Token".to_string(), "a:b".to_string()),
            ]
        );

        request.headers = serde_json::json!([
            { "key": "Accept", "value": "*/*" },
            { "key": "X-Off", "value": "1", "enabled": false }
        ]);
        assert_eq!(
            request.header_pairs(),
            vec![("Accept".to_string(), "*/*".to_string())]
        );
    }

    #[test]
    fn test_mark_failed_once() {
        let mut request = Request::new("r1", "Get", "http://localhost");
        request.mark_failed();
        request.mark_failed();
        assert_eq!(request.name, "FAIL: Get");
    }

    #[test]
    fn test_data_row_suffix() {
        let row = vec![KeyValue::new("x", "1"), KeyValue::new("n", 2)];
        assert_eq!(data_row_suffix(&row), "[x:1][n:2]");
    }
}
