use crate::parser::types::{Collection, Environment, KeyValue};
use crate::runner::state::SummaryResult;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Single-document run summary, in the layout older tooling reads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDocument {
    pub id: String,
    pub name: String,
    /// Milliseconds since epoch at export time
    pub timestamp: i64,
    pub collection_id: String,
    pub folder_id: u32,
    pub target_type: String,
    pub environment_id: Option<String>,
    /// Number of iterations run, minus one; older readers expect the
    /// last iteration's zero-based index here
    pub count: usize,
    pub collection: Collection,
    pub folder: Option<String>,
    pub globals: Vec<KeyValue>,
    pub results: Vec<SummaryResult>,
    pub environment: Environment,
    pub delay: u64,
    pub synced: Value,
}

impl SummaryDocument {
    pub fn new(
        collection: &Collection,
        environment: &Environment,
        globals: &[KeyValue],
        results: &[SummaryResult],
        iterations: usize,
    ) -> Self {
        Self {
            id: String::new(),
            name: "Default".to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            collection_id: collection.id.clone(),
            folder_id: 0,
            target_type: "collection".to_string(),
            environment_id: environment.id.clone(),
            count: iterations.saturating_sub(1),
            collection: collection.clone(),
            folder: None,
            globals: globals.to_vec(),
            results: results.to_vec(),
            environment: environment.clone(),
            delay: 0,
            synced: collection.extra.get("synced").cloned().unwrap_or(Value::Null),
        }
    }
}
