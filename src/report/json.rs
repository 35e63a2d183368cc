use super::types::SummaryDocument;
use crate::parser::types::Collection;
use crate::runner::state::IterationRecord;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use uuid::Uuid;

/// Write the iteration log as a pretty-printed JSON array
pub fn write_iteration_log(records: &[IterationRecord], path: &Path) -> Result<()> {
    write_pretty(records, path)?;
    log::info!("Iteration log saved to: {}", path.display());
    Ok(())
}

/// Read an iteration log written by `write_iteration_log`
pub fn read_iteration_log(path: &Path) -> Result<Vec<IterationRecord>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read results file {}", path.display()))?;
    let records = serde_json::from_str(&content)
        .with_context(|| format!("Invalid results file {}", path.display()))?;
    Ok(records)
}

/// Write the source collection with its response history under a new id
pub fn write_collection(collection: &mut Collection, path: &Path) -> Result<()> {
    collection.id = Uuid::new_v4().to_string();
    write_pretty(collection, path)?;
    log::info!("Collection saved to: {}", path.display());
    Ok(())
}

pub fn write_summary(document: &SummaryDocument, path: &Path) -> Result<()> {
    write_pretty(document, path)?;
    log::info!("Summary saved to: {}", path.display());
    Ok(())
}

fn write_pretty<T: Serialize + ?Sized>(value: &T, path: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::types::KeyValue;
    use crate::runner::state::sample_result;

    #[test]
    fn test_iteration_log_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");

        let mut record = IterationRecord::new(1, "Users", vec![KeyValue::new("x", "1")]);
        record.push("root", sample_result("r1", 42, &[("status ok", true)]));
        let records = vec![record];

        write_iteration_log(&records, &path).unwrap();
        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["collectionName"], "Users");
        assert_eq!(raw[0]["results"]["root"][0]["tests"]["status ok"], true);
        assert_eq!(raw[0]["results"]["root"][0]["time"], 42);

        assert_eq!(read_iteration_log(&path).unwrap(), records);
    }

    #[test]
    fn test_collection_gets_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("collection.json");
        let mut collection: Collection =
            serde_json::from_str(r#"{"id": "old", "name": "Users", "synced": true}"#).unwrap();

        write_collection(&mut collection, &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_ne!(written["id"], "old");
        assert_eq!(written["id"], collection.id.as_str());
        assert_eq!(written["synced"], true);
        assert!(Uuid::parse_str(&collection.id).is_ok());
    }
}
