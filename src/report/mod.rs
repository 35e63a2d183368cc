pub mod json;
pub mod junit;
pub mod types;

use crate::parser::types::{Collection, KeyValue};
use crate::runner::context::RunContext;
use crate::runner::state::SummaryResult;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Where the results of a run go
#[derive(Debug, Clone)]
pub struct ExportTargets {
    /// Iteration log (JSON)
    pub output_file: Option<PathBuf>,
    /// Source collection with its response history
    pub collection_output: Option<PathBuf>,
    /// Single-document run summary
    pub summary_output: Option<PathBuf>,
    /// Directory receiving `junit.xml`
    pub report_dir: PathBuf,
}

impl Default for ExportTargets {
    fn default() -> Self {
        Self {
            output_file: None,
            collection_output: None,
            summary_output: None,
            report_dir: PathBuf::from("."),
        }
    }
}

/// Write every configured report. JUnit XML is always written.
pub fn export(
    targets: &ExportTargets,
    context: &RunContext,
    collection: &mut Collection,
    globals: &[KeyValue],
    summaries: &[SummaryResult],
) -> Result<()> {
    if let Some(path) = &targets.output_file {
        json::write_iteration_log(&context.iterations, path)?;
    }

    if let Some(path) = &targets.collection_output {
        json::write_collection(collection, path)?;
    }

    if let Some(path) = &targets.summary_output {
        let document = types::SummaryDocument::new(
            collection,
            &context.environment,
            globals,
            summaries,
            context.iteration,
        );
        json::write_summary(&document, path)?;
    }

    junit::write_report(&collection.name, &context.iterations, &targets.report_dir)?;

    Ok(())
}

/// Generate JUnit XML from a saved iteration log
pub fn generate_report(results_path: &Path, report_dir: &Path) -> Result<PathBuf> {
    let records = json::read_iteration_log(results_path)?;
    let collection_name = records
        .first()
        .map(|record| record.collection_name.clone())
        .unwrap_or_default();

    junit::write_report(&collection_name, &records, report_dir)
        .with_context(|| format!("Failed to write JUnit report to {}", report_dir.display()))
}
