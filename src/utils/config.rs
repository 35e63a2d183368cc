use crate::parser::types::{DataRow, Environment, KeyValue};
use crate::report::ExportTargets;
use crate::runner::iteration::RunPlan;
use std::path::PathBuf;

/// Run configuration
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Collection document to run
    pub collection: PathBuf,

    /// Run only this folder of the collection
    pub folder: Option<String>,

    /// Data file (CSV, JSON or YAML), one iteration per row
    pub data_file: Option<PathBuf>,

    /// Global variables file
    pub globals_file: Option<PathBuf>,

    /// Environment file
    pub environment_file: Option<PathBuf>,

    /// Explicit number of iterations
    pub iteration_count: Option<usize>,

    /// Request timeout (ms)
    pub request_timeout_ms: Option<u64>,

    /// Stop iterating after the first failing request
    pub stop_on_error: bool,

    pub exports: ExportTargets,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            collection: PathBuf::new(),
            folder: None,
            data_file: None,
            globals_file: None,
            environment_file: None,
            iteration_count: None,
            request_timeout_ms: None,
            stop_on_error: false,
            exports: ExportTargets::default(),
        }
    }
}

impl RunConfig {
    /// Controller inputs once the referenced files have been loaded
    pub fn plan(
        &self,
        data_rows: Vec<DataRow>,
        globals: Vec<KeyValue>,
        environment: Environment,
    ) -> RunPlan {
        RunPlan {
            folder: self.folder.clone(),
            iteration_count: self.iteration_count,
            data_rows,
            globals,
            environment,
            stop_on_error: self.stop_on_error,
            exports: self.exports.clone(),
        }
    }
}
