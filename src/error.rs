use std::path::PathBuf;
use thiserror::Error;

/// Fatal problems with the run setup, raised before any iteration starts
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("The folder [{0}] does not exist.")]
    FolderNotFound(String),
}

/// Fatal problems reading one of the run's input files
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse JSON in {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse JSON5 in {}: {source}", path.display())]
    Json5 {
        path: PathBuf,
        #[source]
        source: json5::Error,
    },

    #[error("Failed to parse YAML in {}: {source}", path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to parse CSV in {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Unexpected content in {}: {message}", path.display())]
    Shape { path: PathBuf, message: String },
}
