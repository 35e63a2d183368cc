use super::types::{DataRow, Environment, KeyValue};
use crate::error::ParseError;
use serde_json::Value;
use std::path::Path;

/// Load the rows of a data file.
///
/// No path means "iterate by count" and yields no rows. `.json` (read as
/// JSON5), `.yaml` and `.yml` files must hold an array of flat objects; any
/// other extension is read as comma-separated text with a header line.
pub fn load_data_rows(path: Option<&Path>) -> Result<Vec<DataRow>, ParseError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let content = read(path)?;
    let records = match structured_kind(path) {
        Some(kind) => match decode(path, &content, kind)? {
            Value::Array(items) => items,
            _ => {
                return Err(ParseError::Shape {
                    path: path.to_path_buf(),
                    message: "expected an array of rows".to_string(),
                })
            }
        },
        None => parse_csv(path, &content)?,
    };

    let rows = records
        .into_iter()
        .map(|record| to_key_values(path, record))
        .collect::<Result<Vec<_>, _>>()?;

    log::debug!("Loaded {} data rows from {}", rows.len(), path.display());
    Ok(rows)
}

/// Load a global variables file into an ordered key/value sequence
pub fn load_globals(path: Option<&Path>) -> Result<Vec<KeyValue>, ParseError> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };

    let content = read(path)?;
    let value = decode(path, &content, structured_kind(path).unwrap_or(Kind::Json))?;
    to_key_values(path, value)
}

/// Load an environment file (`{ id, name, values }` or a flat object)
pub fn load_environment(path: Option<&Path>) -> Result<Environment, ParseError> {
    let Some(path) = path else {
        return Ok(Environment::default());
    };

    let content = read(path)?;
    let value = decode(path, &content, structured_kind(path).unwrap_or(Kind::Json))?;

    if value.get("values").is_some() {
        return serde_json::from_value(value).map_err(|source| ParseError::Json {
            path: path.to_path_buf(),
            source,
        });
    }

    Ok(Environment {
        name: path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_string(),
        values: to_key_values(path, value)?,
        ..Default::default()
    })
}

/// Normalize a row into key/value form.
///
/// Flat objects become one entry per property, in document order. Arrays are
/// taken to already be `{ key, value }` entries.
pub fn to_key_values(path: &Path, value: Value) -> Result<Vec<KeyValue>, ParseError> {
    match value {
        Value::Object(map) => Ok(map
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value))
            .collect()),
        Value::Array(_) => serde_json::from_value(value).map_err(|source| ParseError::Json {
            path: path.to_path_buf(),
            source,
        }),
        Value::Null => Ok(Vec::new()),
        other => Err(ParseError::Shape {
            path: path.to_path_buf(),
            message: format!("expected an object of variables, found {}", other),
        }),
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Kind {
    Json,
    Yaml,
}

fn structured_kind(path: &Path) -> Option<Kind> {
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("json") => Some(Kind::Json),
        Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
            Some(Kind::Yaml)
        }
        _ => None,
    }
}

fn read(path: &Path) -> Result<String, ParseError> {
    std::fs::read_to_string(path).map_err(|source| ParseError::Read {
        path: path.to_path_buf(),
        source,
    })
}

fn decode(path: &Path, content: &str, kind: Kind) -> Result<Value, ParseError> {
    match kind {
        Kind::Json => json5::from_str(content).map_err(|source| ParseError::Json5 {
            path: path.to_path_buf(),
            source,
        }),
        Kind::Yaml => serde_yaml::from_str(content).map_err(|source| ParseError::Yaml {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Header line plus one object per non-blank line, fields trimmed and
/// zipped to the headers by position
fn parse_csv(path: &Path, content: &str) -> Result<Vec<Value>, ParseError> {
    let csv_error = |source| ParseError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers = reader.headers().map_err(csv_error)?.clone();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let row: serde_json::Map<String, Value> = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| (key.to_string(), Value::String(value.to_string())))
            .collect();
        rows.push(Value::Object(row));
    }

    Ok(rows)
}
