//! Manifest loading.
//!
//! A manifest is a CSV file with the header `id,record_data,image,status`.
//! `record_data` holds a JSON object `{"id", "name", "symbol", "uri"}` with the target
//! values for the record. `image` and `status` are accepted and ignored.
//!
//! Bad rows do not abort the load. Each one is reported as a [`ManifestError`] and left
//! out of the record list.

use anyhow::{anyhow, Context, Result};
use metadata_batch_types::{Address, TargetRecord};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::Path;
use tracing::{debug, warn};

/// A manifest row that could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestError {
    /// 1-based line number in the file (the header is line 1).
    pub row: u64,
    pub message: String,
}

impl fmt::Display for ManifestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.row, self.message)
    }
}

/// Parsed records plus the rows that were rejected.
#[derive(Debug, Clone, Default)]
pub struct ManifestLoad {
    pub records: Vec<TargetRecord>,
    pub errors: Vec<ManifestError>,
}

/// Load a manifest from disk.
pub fn load_manifest(path: &Path) -> Result<ManifestLoad> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open manifest {}", path.display()))?;
    let load = parse_manifest(file)
        .with_context(|| format!("Failed to read manifest {}", path.display()))?;
    debug!(
        path = %path.display(),
        records = load.records.len(),
        rejected = load.errors.len(),
        "manifest loaded"
    );
    Ok(load)
}

/// Parse manifest CSV from any reader.
///
/// Fails only if the header lacks the `record_data` column or the underlying reader
/// fails. Row-level problems are collected in [`ManifestLoad::errors`].
pub fn parse_manifest<R: Read>(input: R) -> Result<ManifestLoad> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(input);

    let headers = reader.headers().context("Failed to read CSV headers")?.clone();
    let column = |name: &str| headers.iter().position(|h| h.eq_ignore_ascii_case(name));
    let data_col = column("record_data")
        .ok_or_else(|| anyhow!("manifest header has no 'record_data' column"))?;
    let id_col = column("id");

    let mut load = ManifestLoad::default();
    let mut seen: HashMap<Address, u64> = HashMap::new();

    for (i, row) in reader.records().enumerate() {
        let row = match row {
            Ok(row) => row,
            Err(e) if matches!(e.kind(), csv::ErrorKind::Io(_)) => {
                return Err(anyhow!("Failed to read manifest: {}", e));
            }
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(i as u64 + 2);
                load.errors.push(ManifestError {
                    row: line,
                    message: format!("unreadable row: {}", e),
                });
                continue;
            }
        };
        let line = row.position().map(|p| p.line()).unwrap_or(i as u64 + 2);

        let id_column = id_col.and_then(|c| row.get(c)).unwrap_or("");
        let data = row.get(data_col).unwrap_or("");
        match parse_row(id_column, data) {
            Ok(record) => {
                if let Some(first) = seen.get(&record.id) {
                    load.errors.push(ManifestError {
                        row: line,
                        message: format!("duplicate id {} (first seen on line {})", record.id, first),
                    });
                    continue;
                }
                seen.insert(record.id, line);
                load.records.push(record);
            }
            Err(message) => load.errors.push(ManifestError { row: line, message }),
        }
    }

    for error in &load.errors {
        warn!(row = error.row, message = %error.message, "skipping manifest row");
    }
    Ok(load)
}

fn parse_row(id_column: &str, data: &str) -> std::result::Result<TargetRecord, String> {
    if data.is_empty() {
        return Err("missing record_data".to_string());
    }
    let value: Value =
        serde_json::from_str(data).map_err(|e| format!("record_data is not valid JSON: {}", e))?;
    let Value::Object(obj) = value else {
        return Err("record_data must be a JSON object".to_string());
    };

    let id_text = match id_column.trim() {
        "" => required_str(&obj, "id")?,
        column => column.to_string(),
    };
    let id: Address = id_text
        .parse()
        .map_err(|e| format!("invalid id: {}", e))?;

    Ok(TargetRecord {
        id,
        name: required_str(&obj, "name")?,
        symbol: required_str(&obj, "symbol")?,
        uri: required_str(&obj, "uri")?,
    })
}

/// Trimmed, non-empty string field of `record_data`.
fn required_str(obj: &Map<String, Value>, key: &str) -> std::result::Result<String, String> {
    match obj.get(key) {
        None | Some(Value::Null) => Err(format!("record_data is missing '{}'", key)),
        Some(Value::String(s)) if s.trim().is_empty() => {
            Err(format!("record_data '{}' is empty", key))
        }
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(_) => Err(format!("record_data '{}' must be a string", key)),
    }
}
