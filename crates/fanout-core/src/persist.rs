//! File persistence helpers used by the save handlers and the CLI.
//!
//! Every writer creates missing parent directories. JSON goes through
//! `serde_json::Value` first, so object keys come out sorted.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("{}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error("no records to write")]
    EmptyRecords,

    #[error("record {index} is not a json object")]
    NotARecord { index: usize },

    #[error("record {index} has field `{field}` missing from the header")]
    UnexpectedField { index: usize, field: String },
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> PersistError + '_ {
    move |source| PersistError::Io {
        path: path.to_path_buf(),
        source,
    }
}

fn ensure_parent(path: &Path) -> Result<(), PersistError> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(io_error(parent))
        }
        _ => Ok(()),
    }
}

pub fn save_string(data: &str, path: impl AsRef<Path>) -> Result<(), PersistError> {
    let path = path.as_ref();
    ensure_parent(path)?;
    fs::write(path, data).map_err(io_error(path))
}

/// Joins `lines` with `separator` (no trailing separator).
pub fn save_lines<I, S>(
    lines: I,
    path: impl AsRef<Path>,
    separator: &str,
) -> Result<(), PersistError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut out = String::new();
    for (i, line) in lines.into_iter().enumerate() {
        if i > 0 {
            out.push_str(separator);
        }
        out.push_str(line.as_ref());
    }
    save_string(&out, path)
}

/// Pretty-prints `data` with `indent` spaces per level.
pub fn save_json<T>(data: &T, path: impl AsRef<Path>, indent: usize) -> Result<(), PersistError>
where
    T: Serialize + ?Sized,
{
    let value = serde_json::to_value(data)?;
    let indent = vec![b' '; indent];
    let mut buf = Vec::new();
    let formatter = PrettyFormatter::with_indent(&indent);
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value.serialize(&mut ser)?;

    let path = path.as_ref();
    ensure_parent(path)?;
    fs::write(path, buf).map_err(io_error(path))
}

/// Writes a header row plus one row per record.
///
/// The header is the first record's keys; later records may omit fields
/// (written empty) but may not add new ones. Strings are written bare,
/// null as empty, other values as JSON text. Nothing is written if any
/// record is invalid.
pub fn save_records_csv(records: &[Value], path: impl AsRef<Path>) -> Result<(), PersistError> {
    let first = records
        .first()
        .ok_or(PersistError::EmptyRecords)?
        .as_object()
        .ok_or(PersistError::NotARecord { index: 0 })?;
    let header: Vec<&str> = first.keys().map(String::as_str).collect();

    let mut rows: Vec<&Map<String, Value>> = Vec::with_capacity(records.len());
    for (index, record) in records.iter().enumerate() {
        let record = record.as_object().ok_or(PersistError::NotARecord { index })?;
        if let Some(field) = record.keys().find(|k| !first.contains_key(*k)) {
            return Err(PersistError::UnexpectedField {
                index,
                field: field.clone(),
            });
        }
        rows.push(record);
    }

    let path = path.as_ref();
    ensure_parent(path)?;
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(&header)?;
    for row in rows {
        let cells = header
            .iter()
            .map(|key| row.get(*key).map(csv_cell).unwrap_or_default());
        writer.write_record(cells)?;
    }
    writer.flush().map_err(io_error(path))
}

fn csv_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn load_string(path: impl AsRef<Path>) -> Result<String, PersistError> {
    let path = path.as_ref();
    fs::read_to_string(path).map_err(io_error(path))
}

/// Lines with surrounding whitespace trimmed.
pub fn load_lines(path: impl AsRef<Path>) -> Result<Vec<String>, PersistError> {
    Ok(load_string(path)?
        .lines()
        .map(|line| line.trim().to_owned())
        .collect())
}

pub fn load_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, PersistError> {
    Ok(serde_json::from_str(&load_string(path)?)?)
}
