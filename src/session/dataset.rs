use std::fs::File;
use std::io::Read;
use std::path::Path;

use derive_new::new;
use log::debug;

use crate::error::{GitLiteError, GitLiteResult};
use crate::index::Row;

/// A tabular dataset: header names plus raw rows.
#[derive(new, Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl Dataset {
    pub fn from_path(path: impl AsRef<Path>) -> GitLiteResult<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            GitLiteError::InvalidArgument(format!("unable to open {}: {e}", path.display()))
        })?;
        let dataset = Self::from_reader(file)?;
        debug!(
            "loaded {} rows with {} columns from {}",
            dataset.rows.len(),
            dataset.columns.len(),
            path.display()
        );
        Ok(dataset)
    }

    /// Reads CSV with a header line. Rows may be ragged; fields are trimmed.
    pub fn from_reader<R: Read>(reader: R) -> GitLiteResult<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let columns = reader
            .headers()?
            .iter()
            .map(str::to_string)
            .collect::<Vec<_>>();
        if columns.iter().all(String::is_empty) {
            return Err(GitLiteError::InvalidArgument(
                "no columns found in the dataset".to_string(),
            ));
        }
        let rows = reader
            .records()
            .map(|record| Ok(record?.iter().map(str::to_string).collect()))
            .collect::<GitLiteResult<Vec<Row>>>()?;
        Ok(Self::new(columns, rows))
    }

    pub fn column_index(&self, column: &str) -> GitLiteResult<usize> {
        resolve_column(&self.columns, column)
    }
}

/// Resolves a column given by exact header name, falling back to a
/// zero-based position.
pub fn resolve_column(columns: &[String], column: &str) -> GitLiteResult<usize> {
    if let Some(index) = columns.iter().position(|name| name == column) {
        return Ok(index);
    }
    match column.parse::<usize>() {
        Ok(index) if index < columns.len() => Ok(index),
        _ => Err(GitLiteError::InvalidArgument(format!(
            "unknown column '{column}', expected one of: {}",
            columns.join(", ")
        ))),
    }
}
