//! Result normalization.
//!
//! Turns raw driver output into a `ResultSet`: native types go through the
//! backend's `TypeMapper`, duplicate column names get a numeric suffix, and
//! every row is checked against the column count.

use super::types::{ColumnDescriptor, ResultSet, TypeMapper};
use crate::db::{RawColumn, RawResult};
use crate::error::{Result, RunnerError};
use std::collections::{HashMap, HashSet};

/// Builds normalized results with one backend's type mapping.
pub struct ResultNormalizer<'a> {
    mapper: &'a dyn TypeMapper,
}

impl<'a> ResultNormalizer<'a> {
    pub fn new(mapper: &'a dyn TypeMapper) -> Self {
        Self { mapper }
    }

    /// Normalizes one statement's output.
    ///
    /// A statement that reported no column metadata yields
    /// `RunnerError::NoResultSet`; a result with columns but no rows is a
    /// valid, empty `ResultSet`.
    pub fn normalize(&self, raw: RawResult) -> Result<ResultSet> {
        let raw_columns = match raw.columns {
            Some(columns) if !columns.is_empty() => columns,
            _ => return Err(RunnerError::NoResultSet),
        };

        let columns = self.describe(&raw_columns);

        for (index, row) in raw.rows.iter().enumerate() {
            if row.len() != columns.len() {
                return Err(RunnerError::internal(format!(
                    "row {index} has {} values but the result has {} columns",
                    row.len(),
                    columns.len()
                )));
            }
        }

        Ok(ResultSet::from_parts(columns, raw.rows))
    }

    fn describe(&self, raw_columns: &[RawColumn]) -> Vec<ColumnDescriptor> {
        let names = unique_names(raw_columns.iter().map(|c| c.name.as_str()));
        raw_columns
            .iter()
            .zip(names)
            .map(|(raw, name)| ColumnDescriptor::new(name, self.mapper.map(&raw.native_type)))
            .collect()
    }
}

/// Renames repeated names: `id, id, id` becomes `id, id1, id2`.
fn unique_names<'n>(names: impl Iterator<Item = &'n str>) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut counters: HashMap<String, usize> = HashMap::new();
    let mut unique = Vec::new();

    for name in names {
        let mut candidate = name.to_string();
        while seen.contains(&candidate) {
            let counter = counters.entry(candidate.clone()).or_insert(1);
            let next = format!("{candidate}{counter}");
            *counter += 1;
            candidate = next;
        }
        seen.insert(candidate.clone());
        unique.push(candidate);
    }

    unique
}
