//! Schema introspection.
//!
//! Runs a backend's catalog query through the ordinary `run` path and folds
//! the `(table, column)` rows into a table-keyed schema.

use super::types::ResultSet;
use super::{Query, QueryRunner};
use crate::error::{Cancelled, Result, RunnerError};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Columns of one table, in the order the catalog returned them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub columns: Vec<String>,
}

/// Table name to table schema.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    tables: BTreeMap<String, TableSchema>,
}

impl Schema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, name: &str) -> Option<&TableSchema> {
        self.tables.get(name)
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Appends a column, creating the table entry on first sight.
    pub fn add_column(&mut self, table: &str, column: impl Into<String>) {
        self.tables
            .entry(table.to_string())
            .or_insert_with(|| TableSchema {
                name: table.to_string(),
                columns: Vec::new(),
            })
            .columns
            .push(column.into());
    }

    /// Renders the schema in its wire shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// A backend's catalog query and the result columns holding the names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchemaQuery {
    pub sql: &'static str,
    pub table_column: &'static str,
    pub column_column: &'static str,
}

/// Discovers tables and columns via a catalog query.
#[derive(Debug, Clone, Copy)]
pub struct SchemaIntrospector {
    query: SchemaQuery,
}

impl SchemaIntrospector {
    pub fn new(query: SchemaQuery) -> Self {
        Self { query }
    }

    /// Runs the catalog query through `runner` and assembles the schema.
    ///
    /// Fails with `SchemaUnavailable` if the query fails; no partial schema
    /// is ever returned.
    pub async fn introspect<R>(
        &self,
        runner: &R,
        cancel: &CancellationToken,
    ) -> std::result::Result<Result<Schema>, Cancelled>
    where
        R: QueryRunner + ?Sized,
    {
        let query = Query::new(self.query.sql);
        let result = match runner.run(&query, cancel).await? {
            Ok(result) => result,
            Err(e) => {
                debug!("Catalog query failed: {}", e);
                return Ok(Err(RunnerError::schema_unavailable(e.to_string())));
            }
        };

        Ok(self.assemble(&result))
    }

    /// Folds catalog rows into a schema. Rows with a NULL name are skipped.
    pub fn assemble(&self, result: &ResultSet) -> Result<Schema> {
        let table_idx = self.index_of(result, self.query.table_column)?;
        let column_idx = self.index_of(result, self.query.column_column)?;

        let mut schema = Schema::new();
        for row in result.rows() {
            let Some(table) = row[table_idx].as_text() else {
                continue;
            };
            match row[column_idx].as_text() {
                Some(column) => schema.add_column(&table, column),
                None => debug!("Skipping NULL column name in table {}", table),
            }
        }

        Ok(schema)
    }

    fn index_of(&self, result: &ResultSet, name: &str) -> Result<usize> {
        result.column_index(name).ok_or_else(|| {
            RunnerError::schema_unavailable(format!("catalog query returned no '{name}' column"))
        })
    }
}
