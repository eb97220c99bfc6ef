//! Normalized result types.
//!
//! Every backend's native column types are folded into `LogicalType`, the
//! closed set the display layer understands.

use crate::db::{NativeType, Value};
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};

/// Display-oriented column type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    Date,
    Binary,
    Unknown,
}

impl LogicalType {
    /// Returns the wire tag for this type.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Date => "date",
            Self::Binary => "binary",
            Self::Unknown => "unknown",
        }
    }
}

/// Maps backend-native type metadata to logical types.
///
/// Implementations must be total: anything unrecognized maps to
/// `LogicalType::Unknown`.
pub trait TypeMapper: Send + Sync {
    fn map(&self, native: &NativeType) -> LogicalType;
}

/// A normalized result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub logical_type: LogicalType,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, logical_type: LogicalType) -> Self {
        Self {
            name: name.into(),
            logical_type,
        }
    }
}

/// A normalized tabular result.
///
/// Rows are stored positionally and always have exactly one value per
/// column; they are only constructed by the normalizer, which checks arity.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSet {
    columns: Vec<ColumnDescriptor>,
    rows: Vec<Vec<Value>>,
}

impl ResultSet {
    pub(crate) fn from_parts(columns: Vec<ColumnDescriptor>, rows: Vec<Vec<Value>>) -> Self {
        debug_assert!(rows.iter().all(|row| row.len() == columns.len()));
        Self { columns, rows }
    }

    pub fn columns(&self) -> &[ColumnDescriptor] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of the column with the given name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.name == name)
    }

    /// Iterates rows as `(column name, value)` pairs in column order.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> + '_ {
        self.rows.iter().map(move |row| {
            self.columns
                .iter()
                .map(|c| c.name.as_str())
                .zip(row.iter())
                .collect()
        })
    }

    /// Renders the result in its wire shape.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// One row as an ordered `column name -> value` mapping.
struct RowRef<'a> {
    columns: &'a [ColumnDescriptor],
    values: &'a [Value],
}

impl Serialize for RowRef<'_> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (column, value) in self.columns.iter().zip(self.values) {
            map.serialize_entry(&column.name, value)?;
        }
        map.end()
    }
}

impl Serialize for ResultSet {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let rows: Vec<RowRef<'_>> = self
            .rows
            .iter()
            .map(|values| RowRef {
                columns: &self.columns,
                values,
            })
            .collect();

        let mut state = serializer.serialize_struct("ResultSet", 2)?;
        state.serialize_field("columns", &self.columns)?;
        state.serialize_field("rows", &rows)?;
        state.end()
    }
}
