//! Column identity and the upstream collaborators that supply columns and values.
//!
//! Fetching values from a warehouse and listing its columns are out of this
//! crate's hands; they are reached through [`ValueSource`] and
//! [`ColumnCatalog`]. In-memory implementations are provided for tests and
//! offline use.

use crate::error::{Result, SketchError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::sync::RwLock;

/// Identifies a column: `(table, column)`.
///
/// Ordering is lexical on `(table, column)`; indexes use it to break ties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ColumnKey {
    table: String,
    column: String,
}

impl ColumnKey {
    /// Create a key; both parts must be non-empty.
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        if table.is_empty() || column.is_empty() {
            return Err(SketchError::Validation(format!(
                "column key parts must be non-empty (table={table:?}, column={column:?})"
            )));
        }
        Ok(Self { table, column })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Storage-safe identifier `<table>.<column>`.
    ///
    /// Path separators, `%` and control characters are percent-escaped so the
    /// result is always a single path component. Dots are also escaped in the
    /// column part, so the last unescaped `.` separates table from column and
    /// distinct keys never share a name.
    pub fn storage_name(&self) -> String {
        format!(
            "{}.{}",
            escape(&self.table, false),
            escape(&self.column, true)
        )
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

fn escape(part: &str, escape_dots: bool) -> String {
    let mut out = String::with_capacity(part.len());
    for c in part.chars() {
        match c {
            '/' | '\\' | '%' | ':' => out.push_str(&format!("%{:02X}", c as u32)),
            '.' if escape_dots => out.push_str("%2E"),
            c if c.is_control() => out.push_str(&format!("%{:02X}", c as u32)),
            c => out.push(c),
        }
    }
    out
}

/// Warehouse column type, as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Numeric,
    Boolean,
    Date,
    Timestamp,
    Other(String),
}

impl ColumnType {
    /// Parse a warehouse type name (`STRING`, `INT64`, ...).
    pub fn parse(s: &str) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "STRING" | "VARCHAR" | "TEXT" => Self::String,
            "INT64" | "INTEGER" | "INT" => Self::Integer,
            "FLOAT64" | "FLOAT" | "DOUBLE" => Self::Float,
            "NUMERIC" | "BIGNUMERIC" | "DECIMAL" => Self::Numeric,
            "BOOL" | "BOOLEAN" => Self::Boolean,
            "DATE" => Self::Date,
            "TIMESTAMP" | "DATETIME" => Self::Timestamp,
            other => Self::Other(other.to_string()),
        }
    }

    /// Only string columns tokenize into sets.
    pub fn is_tokenizable(&self) -> bool {
        matches!(self, Self::String)
    }
}

/// A catalog entry: key plus declared type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub key: ColumnKey,
    pub column_type: ColumnType,
}

impl ColumnInfo {
    pub fn new(key: ColumnKey, column_type: ColumnType) -> Self {
        Self { key, column_type }
    }
}

/// Supplies the distinct raw values of a column.
pub trait ValueSource: Send + Sync {
    fn fetch_distinct_values(&self, key: &ColumnKey) -> Result<Vec<Option<String>>>;
}

/// Lists the columns that may participate in an index build.
pub trait ColumnCatalog: Send + Sync {
    /// Columns matching `type_filter` (all when `None`), at most `limit`.
    fn list_columns(
        &self,
        type_filter: Option<&ColumnType>,
        limit: Option<usize>,
    ) -> Result<Vec<ColumnInfo>>;
}

/// In-memory [`ValueSource`] + [`ColumnCatalog`].
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    columns: RwLock<Vec<(ColumnInfo, Vec<Option<String>>)>>,
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a column and its values.
    pub fn insert(&self, info: ColumnInfo, values: Vec<Option<String>>) {
        let mut columns = match self.columns.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        match columns.iter().position(|(existing, _)| existing.key == info.key) {
            Some(pos) => columns[pos] = (info, values),
            None => columns.push((info, values)),
        }
    }

    /// Add a string column from plain values.
    pub fn insert_strings<I, S>(&self, key: ColumnKey, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let values = values.into_iter().map(|v| Some(v.into())).collect();
        self.insert(ColumnInfo::new(key, ColumnType::String), values);
    }
}

impl ValueSource for MemoryWarehouse {
    fn fetch_distinct_values(&self, key: &ColumnKey) -> Result<Vec<Option<String>>> {
        let columns = match self.columns.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let (_, values) = columns
            .iter()
            .find(|(info, _)| &info.key == key)
            .ok_or_else(|| SketchError::Build {
                column: key.to_string(),
                reason: "column does not exist in warehouse".into(),
            })?;
        let mut seen = HashSet::new();
        Ok(values
            .iter()
            .filter(|v| seen.insert((*v).clone()))
            .cloned()
            .collect())
    }
}

impl ColumnCatalog for MemoryWarehouse {
    fn list_columns(
        &self,
        type_filter: Option<&ColumnType>,
        limit: Option<usize>,
    ) -> Result<Vec<ColumnInfo>> {
        let columns = match self.columns.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Ok(columns
            .iter()
            .map(|(info, _)| info)
            .filter(|info| type_filter.map_or(true, |t| &info.column_type == t))
            .take(limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}
