//! Dataset registration and row values.
//!
//! A dataset maps a registered name to a SQLite table, an ordered column list
//! with identifier flags, and an optional base filter that is always in
//! effect (the environment's own search scope). The identifier columns, in
//! declaration order, are what selection payloads are joined against; the
//! first one is the join anchor.

use std::fmt;
use std::sync::Arc;

use rusqlite::Connection;
use rusqlite::types::{ToSql, ToSqlOutput, Value, ValueRef};

use crate::error::{Result, SweepError};

// ------------- Cell -------------
/// One scalar value read from a dataset row.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl Cell {
    pub fn from_ref(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Cell::Null,
            ValueRef::Integer(i) => Cell::Integer(i),
            ValueRef::Real(r) => Cell::Real(r),
            ValueRef::Text(t) => Cell::Text(String::from_utf8_lossy(t).into_owned()),
            ValueRef::Blob(b) => Cell::Blob(b.to_vec()),
        }
    }
    pub fn to_value(&self) -> Value {
        match self {
            Cell::Null => Value::Null,
            Cell::Integer(i) => Value::Integer(*i),
            Cell::Real(r) => Value::Real(*r),
            Cell::Text(t) => Value::Text(t.clone()),
            Cell::Blob(b) => Value::Blob(b.clone()),
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Cell::Null => write!(f, ""),
            Cell::Integer(i) => write!(f, "{i}"),
            Cell::Real(r) => write!(f, "{r}"),
            Cell::Text(t) => write!(f, "{t}"),
            Cell::Blob(b) => write!(f, "<blob {} bytes>", b.len()),
        }
    }
}

impl ToSql for Cell {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::Owned(self.to_value()))
    }
}

// ------------- RowCells -------------
/// The column values of the row a mutation fragment is currently bound to.
#[derive(Debug, Clone)]
pub struct RowCells {
    names: Arc<Vec<String>>,
    cells: Vec<Cell>,
}

impl RowCells {
    pub fn read(names: &Arc<Vec<String>>, row: &rusqlite::Row<'_>) -> Result<Self> {
        let mut cells = Vec::with_capacity(names.len());
        for i in 0..names.len() {
            cells.push(Cell::from_ref(row.get_ref(i)?));
        }
        Ok(Self { names: Arc::clone(names), cells })
    }
    pub fn names(&self) -> &[String] {
        &self.names
    }
    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }
    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.names
            .iter()
            .position(|n| n.eq_ignore_ascii_case(name))
            .map(|i| &self.cells[i])
    }
}

// ------------- ColumnMeta -------------
#[derive(Debug, Clone)]
pub struct ColumnMeta {
    name: String,
    identifier: bool,
}

impl ColumnMeta {
    pub fn new(name: impl Into<String>, identifier: bool) -> Self {
        Self { name: name.into(), identifier }
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn identifier(&self) -> bool {
        self.identifier
    }
}

// ------------- DatasetMeta -------------
#[derive(Debug, Clone)]
pub struct DatasetMeta {
    name: String,
    table: String,
    columns: Vec<ColumnMeta>,
    base_filter: Option<String>,
}

impl DatasetMeta {
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            columns: Vec::new(),
            base_filter: None,
        }
    }
    pub fn with_column(mut self, column: ColumnMeta) -> Self {
        self.columns.push(column);
        self
    }
    /// A filter fragment that is always in effect for this dataset, such as
    /// the environment's own search scope. Column references resolve against
    /// the dataset table.
    pub fn with_base_filter(mut self, filter: impl Into<String>) -> Self {
        self.base_filter = Some(filter.into());
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn columns(&self) -> &[ColumnMeta] {
        &self.columns
    }
    pub fn base_filter(&self) -> Option<&str> {
        self.base_filter.as_deref()
    }
    /// Identifier columns in declaration order; the first is the join anchor.
    pub fn identifier_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .filter(|c| c.identifier)
            .map(|c| c.name.as_str())
            .collect()
    }

    /// Check the declared columns against the live table using a metadata-only
    /// statement. The probe is dropped before the real iteration opens.
    pub fn verify(&self, conn: &Connection) -> Result<()> {
        let probe = conn
            .prepare(&format!("select * from {} limit 0", self.table))
            .map_err(|e| {
                SweepError::Config(format!(
                    "dataset '{}': table '{}' is not available: {e}",
                    self.name, self.table
                ))
            })?;
        let live: Vec<String> = probe
            .column_names()
            .iter()
            .map(|n| n.to_ascii_lowercase())
            .collect();
        for column in &self.columns {
            if !live.contains(&column.name.to_ascii_lowercase()) {
                return Err(SweepError::Config(format!(
                    "dataset '{}': declared column '{}' does not exist in table '{}'",
                    self.name, column.name, self.table
                )));
            }
        }
        drop(probe);
        Ok(())
    }

    /// The iteration statement: base filter and (in selection mode) the
    /// selection predicate combine conjunctively. Row order follows the
    /// table's own order so later rows observe earlier mutations.
    pub fn select_sql(&self, predicate: Option<&str>) -> String {
        let mut sql = format!("select t.* from {} t", self.table);
        let mut filters = Vec::new();
        if let Some(base) = &self.base_filter {
            filters.push(format!("({base})"));
        }
        if let Some(predicate) = predicate {
            filters.push(format!("({predicate})"));
        }
        if !filters.is_empty() {
            sql.push_str(" where ");
            sql.push_str(&filters.join(" and "));
        }
        sql.push_str(" order by t.rowid");
        sql
    }
}
