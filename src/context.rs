//! Row-iteration context over a dataset.
//!
//! In selection mode the context is additionally constrained by a predicate
//! joining the dataset's identifier columns to the materialized selection.
//! The context is opened exactly once per request and closed on every exit
//! path; closing twice is a no-op.

use std::sync::Arc;

use rusqlite::{Connection, Statement};

use crate::dataset::{DatasetMeta, RowCells};
use crate::error::{Result, SweepError};
use crate::selection::MaterializedSelection;

/// Flow control returned by the per-row callback during a scan.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanFlow {
    Continue,
    Stop,
}

/// Build the membership predicate "(identifier columns) in (columns of the
/// materialized selection)". Identifier column *i* joins `key_i`; values are
/// compared as text since that is how the selection travelled.
pub fn selection_predicate(
    dataset: &DatasetMeta,
    selection: &MaterializedSelection,
) -> Result<String> {
    let id_columns = dataset.identifier_columns();
    if id_columns.is_empty() {
        return Err(SweepError::Config(format!(
            "dataset '{}' declares no identifier columns, cannot scope a selection",
            dataset.name()
        )));
    }
    let clauses: Vec<String> = id_columns
        .iter()
        .take(selection.width())
        .enumerate()
        .map(|(i, column)| format!("s.key_{} = cast(t.{} as text)", i + 1, column))
        .collect();
    Ok(format!(
        "exists (select 1 from {} s where {})",
        selection.table(),
        clauses.join(" and ")
    ))
}

// ------------- ExecutionContext -------------
/// A live cursor over the dataset plus its active filters.
pub struct ExecutionContext<'conn> {
    stmt: Option<Statement<'conn>>,
}

impl<'conn> ExecutionContext<'conn> {
    pub fn open(
        conn: &'conn Connection,
        dataset: &DatasetMeta,
        selection: Option<&MaterializedSelection>,
    ) -> Result<Self> {
        let predicate = match selection {
            Some(selection) => Some(selection_predicate(dataset, selection)?),
            None => None,
        };
        let stmt = conn.prepare(&dataset.select_sql(predicate.as_deref()))?;
        Ok(Self { stmt: Some(stmt) })
    }

    pub fn is_open(&self) -> bool {
        self.stmt.is_some()
    }

    /// Drive the cursor, handing each row to `apply` until the rows are
    /// exhausted or the callback asks to stop.
    pub fn scan<F>(&mut self, mut apply: F) -> Result<()>
    where
        F: FnMut(RowCells) -> Result<ScanFlow>,
    {
        let stmt = self
            .stmt
            .as_mut()
            .ok_or_else(|| SweepError::Invariant("scan on a closed execution context".to_string()))?;
        let names = Arc::new(
            stmt.column_names()
                .iter()
                .map(|n| n.to_string())
                .collect::<Vec<String>>(),
        );
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let cells = RowCells::read(&names, row)?;
            match apply(cells)? {
                ScanFlow::Continue => (),
                ScanFlow::Stop => break,
            }
        }
        Ok(())
    }

    /// Close the context. Safe to call more than once.
    pub fn close(&mut self) {
        self.stmt = None;
    }
}
