//! Selection transport and materialization.
//!
//! The client encodes its chosen identifier tuples into a compact payload,
//! possibly split across several bounded chunks. The server reassembles the
//! payload and materializes it into a per-request TEMP table so that the
//! iteration context can reference the selection positionally (`key_1` ..
//! `key_N`). The materialized selection never outlives its request.

use std::sync::atomic::{AtomicU64, Ordering};

use rusqlite::types::Value;
use rusqlite::{Connection, params_from_iter};
use tracing::{debug, warn};

use crate::error::{Result, SweepError};

// Control characters mark the tuple and column boundaries on the wire, so
// ordinary identifier text passes through untouched.
pub const COLUMN_SEPARATOR: char = 31 as char;
pub const TUPLE_SEPARATOR: char = 30 as char;

// ------------- IdentifierTuple -------------
/// Ordered scalar values uniquely identifying one record (1..N columns).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierTuple {
    values: Vec<String>,
}

impl IdentifierTuple {
    pub fn new(values: Vec<String>) -> Self {
        Self { values }
    }
    pub fn single(value: impl Into<String>) -> Self {
        Self { values: vec![value.into()] }
    }
    pub fn values(&self) -> &[String] {
        &self.values
    }
    pub fn width(&self) -> usize {
        self.values.len()
    }
}

// ------------- Wire codec -------------
/// Serialize identifier tuples into chunks of at most `chunk_size` characters.
///
/// Chunk boundaries may fall anywhere; the decoder concatenates all chunks
/// before splitting, so the boundary never has to align with a tuple. Values
/// containing the separator characters cannot be transported and are rejected.
pub fn encode(tuples: &[IdentifierTuple], chunk_size: usize) -> Result<Vec<String>> {
    if tuples.is_empty() {
        return Ok(Vec::new());
    }
    let mut joined = String::new();
    for (i, tuple) in tuples.iter().enumerate() {
        if i > 0 {
            joined.push(TUPLE_SEPARATOR);
        }
        for (j, value) in tuple.values().iter().enumerate() {
            if value.contains(COLUMN_SEPARATOR) || value.contains(TUPLE_SEPARATOR) {
                return Err(SweepError::Selection(format!(
                    "identifier value in tuple {} contains a reserved separator character",
                    i + 1
                )));
            }
            if j > 0 {
                joined.push(COLUMN_SEPARATOR);
            }
            joined.push_str(value);
        }
    }
    if chunk_size == 0 {
        return Ok(vec![joined]);
    }
    let mut chunks = Vec::new();
    let mut chunk = String::new();
    let mut len = 0usize;
    for c in joined.chars() {
        chunk.push(c);
        len += 1;
        if len == chunk_size {
            chunks.push(std::mem::take(&mut chunk));
            len = 0;
        }
    }
    if !chunk.is_empty() {
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Reassemble the chunks and parse them back into identifier tuples, in the
/// original order and with the original column alignment. An empty payload
/// decodes to zero tuples.
pub fn decode(chunks: &[String]) -> Result<Vec<IdentifierTuple>> {
    let joined: String = chunks.concat();
    if joined.is_empty() {
        return Ok(Vec::new());
    }
    let tuples = joined
        .split(TUPLE_SEPARATOR)
        .map(|tuple| {
            IdentifierTuple::new(tuple.split(COLUMN_SEPARATOR).map(str::to_string).collect())
        })
        .collect();
    Ok(tuples)
}

// ------------- MaterializedSelection -------------
// TEMP table names must be unique while several requests share one connection
// serially; a process-wide counter keeps them distinct.
static SELECTION_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// The server-side ephemeral store reconstructed from a selection payload.
///
/// One row per identifier tuple, keyed by a fresh sequence id, with column
/// *i* of N stored under the fixed name `key_i`. Built before the iteration
/// context opens and dropped at the end of the request on every outcome.
#[derive(Debug)]
pub struct MaterializedSelection {
    table: String,
    width: usize,
    count: usize,
}

impl MaterializedSelection {
    pub fn materialize(
        conn: &Connection,
        tuples: &[IdentifierTuple],
        width: usize,
    ) -> Result<Self> {
        if width == 0 {
            return Err(SweepError::Config(
                "cannot materialize a selection: no identifier columns declared".to_string(),
            ));
        }
        let table = format!(
            "picked_{}",
            SELECTION_SEQUENCE.fetch_add(1, Ordering::Relaxed)
        );
        let columns = (1..=width)
            .map(|i| format!("key_{i} text"))
            .collect::<Vec<_>>()
            .join(", ");
        conn.execute_batch(&format!(
            "create temp table {table} (seq integer primary key, {columns})"
        ))?;
        let names = (1..=width)
            .map(|i| format!("key_{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let markers = (0..=width)
            .map(|i| format!("?{}", i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let mut insert =
            conn.prepare(&format!("insert into {table} (seq, {names}) values ({markers})"))?;
        for (seq, tuple) in tuples.iter().enumerate() {
            // Column-aligned up to the declared width: short tuples pad with
            // null, extra values are ignored.
            let mut row: Vec<Value> = Vec::with_capacity(width + 1);
            row.push(Value::Integer(seq as i64 + 1));
            for i in 0..width {
                match tuple.values().get(i) {
                    Some(value) => row.push(Value::Text(value.clone())),
                    None => row.push(Value::Null),
                }
            }
            insert.execute(params_from_iter(row))?;
        }
        debug!(table = %table, tuples = tuples.len(), "selection materialized");
        Ok(Self { table, width, count: tuples.len() })
    }

    pub fn table(&self) -> &str {
        &self.table
    }
    pub fn width(&self) -> usize {
        self.width
    }
    pub fn len(&self) -> usize {
        self.count
    }
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Read the store back in sequence order. Trailing padding restores each
    /// tuple to its original column count.
    pub fn entries(&self, conn: &Connection) -> Result<Vec<IdentifierTuple>> {
        let columns = (1..=self.width)
            .map(|i| format!("key_{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut stmt = conn.prepare(&format!(
            "select {columns} from {} order by seq",
            self.table
        ))?;
        let mut rows = stmt.query([])?;
        let mut entries = Vec::with_capacity(self.count);
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(self.width);
            for i in 0..self.width {
                match row.get::<_, Option<String>>(i)? {
                    Some(value) => values.push(value),
                    None => break,
                }
            }
            entries.push(IdentifierTuple::new(values));
        }
        Ok(entries)
    }

    /// Tear the store down. Runs on every exit path, so failures only warn.
    pub fn discard(&self, conn: &Connection) {
        if let Err(e) = conn.execute_batch(&format!("drop table if exists {}", self.table)) {
            warn!(table = %self.table, error = %e, "failed to drop materialized selection");
        }
    }
}
