//! Gridsweep – batch mutation of a chosen subset of rows in a tabular dataset.
//!
//! A caller picks records in a grid (or keeps its current filter), the client
//! side encodes the chosen identifier tuples into a chunked payload, and the
//! server side reconstructs that payload into an ephemeral keyed store, scopes
//! a row-iteration context to it, and applies a server-registered mutation
//! fragment to every row in turn. The whole pass is one transaction: the first
//! failing row stops the pass and rolls everything back. Each request produces
//! exactly one [`envelope::ResultEnvelope`] carrying status, messages (with
//! token substitution and optional HTML escaping), propagated items and the
//! control signals the client uses to resume its suspended action sequence.
//!
//! ## Modules
//! * [`selection`] – identifier tuples, the wire codec and the per-request
//!   materialized selection (a SQLite TEMP table keyed by sequence id).
//! * [`dataset`] – dataset registration, column metadata and row values.
//! * [`context`] – predicate construction and the execution-context cursor.
//! * [`process`] – the row processor: transaction, fail-fast, mutation
//!   fragments and their out-of-band signals.
//! * [`envelope`] – the request/response protocol and the response composer.
//! * [`engine`] – the server-side entry point tying the pieces together.
//! * [`client`] – the dispatcher and response handler on the caller's side.
//! * [`server`] – the axum HTTP surface.
//! * [`settings`] – layered file/environment configuration.
//!
//! ## Quick Start
//! ```
//! use std::sync::Arc;
//! use rusqlite::Connection;
//! use gridsweep::dataset::{Cell, ColumnMeta, DatasetMeta};
//! use gridsweep::engine::{ActionDefinition, Engine};
//! use gridsweep::envelope::{BatchRequest, Status};
//! use gridsweep::error::Result;
//! use gridsweep::process::{MutationScope, RowCells};
//! use gridsweep::selection::{self, IdentifierTuple};
//!
//! fn close_row(row: &RowCells, scope: &mut MutationScope<'_>) -> Result<()> {
//!     let id = row.get("id").cloned().unwrap_or(Cell::Null);
//!     scope.connection().execute(
//!         "update task set state = 'closed' where id = ?1",
//!         rusqlite::params![id],
//!     )?;
//!     Ok(())
//! }
//!
//! let conn = Connection::open_in_memory().unwrap();
//! conn.execute_batch(
//!     "create table task (id text, state text);
//!      insert into task values ('t1', 'open');",
//! ).unwrap();
//! let mut engine = Engine::new(conn);
//! engine.register_dataset(
//!     DatasetMeta::new("tasks", "task")
//!         .with_column(ColumnMeta::new("id", true))
//!         .with_column(ColumnMeta::new("state", false)),
//! );
//! engine.register_action(ActionDefinition::new("close", "tasks", Arc::new(close_row)));
//! let payload = selection::encode(&[IdentifierTuple::single("t1")], 512).unwrap();
//! let envelope = engine.run("close", &BatchRequest::selection(payload)).unwrap();
//! assert_eq!(envelope.status, Status::Success);
//! ```
//!
//! ## Semantics worth knowing
//! The materialized selection and the execution context are private to one
//! request and are torn down on every exit path. An empty selection never
//! reaches the engine's row machinery at all. Configuration problems (no
//! identifier columns, unknown action) are hard failures that produce no
//! envelope; row-mutation failures come back inside an error-status envelope
//! with the error identity available to message templates.

pub mod error;
pub mod selection;
pub mod dataset;
pub mod context;
pub mod process;
pub mod envelope;
pub mod engine;
pub mod client;
pub mod server;
pub mod settings;
