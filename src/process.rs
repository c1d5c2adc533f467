//! The row processor.
//!
//! One request drives one pass over the execution context: every row is
//! handed to the action's mutation fragment in turn, strictly sequentially,
//! inside a single transaction. The first failure stops the pass, rolls the
//! whole transaction back and captures the error identity for the composer.
//! Nothing the fragment signals survives the request.

use std::collections::BTreeMap;

use rusqlite::Connection;

use crate::context::{ExecutionContext, ScanFlow};
use crate::dataset::DatasetMeta;
pub use crate::dataset::RowCells;
use crate::envelope::{CancelRequest, MessageCategory};
use crate::error::{Result, SweepError};
use crate::selection::MaterializedSelection;

/// Caller state travelling with the request, readable and writable by the
/// mutation fragment, returned with current values in the envelope.
pub type ItemMap = BTreeMap<String, String>;

// ------------- Signals -------------
/// Out-of-band values a mutation fragment may set for the composer. Created
/// fresh per request and moved into the outcome, never shared.
#[derive(Debug, Default)]
pub struct Signals {
    pub message: Option<String>,
    pub title: Option<String>,
    pub category: Option<MessageCategory>,
    pub cancel: CancelRequest,
    pub event: Option<String>,
}

/// The identity of a row-mutation failure, kept for message substitution.
#[derive(Debug, Clone)]
pub struct ErrorIdentity {
    pub code: i64,
    /// The full error text, leading code included.
    pub text: String,
    /// The error text without the leading code.
    pub message: String,
}

impl ErrorIdentity {
    pub fn capture(error: &SweepError) -> Self {
        match error {
            SweepError::Execution { code, message } => Self {
                code: *code,
                text: error.to_string(),
                message: message.clone(),
            },
            other => Self {
                code: 0,
                text: other.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// What a finished pass hands to the composer.
#[derive(Debug)]
pub struct RunOutcome {
    pub rows_processed: u64,
    pub failure: Option<ErrorIdentity>,
    pub signals: Signals,
}

// ------------- MutationScope -------------
/// What a mutation fragment can reach while bound to one row: the open
/// transaction's connection, the submitted items, and the request's signals.
pub struct MutationScope<'m> {
    conn: &'m Connection,
    signals: &'m mut Signals,
    items: &'m mut ItemMap,
}

impl<'m> MutationScope<'m> {
    pub fn new(conn: &'m Connection, signals: &'m mut Signals, items: &'m mut ItemMap) -> Self {
        Self { conn, signals, items }
    }
    /// The connection carrying the request's transaction. Statements run
    /// here commit or roll back with the request as a whole.
    pub fn connection(&self) -> &Connection {
        self.conn
    }
    pub fn item(&self, name: &str) -> Option<&str> {
        self.items.get(name).map(String::as_str)
    }
    pub fn set_item(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.items.insert(name.into(), value.into());
    }
    pub fn set_message(&mut self, message: impl Into<String>) {
        self.signals.message = Some(message.into());
    }
    pub fn set_title(&mut self, title: impl Into<String>) {
        self.signals.title = Some(title.into());
    }
    pub fn set_category(&mut self, category: MessageCategory) {
        self.signals.category = Some(category);
    }
    pub fn request_cancel(&mut self) {
        self.signals.cancel = CancelRequest::Requested;
    }
    /// Legacy token form of [`request_cancel`](Self::request_cancel).
    pub fn set_cancel_token(&mut self, token: &str) {
        if CancelRequest::parse(token).requested() {
            self.signals.cancel = CancelRequest::Requested;
        }
    }
    pub fn raise_event(&mut self, event: impl Into<String>) {
        self.signals.event = Some(event.into());
    }
}

// ------------- RowMutation -------------
/// The caller-supplied logic executed once per iterated row.
pub trait RowMutation: Send + Sync {
    fn mutate(&self, row: &RowCells, scope: &mut MutationScope<'_>) -> Result<()>;
}

impl<F> RowMutation for F
where
    F: Fn(&RowCells, &mut MutationScope<'_>) -> Result<()> + Send + Sync,
{
    fn mutate(&self, row: &RowCells, scope: &mut MutationScope<'_>) -> Result<()> {
        self(row, scope)
    }
}

// ------------- Processing -------------
/// Run the whole pass. Context and cursor failures propagate as hard errors
/// (the dropped transaction rolls back); fragment failures are captured into
/// the outcome instead. The context is closed on every path.
pub fn process(
    conn: &mut Connection,
    dataset: &DatasetMeta,
    selection: Option<&MaterializedSelection>,
    mutation: &dyn RowMutation,
    items: &mut ItemMap,
) -> Result<RunOutcome> {
    let mut signals = Signals::default();
    let mut failure: Option<ErrorIdentity> = None;
    let mut rows_processed: u64 = 0;
    let tx = conn.transaction()?;
    {
        let mut context = ExecutionContext::open(&tx, dataset, selection)?;
        let scanned = context.scan(|row| {
            let mut scope = MutationScope::new(&tx, &mut signals, items);
            match mutation.mutate(&row, &mut scope) {
                Ok(()) => {
                    rows_processed += 1;
                    Ok(ScanFlow::Continue)
                }
                Err(e) => {
                    failure = Some(ErrorIdentity::capture(&e));
                    Ok(ScanFlow::Stop)
                }
            }
        });
        context.close();
        scanned?;
    }
    match failure {
        Some(identity) => {
            tx.rollback()?;
            Ok(RunOutcome { rows_processed, failure: Some(identity), signals })
        }
        None => {
            tx.commit()?;
            Ok(RunOutcome { rows_processed, failure: None, signals })
        }
    }
}
