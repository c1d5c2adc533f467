//! The server-side entry point.
//!
//! An [`Engine`] owns the dataset connection and the registries of datasets
//! and actions. [`Engine::run`] is the one request path: decode the payload,
//! materialize the selection, process the rows, compose the envelope, and
//! tear the materialized selection down whatever happened in between.

use std::collections::HashMap;
use std::hash::BuildHasherDefault;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use seahash::SeaHasher;
use tracing::debug;

use crate::dataset::DatasetMeta;
use crate::envelope::{self, ActionMessages, BatchRequest, Mode, ResultEnvelope};
use crate::error::{Result, SweepError};
use crate::process::{self, ItemMap, RowMutation};
use crate::selection::{self, MaterializedSelection};

pub type RegistryHasher = BuildHasherDefault<SeaHasher>;

// ------------- ActionDefinition -------------
/// A server-registered action: the dataset it runs against, the mutation
/// fragment applied to each row, and the configured messages.
pub struct ActionDefinition {
    name: String,
    dataset: String,
    mutation: Arc<dyn RowMutation>,
    messages: ActionMessages,
}

impl ActionDefinition {
    pub fn new(
        name: impl Into<String>,
        dataset: impl Into<String>,
        mutation: Arc<dyn RowMutation>,
    ) -> Self {
        Self {
            name: name.into(),
            dataset: dataset.into(),
            mutation,
            messages: ActionMessages::default(),
        }
    }
    pub fn with_messages(mut self, messages: ActionMessages) -> Self {
        self.messages = messages;
        self
    }
    pub fn name(&self) -> &str {
        &self.name
    }
    pub fn dataset(&self) -> &str {
        &self.dataset
    }
    pub fn messages(&self) -> &ActionMessages {
        &self.messages
    }
}

// ------------- Engine -------------
pub struct Engine {
    conn: Mutex<Connection>,
    datasets: HashMap<String, DatasetMeta, RegistryHasher>,
    actions: HashMap<String, ActionDefinition, RegistryHasher>,
}

impl Engine {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
            datasets: HashMap::default(),
            actions: HashMap::default(),
        }
    }

    pub fn register_dataset(&mut self, dataset: DatasetMeta) {
        self.datasets.insert(dataset.name().to_string(), dataset);
    }

    pub fn register_action(&mut self, action: ActionDefinition) {
        self.actions.insert(action.name().to_string(), action);
    }

    /// Run some work against the dataset connection. Used for seeding and
    /// for inspecting state from tests.
    pub fn with_connection<R>(&self, apply: impl FnOnce(&Connection) -> Result<R>) -> Result<R> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| SweepError::Lock(e.to_string()))?;
        apply(&conn)
    }

    /// Execute one batch action request and return its envelope.
    ///
    /// Row-mutation failures come back inside an error-status envelope;
    /// configuration problems (unknown action or dataset, missing identifier
    /// columns, missing table) are hard errors and produce no envelope.
    pub fn run(&self, action_name: &str, request: &BatchRequest) -> Result<ResultEnvelope> {
        let action = self
            .actions
            .get(action_name)
            .ok_or_else(|| SweepError::UnknownAction(action_name.to_string()))?;
        let dataset = self.datasets.get(&action.dataset).ok_or_else(|| {
            SweepError::Config(format!(
                "action '{}' references unknown dataset '{}'",
                action.name, action.dataset
            ))
        })?;
        let mut items: ItemMap = request
            .items_to_submit
            .iter()
            .map(|item| (item.name.clone(), item.value.clone()))
            .collect();
        let tuples = match request.mode {
            Mode::Selection => selection::decode(&request.selection_payload)?,
            Mode::Filtered => Vec::new(),
        };
        if request.mode == Mode::Selection && tuples.is_empty() {
            // Nothing to scope the mutation to; the engine is never touched.
            debug!(action = %action.name, "empty selection, short-circuiting");
            return Ok(envelope::compose_empty_selection(&action.messages, &items));
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| SweepError::Lock(e.to_string()))?;
        dataset.verify(&conn)?;
        let materialized = match request.mode {
            Mode::Selection => {
                let width = dataset.identifier_columns().len();
                if width == 0 {
                    return Err(SweepError::Config(format!(
                        "dataset '{}' declares no identifier columns, cannot scope a selection",
                        dataset.name()
                    )));
                }
                Some(MaterializedSelection::materialize(&conn, &tuples, width)?)
            }
            Mode::Filtered => None,
        };
        let processed = process::process(
            &mut conn,
            dataset,
            materialized.as_ref(),
            action.mutation.as_ref(),
            &mut items,
        );
        // Torn down on success and failure alike; it never outlives the request.
        if let Some(materialized) = &materialized {
            materialized.discard(&conn);
        }
        let outcome = processed?;
        debug!(
            action = %action.name,
            rows = outcome.rows_processed,
            failed = outcome.failure.is_some(),
            "batch pass finished"
        );
        Ok(envelope::compose(outcome, &action.messages, request, &items))
    }
}
