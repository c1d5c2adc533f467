use std::sync::Arc;

use rusqlite::Connection;

use gridsweep::client::{
    ActionClient, DispatchOptions, EventSink, GridView, InProcessTransport, Notification,
    Notifier, ReloadFollowup, Transport, TransportError,
};
use gridsweep::dataset::{Cell, ColumnMeta, DatasetMeta};
use gridsweep::engine::{ActionDefinition, Engine};
use gridsweep::envelope::{
    ActionMessages, BatchRequest, MessageCategory, ResultEnvelope,
};
use gridsweep::error::{Result, SweepError};
use gridsweep::process::{ItemMap, MutationScope, RowCells, RowMutation};
use gridsweep::selection::IdentifierTuple;

// ------------- Fakes for the view ports -------------

#[derive(Default)]
struct FakeGrid {
    log: Vec<String>,
    pending: Option<ReloadFollowup>,
}

impl FakeGrid {
    /// The view's asynchronous reload finishing, observed later.
    fn complete_reload(&mut self) {
        self.log.push("reload-complete".to_string());
        if let Some(followup) = self.pending.take() {
            match followup {
                ReloadFollowup::ClearSelection => self.clear_selection(),
            }
        }
    }
}

impl GridView for FakeGrid {
    fn refetch_records(&mut self, keys: &[IdentifierTuple]) {
        self.log.push(format!("refetch:{}", keys.len()));
    }
    fn request_reload(&mut self) {
        self.log.push("reload-requested".to_string());
    }
    fn clear_selection(&mut self) {
        self.log.push("selection-cleared".to_string());
    }
    fn on_next_reload(&mut self, followup: ReloadFollowup) {
        self.pending = Some(followup);
    }
}

#[derive(Default)]
struct FakeNotifier {
    notes: Vec<Notification>,
}

impl Notifier for FakeNotifier {
    fn notify(&mut self, notification: &Notification) {
        self.notes.push(notification.clone());
    }
}

#[derive(Default)]
struct FakeEvents {
    raised: Vec<String>,
}

impl EventSink for FakeEvents {
    fn raise(&mut self, event: &str, _envelope: &ResultEnvelope) {
        self.raised.push(event.to_string());
    }
}

struct FailingTransport;

impl Transport for FailingTransport {
    fn send(
        &mut self,
        _action: &str,
        _request: &BatchRequest,
    ) -> std::result::Result<ResultEnvelope, TransportError> {
        Err(TransportError("connection refused".to_string()))
    }
}

// ------------- Engine fixture -------------

fn engine(mutation: Arc<dyn RowMutation>, messages: ActionMessages) -> Arc<Engine> {
    let conn = Connection::open_in_memory().expect("db");
    conn.execute_batch(
        "create table task (id text, state text);
         insert into task values ('t1', 'open'), ('t2', 'open')",
    )
    .expect("seed");
    let mut engine = Engine::new(conn);
    engine.register_dataset(
        DatasetMeta::new("tasks", "task")
            .with_column(ColumnMeta::new("id", true))
            .with_column(ColumnMeta::new("state", false)),
    );
    engine.register_action(ActionDefinition::new("close", "tasks", mutation).with_messages(messages));
    Arc::new(engine)
}

fn close_mutation() -> Arc<dyn RowMutation> {
    Arc::new(|row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
        let id = row.get("id").cloned().unwrap_or(Cell::Null);
        scope.connection().execute(
            "update task set state = 'closed' where id = ?1",
            rusqlite::params![id],
        )?;
        Ok(())
    })
}

fn client_for(
    engine: &Arc<Engine>,
    options: DispatchOptions,
) -> ActionClient<InProcessTransport> {
    ActionClient::new("close", InProcessTransport::new(Arc::clone(engine)), options)
}

fn one_selected() -> Vec<IdentifierTuple> {
    vec![IdentifierTuple::single("t1")]
}

// ------------- Tests -------------

#[test]
fn selection_clear_waits_for_the_reload_to_complete() {
    let engine = engine(close_mutation(), ActionMessages::default());
    let mut client = client_for(
        &engine,
        DispatchOptions {
            refresh_grid: true,
            remove_selection: true,
            ..DispatchOptions::default()
        },
    );
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    let continuation = client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert!(continuation.completed);
    assert!(!continuation.cancel_followups);
    assert!(
        grid.log.contains(&"reload-requested".to_string()),
        "the refresh is requested: {:?}",
        grid.log
    );
    assert!(
        !grid.log.contains(&"selection-cleared".to_string()),
        "the clear must not race the refresh: {:?}",
        grid.log
    );
    grid.complete_reload();
    assert_eq!(
        grid.log,
        vec!["reload-requested", "reload-complete", "selection-cleared"],
        "the clear runs only after the reload-complete signal"
    );
    // The followup was one-shot; a later reload does not clear again.
    grid.complete_reload();
    assert_eq!(
        grid.log
            .iter()
            .filter(|entry| *entry == "selection-cleared")
            .count(),
        1
    );
}

#[test]
fn without_a_grid_refresh_the_clear_is_immediate() {
    let engine = engine(close_mutation(), ActionMessages::default());
    let mut client = client_for(
        &engine,
        DispatchOptions { remove_selection: true, ..DispatchOptions::default() },
    );
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(grid.log, vec!["selection-cleared"]);
}

#[test]
fn the_originally_captured_selection_is_refetched() {
    let engine = engine(close_mutation(), ActionMessages::default());
    let mut client = client_for(
        &engine,
        DispatchOptions { refresh_selection: true, ..DispatchOptions::default() },
    );
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    let selected = vec![IdentifierTuple::single("t1"), IdentifierTuple::single("t2")];
    client.run(&selected, &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(grid.log, vec!["refetch:2"]);
}

#[test]
fn propagated_items_land_in_caller_state() {
    let mutation: Arc<dyn RowMutation> =
        Arc::new(|_row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
            scope.set_item("touched", "yes");
            Ok(())
        });
    let engine = engine(mutation, ActionMessages::default());
    let mut client = client_for(
        &engine,
        DispatchOptions {
            submit_items: vec!["state".to_string()],
            ..DispatchOptions::default()
        },
    );
    let mut state = ItemMap::new();
    state.insert("state".to_string(), "closed".to_string());
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(state.get("touched").map(String::as_str), Some("yes"));
    assert_eq!(state.get("state").map(String::as_str), Some("closed"));
}

#[test]
fn notification_kind_follows_status_and_category() {
    let engine = engine(
        close_mutation(),
        ActionMessages {
            success: Some("Done.".to_string()),
            ..ActionMessages::default()
        },
    );
    let mut client = client_for(&engine, DispatchOptions::default());
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(notifier.notes.len(), 1);
    assert_eq!(notifier.notes[0].kind, MessageCategory::Success);
    assert_eq!(notifier.notes[0].text, "Done.");

    let overriding: Arc<dyn RowMutation> =
        Arc::new(|_row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
            scope.set_message("Heads up");
            scope.set_category(MessageCategory::Info);
            Ok(())
        });
    let engine = engine_with_override(overriding);
    let mut client = client_for(&engine, DispatchOptions::default());
    let mut notifier = FakeNotifier::default();
    client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(notifier.notes[0].kind, MessageCategory::Info);
}

fn engine_with_override(mutation: Arc<dyn RowMutation>) -> Arc<Engine> {
    engine(mutation, ActionMessages::default())
}

#[test]
fn a_failing_row_notifies_an_error_and_cancels_followups() {
    let mutation: Arc<dyn RowMutation> =
        Arc::new(|_row: &RowCells, _scope: &mut MutationScope<'_>| -> Result<()> {
            Err(SweepError::execution(9, "refused"))
        });
    let engine = engine(
        mutation,
        ActionMessages {
            error: Some("Failed: ${error.message}".to_string()),
            ..ActionMessages::default()
        },
    );
    let mut client = client_for(&engine, DispatchOptions::default());
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    let continuation = client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert!(continuation.completed);
    assert!(continuation.cancel_followups);
    assert_eq!(notifier.notes.len(), 1);
    assert_eq!(notifier.notes[0].kind, MessageCategory::Error);
    assert_eq!(notifier.notes[0].text, "Failed: refused");
}

#[test]
fn a_raised_event_reaches_the_sink() {
    let mutation: Arc<dyn RowMutation> =
        Arc::new(|_row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
            scope.raise_event("records-closed");
            Ok(())
        });
    let engine = engine(mutation, ActionMessages::default());
    let mut client = client_for(&engine, DispatchOptions::default());
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert_eq!(events.raised, vec!["records-closed"]);
}

#[test]
fn a_fragment_cancellation_reaches_the_continuation() {
    let mutation: Arc<dyn RowMutation> =
        Arc::new(|_row: &RowCells, scope: &mut MutationScope<'_>| -> Result<()> {
            scope.request_cancel();
            Ok(())
        });
    let engine = engine(mutation, ActionMessages::default());
    let mut client = client_for(&engine, DispatchOptions::default());
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    let continuation = client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert!(continuation.completed);
    assert!(continuation.cancel_followups);
}

#[test]
fn a_transport_failure_resumes_the_sequence_in_a_failed_state() {
    let mut client = ActionClient::new("close", FailingTransport, DispatchOptions::default());
    let mut state = ItemMap::new();
    let mut grid = FakeGrid::default();
    let mut notifier = FakeNotifier::default();
    let mut events = FakeEvents::default();
    let continuation = client.run(&one_selected(), &mut state, &mut grid, &mut notifier, &mut events);
    assert!(!continuation.completed);
    assert!(continuation.cancel_followups);
    assert!(notifier.notes.is_empty(), "no envelope, no notification");
    assert!(grid.log.is_empty(), "no reconciliation happens");
    assert!(events.raised.is_empty());
}
