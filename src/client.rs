//! The caller's side of the protocol.
//!
//! An [`ActionClient`] encodes the captured selection, issues the request
//! through a [`Transport`], and reconciles the envelope with the caller's
//! state: propagated items, selection and grid refreshes, the notification,
//! an optional event, and the continuation of the action sequence. A
//! transport failure bypasses the envelope entirely and resumes the caller
//! in a failed state.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::engine::Engine;
use crate::envelope::{
    BatchRequest, MessageCategory, Mode, NamedValue, ResultEnvelope, Status,
};
use crate::process::ItemMap;
use crate::selection::{self, IdentifierTuple};

// ------------- Transport -------------
#[derive(Debug)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Carries one request to the server and one envelope back. A failure here
/// means the request never produced an envelope at all.
pub trait Transport {
    fn send(
        &mut self,
        action: &str,
        request: &BatchRequest,
    ) -> std::result::Result<ResultEnvelope, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &mut T {
    fn send(
        &mut self,
        action: &str,
        request: &BatchRequest,
    ) -> std::result::Result<ResultEnvelope, TransportError> {
        (**self).send(action, request)
    }
}

/// Runs requests directly against an in-process engine, the way one-off
/// scripts and tests drive it. Hard engine errors surface as transport
/// failures, matching what an HTTP client sees for a non-2xx response.
pub struct InProcessTransport {
    engine: Arc<Engine>,
}

impl InProcessTransport {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

impl Transport for InProcessTransport {
    fn send(
        &mut self,
        action: &str,
        request: &BatchRequest,
    ) -> std::result::Result<ResultEnvelope, TransportError> {
        self.engine
            .run(action, request)
            .map_err(|e| TransportError(e.to_string()))
    }
}

// ------------- View ports -------------
/// A one-shot followup the grid applies when its next reload completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadFollowup {
    ClearSelection,
}

/// The host grid component, as far as this module needs it.
pub trait GridView {
    /// Re-fetch the given records to refresh their visual state.
    fn refetch_records(&mut self, keys: &[IdentifierTuple]);
    /// Ask for a full reload of the dataset view. Completes asynchronously.
    fn request_reload(&mut self);
    /// Drop the current selection immediately.
    fn clear_selection(&mut self);
    /// Register a followup to run once, when the next reload completes.
    fn on_next_reload(&mut self, followup: ReloadFollowup);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub kind: MessageCategory,
    pub title: Option<String>,
    pub text: String,
    pub dismiss_after_ms: u64,
}

pub trait Notifier {
    fn notify(&mut self, notification: &Notification);
}

pub trait EventSink {
    fn raise(&mut self, event: &str, envelope: &ResultEnvelope);
}

// ------------- Dispatch -------------
/// How one action invocation behaves on the client side.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    pub mode: Mode,
    pub refresh_selection: bool,
    pub refresh_grid: bool,
    pub remove_selection: bool,
    pub perform_substitutions: bool,
    pub escape_message: bool,
    pub dismiss_after_ms: u64,
    /// Names of caller-state values submitted to the mutation fragment.
    pub submit_items: Vec<String>,
    /// Shown when the selection is empty, without any round trip.
    pub empty_selection_message: Option<String>,
    pub announce_empty_selection: bool,
    pub chunk_size: usize,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            mode: Mode::Selection,
            refresh_selection: false,
            refresh_grid: false,
            remove_selection: false,
            perform_substitutions: true,
            escape_message: true,
            dismiss_after_ms: 0,
            submit_items: Vec::new(),
            empty_selection_message: None,
            announce_empty_selection: true,
            chunk_size: 2000,
        }
    }
}

/// How the caller's suspended action sequence resumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation {
    /// False when the request never completed (transport failure).
    pub completed: bool,
    /// True when downstream actions should be skipped.
    pub cancel_followups: bool,
}

pub struct ActionClient<T: Transport> {
    action: String,
    transport: T,
    options: DispatchOptions,
}

impl<T: Transport> ActionClient<T> {
    pub fn new(action: impl Into<String>, transport: T, options: DispatchOptions) -> Self {
        Self { action: action.into(), transport, options }
    }

    pub fn options(&self) -> &DispatchOptions {
        &self.options
    }

    /// Issue the action for the given selection and reconcile the response.
    /// Exactly one continuation comes back on every path.
    pub fn run(
        &mut self,
        selected: &[IdentifierTuple],
        state: &mut ItemMap,
        grid: &mut dyn GridView,
        notifier: &mut dyn Notifier,
        events: &mut dyn EventSink,
    ) -> Continuation {
        if self.options.mode == Mode::Selection && selected.is_empty() {
            // Nothing to do server-side; announce locally if configured.
            if self.options.announce_empty_selection {
                if let Some(text) = &self.options.empty_selection_message {
                    notifier.notify(&Notification {
                        kind: MessageCategory::Warning,
                        title: None,
                        text: text.clone(),
                        dismiss_after_ms: self.options.dismiss_after_ms,
                    });
                }
            }
            return Continuation { completed: true, cancel_followups: false };
        }

        // Captured before the request goes out; the refresh path uses this
        // snapshot, not whatever the grid reports afterwards.
        let captured: Vec<IdentifierTuple> = selected.to_vec();
        let payload = match selection::encode(&captured, self.options.chunk_size) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(action = %self.action, error = %e, "selection payload rejected");
                return Continuation { completed: false, cancel_followups: true };
            }
        };
        let request = BatchRequest {
            mode: self.options.mode,
            selection_payload: payload,
            items_to_submit: self
                .options
                .submit_items
                .iter()
                .filter_map(|name| {
                    state.get(name).map(|value| NamedValue::new(name.clone(), value.clone()))
                })
                .collect(),
            refresh_selection: self.options.refresh_selection,
            refresh_grid: self.options.refresh_grid,
            remove_selection: self.options.remove_selection,
            perform_substitutions: self.options.perform_substitutions,
            escape_message: self.options.escape_message,
            dismiss_after: self.options.dismiss_after_ms,
        };
        match self.transport.send(&self.action, &request) {
            Ok(envelope) => self.reconcile(envelope, &captured, state, grid, notifier, events),
            Err(e) => {
                // No envelope, no notification; the sequence resumes failed.
                warn!(action = %self.action, error = %e, "transport failure");
                Continuation { completed: false, cancel_followups: true }
            }
        }
    }

    fn reconcile(
        &self,
        envelope: ResultEnvelope,
        captured: &[IdentifierTuple],
        state: &mut ItemMap,
        grid: &mut dyn GridView,
        notifier: &mut dyn Notifier,
        events: &mut dyn EventSink,
    ) -> Continuation {
        for item in &envelope.items_to_return {
            state.insert(item.name.clone(), item.value.clone());
        }
        if self.options.refresh_selection {
            grid.refetch_records(captured);
        }
        if self.options.refresh_grid {
            // Clearing the selection must wait for the reload to complete,
            // otherwise it races the refresh. Register first, then trigger.
            if self.options.remove_selection {
                grid.on_next_reload(ReloadFollowup::ClearSelection);
            }
            grid.request_reload();
        } else if self.options.remove_selection {
            grid.clear_selection();
        }
        if let Some(text) = &envelope.message {
            let kind = envelope.message_type.unwrap_or(match envelope.status {
                Status::Success => MessageCategory::Success,
                Status::Error => MessageCategory::Error,
            });
            notifier.notify(&Notification {
                kind,
                title: envelope.message_title.clone(),
                text: text.clone(),
                dismiss_after_ms: self.options.dismiss_after_ms,
            });
        }
        if let Some(event) = &envelope.event_name {
            events.raise(event, &envelope);
        }
        Continuation { completed: true, cancel_followups: envelope.cancel_actions }
    }
}
