//! The request/response protocol and the response composer.
//!
//! Every request produces exactly one [`ResultEnvelope`]. The composer
//! resolves messages (fragment overrides beat configured defaults), performs
//! token substitution and HTML escaping per the request's toggles, and folds
//! the fragment's control signals into the envelope.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

use crate::process::{ItemMap, RunOutcome};

// ------------- Vocabulary -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Success,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Selection,
    Filtered,
}

/// Notification category; overrides the status-derived one when set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageCategory {
    Success,
    Warning,
    Error,
    Info,
}

/// Whether a mutation fragment asked for the downstream action sequence to
/// be cancelled. Parsed from the legacy token vocabulary, but carried as a
/// tagged value from there on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CancelRequest {
    #[default]
    No,
    Requested,
}

impl CancelRequest {
    /// `cancel`, `stop` and `true` all request cancellation, matched
    /// case-insensitively; anything else does not.
    pub fn parse(token: &str) -> Self {
        let token = token.trim();
        if token.eq_ignore_ascii_case("cancel")
            || token.eq_ignore_ascii_case("stop")
            || token.eq_ignore_ascii_case("true")
        {
            CancelRequest::Requested
        } else {
            CancelRequest::No
        }
    }
    pub fn requested(&self) -> bool {
        matches!(self, CancelRequest::Requested)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedValue {
    pub name: String,
    pub value: String,
}

impl NamedValue {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self { name: name.into(), value: value.into() }
    }
}

// ------------- Request -------------
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchRequest {
    pub mode: Mode,
    #[serde(rename = "selectionPayload", default)]
    pub selection_payload: Vec<String>,
    #[serde(rename = "itemsToSubmit", default)]
    pub items_to_submit: Vec<NamedValue>,
    #[serde(rename = "refreshSelection", default)]
    pub refresh_selection: bool,
    #[serde(rename = "refreshGrid", default)]
    pub refresh_grid: bool,
    #[serde(rename = "removeSelection", default)]
    pub remove_selection: bool,
    #[serde(rename = "performSubstitutions", default = "default_true")]
    pub perform_substitutions: bool,
    #[serde(rename = "escapeMessage", default = "default_true")]
    pub escape_message: bool,
    #[serde(rename = "dismissAfter", default)]
    pub dismiss_after: u64,
}

impl BatchRequest {
    pub fn selection(payload: Vec<String>) -> Self {
        Self {
            mode: Mode::Selection,
            selection_payload: payload,
            items_to_submit: Vec::new(),
            refresh_selection: false,
            refresh_grid: false,
            remove_selection: false,
            perform_substitutions: true,
            escape_message: true,
            dismiss_after: 0,
        }
    }
    pub fn filtered() -> Self {
        Self { mode: Mode::Filtered, ..Self::selection(Vec::new()) }
    }
}

// ------------- Response -------------
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultEnvelope {
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(rename = "messageTitle", skip_serializing_if = "Option::is_none", default)]
    pub message_title: Option<String>,
    #[serde(rename = "messageType", skip_serializing_if = "Option::is_none", default)]
    pub message_type: Option<MessageCategory>,
    #[serde(rename = "itemsToReturn", default)]
    pub items_to_return: Vec<NamedValue>,
    #[serde(rename = "cancelActions")]
    pub cancel_actions: bool,
    #[serde(rename = "eventName", skip_serializing_if = "Option::is_none", default)]
    pub event_name: Option<String>,
}

/// The messages an action is configured with. Any of them may be absent, in
/// which case the corresponding outcome shows no notification.
#[derive(Debug, Clone)]
pub struct ActionMessages {
    pub success: Option<String>,
    pub error: Option<String>,
    pub empty_selection: Option<String>,
    pub title: Option<String>,
    /// Whether an empty selection announces itself at all (the configured
    /// `empty_selection` text is only shown when this is set).
    pub announce_empty_selection: bool,
}

impl Default for ActionMessages {
    fn default() -> Self {
        Self {
            success: None,
            error: None,
            empty_selection: None,
            title: None,
            announce_empty_selection: true,
        }
    }
}

// ------------- Message templating -------------
lazy_static! {
    static ref TOKEN: Regex = Regex::new(r"\$\{([A-Za-z0-9_.-]+)\}").unwrap();
}

/// Replace `${name}` tokens in a single pass. Replacement text is inserted
/// literally and never rescanned, so substitution runs exactly once. Tokens
/// the resolver does not know stay as they are.
pub fn substitute<F>(raw: &str, resolve: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    TOKEN
        .replace_all(raw, |caps: &Captures| {
            resolve(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

pub fn escape_html(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

// ------------- Composer -------------
fn items_to_return(items: &ItemMap) -> Vec<NamedValue> {
    items
        .iter()
        .map(|(name, value)| NamedValue::new(name.clone(), value.clone()))
        .collect()
}

/// Package a finished run into the envelope. Called exactly once per request.
pub fn compose(
    outcome: RunOutcome,
    messages: &ActionMessages,
    request: &BatchRequest,
    items: &ItemMap,
) -> ResultEnvelope {
    let RunOutcome { failure, signals, .. } = outcome;
    let (status, raw_message) = match &failure {
        None => (
            Status::Success,
            signals.message.clone().or_else(|| messages.success.clone()),
        ),
        Some(_) => (
            Status::Error,
            signals.message.clone().or_else(|| messages.error.clone()),
        ),
    };
    let message = raw_message.map(|raw| match &failure {
        None => {
            if request.perform_substitutions {
                substitute(&raw, |name| items.get(name).cloned())
            } else {
                raw
            }
        }
        // Error identity tokens always resolve server-side; the client never
        // sees the identity itself. Item tokens still honor the toggle.
        Some(error) => substitute(&raw, |name| match name {
            "error.code" => Some(error.code.to_string()),
            "error.text" => Some(error.text.clone()),
            "error.message" => Some(error.message.clone()),
            _ if request.perform_substitutions => items.get(name).cloned(),
            _ => None,
        }),
    });
    let title = signals.title.clone().or_else(|| messages.title.clone());
    let (message, title) = if request.escape_message {
        (
            message.map(|m| escape_html(&m)),
            title.map(|t| escape_html(&t)),
        )
    } else {
        (message, title)
    };
    ResultEnvelope {
        status,
        message,
        message_title: title,
        message_type: signals.category,
        items_to_return: items_to_return(items),
        cancel_actions: failure.is_some() || signals.cancel.requested(),
        event_name: signals.event.clone(),
    }
}

/// The zero-selection short-circuit: nothing was processed, the configured
/// message (if announced) is shown as a warning, downstream actions continue.
pub fn compose_empty_selection(messages: &ActionMessages, items: &ItemMap) -> ResultEnvelope {
    let message = if messages.announce_empty_selection {
        messages.empty_selection.clone()
    } else {
        None
    };
    ResultEnvelope {
        status: Status::Success,
        message_type: message.as_ref().map(|_| MessageCategory::Warning),
        message,
        message_title: messages.title.clone(),
        items_to_return: items_to_return(items),
        cancel_actions: false,
        event_name: None,
    }
}
