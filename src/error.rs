
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SweepError {
    #[error("Config error: {0}")]
    Config(String),
    #[error("Persistence error: {0}")]
    Persistence(String),
    #[error("Selection error: {0}")]
    Selection(String),
    #[error("Unknown action: {0}")]
    UnknownAction(String),
    #[error("Execution error {code}: {message}")]
    Execution { code: i64, message: String },
    #[error("Internal invariant violated: {0}")]
    Invariant(String),
    #[error("Lock poisoned: {0}")]
    Lock(String),
    #[error("Server error: {0}")]
    Server(String),
}

impl SweepError {
    /// A row-level failure carrying an identity the error message templates can reference.
    pub fn execution(code: i64, message: impl Into<String>) -> Self {
        Self::Execution { code, message: message.into() }
    }
}

pub type Result<T> = std::result::Result<T, SweepError>;

// Helper conversions
impl From<rusqlite::Error> for SweepError {
    fn from(e: rusqlite::Error) -> Self { Self::Persistence(e.to_string()) }
}
