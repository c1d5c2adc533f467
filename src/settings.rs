//! Layered runtime configuration: `gridsweep.toml` in the working directory,
//! overridden by `GRIDSWEEP_*` environment variables (`__` separates levels,
//! e.g. `GRIDSWEEP_SERVER__PORT=9000`). Everything has a default so the
//! binary starts without any file at all.

use serde::Deserialize;

use crate::error::{Result, SweepError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub dataset: DatasetSettings,
    pub action: ActionSettings,
    pub messages: MessageSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            database: DatabaseSettings::default(),
            dataset: DatasetSettings::default(),
            action: ActionSettings::default(),
            messages: MessageSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 8712 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// "memory" or "file".
    pub mode: String,
    pub path: Option<String>,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self { mode: "memory".to_string(), path: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatasetSettings {
    pub table: String,
    pub identifier_columns: Vec<String>,
    pub base_filter: Option<String>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            table: "task".to_string(),
            identifier_columns: vec!["id".to_string()],
            base_filter: None,
        }
    }
}

/// The built-in column-update action the binary registers: set `set_column`
/// on each targeted row to the value of the submitted item `from_item`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ActionSettings {
    pub name: String,
    pub set_column: String,
    pub from_item: String,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            name: "update".to_string(),
            set_column: "state".to_string(),
            from_item: "state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MessageSettings {
    pub success: Option<String>,
    pub error: Option<String>,
    pub empty_selection: Option<String>,
    pub title: Option<String>,
    pub announce_empty_selection: bool,
    pub dismiss_after_ms: u64,
}

impl Default for MessageSettings {
    fn default() -> Self {
        Self {
            success: Some("Selected records processed.".to_string()),
            error: Some("Processing failed: ${error.message}".to_string()),
            empty_selection: Some("No records selected.".to_string()),
            title: None,
            announce_empty_selection: true,
            dismiss_after_ms: 0,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let cfg = config::Config::builder()
            .add_source(config::File::with_name("gridsweep").required(false))
            .add_source(
                config::Environment::with_prefix("GRIDSWEEP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| SweepError::Config(e.to_string()))?;
        cfg.try_deserialize()
            .map_err(|e| SweepError::Config(e.to_string()))
    }
}
