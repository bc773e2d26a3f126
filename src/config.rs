//! Component options from defaults, JSON, or environment variables.

#[cfg(test)]
#[path = "config_test.rs"]
mod config_test;

use std::env::VarError;

use serde::Deserialize;

pub const ENV_NAME: &str = "STORAGE_SYNC_NAME";
pub const ENV_USE_RAW: &str = "STORAGE_SYNC_USE_RAW";
pub const ENV_AUTO_SAVE_DISABLED: &str = "STORAGE_SYNC_AUTO_SAVE_DISABLED";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{var} must be a boolean (true/false/1/0), got '{value}'")]
    InvalidBool { var: &'static str, value: String },
    #[error("invalid options JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Initial property values for a `StorageSync`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncOptions {
    /// Storage key.
    pub name: String,
    /// Store the value as a raw string instead of JSON.
    pub use_raw: bool,
    /// Only persist on explicit `save()`.
    pub auto_save_disabled: bool,
}

impl SyncOptions {
    #[must_use]
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    /// Parse options from a JSON object such as
    /// `{"name": "my-app-storage", "useRaw": false}`. Missing fields default.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Build options from environment variables.
    ///
    /// Optional:
    /// - `STORAGE_SYNC_NAME`: storage key (default empty)
    /// - `STORAGE_SYNC_USE_RAW`: default false
    /// - `STORAGE_SYNC_AUTO_SAVE_DISABLED`: default false
    pub fn from_env() -> Result<Self, ConfigError> {
        let name = std::env::var(ENV_NAME).unwrap_or_default();
        let use_raw = env_bool(ENV_USE_RAW)?;
        let auto_save_disabled = env_bool(ENV_AUTO_SAVE_DISABLED)?;
        Ok(Self { name, use_raw, auto_save_disabled })
    }
}

fn env_bool(var: &'static str) -> Result<bool, ConfigError> {
    match std::env::var(var) {
        Ok(value) => parse_bool(var, &value),
        Err(VarError::NotPresent) => Ok(false),
        Err(VarError::NotUnicode(raw)) => Err(ConfigError::InvalidBool { var, value: raw.to_string_lossy().into_owned() }),
    }
}

fn parse_bool(var: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" | "" => Ok(false),
        _ => Err(ConfigError::InvalidBool { var, value: value.to_owned() }),
    }
}
