//! User configuration and the shared on-disk helpers.
//!
//! - **Config** (`config.json`): remote endpoints, timeouts, countdown length and
//!   the recorder entry point, saved to the platform config directory.
//! - The session record lives next to it (see [`crate::store`]).
//!
//! On macOS both resolve to `~/Library/Application Support/srot/`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

/// Application folder name under the platform config directory
pub const APP_DIR: &str = "srot";

const DEFAULT_IDENTITY_URL: &str = "https://app.softage.net/TestingSrot/api-user-validity/";
const DEFAULT_ASSIGNMENT_URL: &str = "https://app.softage.net/TestingSrot/check_task_assignment/";
const DEFAULT_RECORDER_PROGRAM: &str = "srot-recorder";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config directory not found")]
    NoConfigDir,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// User preferences (persisted to config.json).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Identity check endpoint (GET, `username` query parameter)
    #[serde(default = "default_identity_url")]
    pub identity_url: String,
    /// Assignment check endpoint (GET, `username` and `T_ID` query parameters)
    #[serde(default = "default_assignment_url")]
    pub assignment_url: String,
    /// Timeout for each remote check, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Countdown shown before the recorder starts, in seconds
    #[serde(default = "default_countdown_secs")]
    pub countdown_secs: u32,
    #[serde(default)]
    pub recorder: RecorderConfig,
}

/// How to start the recorder.
///
/// With an `interpreter` the command is `interpreter program <task> <user>`,
/// otherwise `program <task> <user>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecorderConfig {
    #[serde(default = "default_recorder_program")]
    pub program: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interpreter: Option<PathBuf>,
}

fn default_identity_url() -> String {
    DEFAULT_IDENTITY_URL.to_string()
}

fn default_assignment_url() -> String {
    DEFAULT_ASSIGNMENT_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    5
}

fn default_countdown_secs() -> u32 {
    3
}

fn default_recorder_program() -> PathBuf {
    PathBuf::from(DEFAULT_RECORDER_PROGRAM)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity_url: default_identity_url(),
            assignment_url: default_assignment_url(),
            request_timeout_secs: default_request_timeout_secs(),
            countdown_secs: default_countdown_secs(),
            recorder: RecorderConfig::default(),
        }
    }
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            program: default_recorder_program(),
            interpreter: None,
        }
    }
}

impl Config {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

// ---------------------------------------------------------------------------
// Directory helpers
// ---------------------------------------------------------------------------

/// Srot config directory (e.g. `~/Library/Application Support/srot/`).
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join(APP_DIR))
}

/// Default location of config.json.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|d| d.join("config.json"))
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load config from disk, returning defaults if the file is missing or invalid.
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    load_config_from(&path)
}

/// Save config to the default location.
pub fn save_config(config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoConfigDir)?;
    save_config_to(config, &path)?;
    Ok(path)
}

/// Load config from an explicit path, returning defaults if missing or invalid.
pub fn load_config_from(path: &Path) -> Config {
    match std::fs::read_to_string(path) {
        Ok(contents) => serde_json::from_str(&contents).unwrap_or_else(|e| {
            warn!("Ignoring invalid config {}: {}", path.display(), e);
            Config::default()
        }),
        Err(_) => Config::default(),
    }
}

pub fn save_config_to(config: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    atomic_write(path, json.as_bytes())?;
    Ok(())
}

/// Write bytes to a file atomically: write to a temp file in the same
/// directory, then rename over the target. Prevents partial JSON on crash.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    use std::io::Write;

    let parent = path.parent().ok_or_else(|| {
        std::io::Error::new(std::io::ErrorKind::InvalidInput, "path has no parent")
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
