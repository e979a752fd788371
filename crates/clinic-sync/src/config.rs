//! # Ledger Configuration
//!
//! Configuration for the backend client, local store, refresh sequencing
//! and outbox replay.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     CLINIC_BACKEND_URL=https://api.clinic.example                      │
//! │     CLINIC_DB_PATH=/var/lib/clinic/clinic.db                           │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/ledger/ledger.toml (Linux)                               │
//! │     ~/Library/Application Support/com.clinic.ledger/ledger.toml (macOS)│
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [backend]
//! base_url = "https://api.clinic.example/api"
//! timeout_secs = 15
//!
//! [store]
//! database_path = "/var/lib/clinic/clinic.db"
//!
//! [reconcile]
//! refresh_delay_ms = 750
//! skip_delay_when_acknowledged = true
//!
//! [outbox]
//! replay_enabled = true
//! batch_size = 50
//! poll_interval_secs = 30
//! max_attempts = 10
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Backend Settings
// =============================================================================

/// Where and how to reach the clinic backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendSettings {
    /// Base URL; endpoint paths are joined onto it.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Transport timeout. The gateway imposes none of its own and only
    /// reacts to calls that already failed.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Bearer token, when the deployment requires one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:5003/api".to_string()
}

fn default_timeout() -> u64 {
    15
}

impl Default for BackendSettings {
    fn default() -> Self {
        BackendSettings {
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            token: None,
        }
    }
}

// =============================================================================
// Store Settings
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    /// SQLite file. Defaults to `clinic.db` in the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Reconcile Settings
// =============================================================================

/// Refresh sequencing after a remote write.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileSettings {
    /// Wait before re-fetching, covering the backend's read-path lag.
    #[serde(default = "default_refresh_delay")]
    pub refresh_delay_ms: u64,

    /// Skip the wait when the acknowledgement already carries the new
    /// paid amount.
    #[serde(default = "default_true")]
    pub skip_delay_when_acknowledged: bool,
}

fn default_refresh_delay() -> u64 {
    750
}

fn default_true() -> bool {
    true
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        ReconcileSettings {
            refresh_delay_ms: default_refresh_delay(),
            skip_delay_when_acknowledged: true,
        }
    }
}

// =============================================================================
// Outbox Settings
// =============================================================================

/// Outbox replay worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxSettings {
    /// Run the replay worker at all.
    #[serde(default = "default_true")]
    pub replay_enabled: bool,

    /// Records sent per pass.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Interval between passes (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Failed attempts after which a record is skipped.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// First backoff after a failed pass (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Backoff ceiling (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,
}

fn default_batch_size() -> u32 {
    50
}
fn default_poll_interval() -> u64 {
    30
}
fn default_max_attempts() -> u32 {
    10
}
fn default_initial_backoff() -> u64 {
    1_000
}
fn default_max_backoff() -> u64 {
    300
}

impl Default for OutboxSettings {
    fn default() -> Self {
        OutboxSettings {
            replay_enabled: true,
            batch_size: default_batch_size(),
            poll_interval_secs: default_poll_interval(),
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
        }
    }
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete ledger configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LedgerConfig {
    #[serde(default)]
    pub backend: BackendSettings,

    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub reconcile: ReconcileSettings,

    #[serde(default)]
    pub outbox: OutboxSettings,
}

impl LedgerConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (ledger.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading ledger config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load ledger config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;

        info!(?path, "Ledger config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        let url = url::Url::parse(&self.backend.base_url)?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SyncError::InvalidUrl(format!(
                "Backend URL must start with http:// or https://, got: {}",
                self.backend.base_url
            )));
        }

        if self.backend.timeout_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "timeout_secs must be greater than 0".into(),
            ));
        }

        if self.outbox.batch_size == 0 {
            return Err(SyncError::InvalidConfig(
                "batch_size must be greater than 0".into(),
            ));
        }

        if self.outbox.max_attempts == 0 {
            return Err(SyncError::InvalidConfig(
                "max_attempts must be greater than 0".into(),
            ));
        }

        if self.outbox.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("CLINIC_BACKEND_URL") {
            debug!(url = %url, "Overriding backend URL from environment");
            self.backend.base_url = url;
        }

        if let Ok(token) = std::env::var("CLINIC_BACKEND_TOKEN") {
            self.backend.token = Some(token).filter(|t| !t.is_empty());
        }

        if let Ok(path) = std::env::var("CLINIC_DB_PATH") {
            debug!(path = %path, "Overriding database path from environment");
            self.store.database_path = Some(PathBuf::from(path));
        }

        if let Ok(delay) = std::env::var("CLINIC_REFRESH_DELAY_MS") {
            match delay.parse::<u64>() {
                Ok(ms) => self.reconcile.refresh_delay_ms = ms,
                Err(_) => warn!(value = %delay, "Ignoring invalid CLINIC_REFRESH_DELAY_MS"),
            }
        }

        if let Ok(flag) = std::env::var("CLINIC_OUTBOX_REPLAY") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.outbox.replay_enabled = true,
                "0" | "false" | "off" | "no" => self.outbox.replay_enabled = false,
                _ => warn!(value = %flag, "Unknown CLINIC_OUTBOX_REPLAY value"),
            }
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("com", "clinic", "ledger")
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("ledger.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Resolved database path: configured, or `clinic.db` in the data dir,
    /// or the working directory as a last resort.
    pub fn database_path(&self) -> PathBuf {
        self.store.database_path.clone().unwrap_or_else(|| {
            Self::project_dirs()
                .map(|dirs| dirs.data_dir().join("clinic.db"))
                .unwrap_or_else(|| PathBuf::from("clinic.db"))
        })
    }

    pub fn refresh_delay(&self) -> Duration {
        Duration::from_millis(self.reconcile.refresh_delay_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }
}
