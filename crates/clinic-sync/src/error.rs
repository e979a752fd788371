//! # Sync Error Types
//!
//! Error types for backend, gateway and orchestrator operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │ Remote (absorbed│  │  Validation             │ │
//! │  │                 │  │  by the gateway)│  │  (before any write)     │ │
//! │  │  InvalidConfig  │  │  Connection     │  │  Rejected               │ │
//! │  │  InvalidUrl     │  │  Timeout        │  │  SubmissionInFlight     │ │
//! │  │  ConfigLoad/Save│  │  RemoteRejected │  │  InvalidPayload         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                              │
//! │  │  Local store    │  │    Internal     │                              │
//! │  │  (unrecoverable)│  │                 │                              │
//! │  │  LocalStore...  │  │  Serialization  │                              │
//! │  │                 │  │  ShuttingDown   │                              │
//! │  └─────────────────┘  └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Remote errors never reach the user as failures: the gateway converts
//! them into an outbox write. Only a failed outbox write surfaces as a
//! hard error.

use thiserror::Error;

use clinic_core::{CoreError, PaymentTarget, ValidationError};

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all backend, gateway and outbox failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Invalid backend URL.
    #[error("Invalid backend URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The backend could not be reached.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The transport gave up waiting for the backend.
    #[error("Backend request timed out: {0}")]
    Timeout(String),

    /// The backend answered with a non-success HTTP status.
    #[error("Backend rejected request ({status}): {message}")]
    RemoteRejected { status: u16, message: String },

    /// The backend answered 2xx with `success: false`.
    #[error("Backend reported failure: {0}")]
    RemoteFailure(String),

    /// The backend answered with a body we could not read.
    #[error("Unreadable backend response: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// The payment was rejected by the ledger rules.
    #[error("{0}")]
    Rejected(#[from] CoreError),

    /// A payment for the same target is still being submitted.
    #[error("A payment for {0} is already being submitted")]
    SubmissionInFlight(PaymentTarget),

    /// The target is not part of the loaded patient ledger.
    #[error("Unknown payment target {0}")]
    UnknownTarget(PaymentTarget),

    /// Backend data failed validation.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    // =========================================================================
    // Local Store Errors
    // =========================================================================
    /// The local outbox could not be written or read.
    #[error("Local store failed: {0}")]
    LocalStoreFailed(#[from] clinic_db::DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Failed to serialize a request body.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// A background task is shutting down.
    #[error("Outbox replayer is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Rejected(CoreError::Validation(err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if let Some(status) = err.status() {
            SyncError::RemoteRejected {
                status: status.as_u16(),
                message: err.to_string(),
            }
        } else {
            SyncError::ConnectionFailed(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if the operation can be retried later.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::ConnectionFailed(_) | SyncError::Timeout(_) => true,
            SyncError::RemoteRejected { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }

    /// Returns true for any failure to complete a backend call. The write
    /// gateway falls back to the outbox on every one of these.
    pub fn is_remote_failure(&self) -> bool {
        matches!(
            self,
            SyncError::ConnectionFailed(_)
                | SyncError::Timeout(_)
                | SyncError::RemoteRejected { .. }
                | SyncError::RemoteFailure(_)
                | SyncError::DeserializationFailed(_)
        )
    }

    /// Returns true if the input was rejected before any write.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SyncError::Rejected(_)
                | SyncError::SubmissionInFlight(_)
                | SyncError::UnknownTarget(_)
        )
    }

    /// Returns true if the payment could not be stored anywhere.
    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, SyncError::LocalStoreFailed(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
