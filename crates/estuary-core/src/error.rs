//! Error types for the estuary gateway
//!
//! This module provides the error type shared by all estuary crates,
//! together with the coarse classification callers use to pick a
//! recovery strategy.

use thiserror::Error;

/// Main error type for estuary operations
#[derive(Error, Debug)]
pub enum EstuaryError {
    // ===== Invalid Argument Errors =====
    /// Topic is empty or malformed
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    /// Quality-of-service value outside 0..=2
    #[error("Invalid quality of service: {value}")]
    InvalidQos { value: u8 },

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Frame rejected before transmission (for example, empty)
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    // ===== Readiness Errors =====
    /// Operation attempted before initialization or after deinitialization
    #[error("{component} is not initialized")]
    NotInitialized { component: &'static str },

    /// State lock was not acquired within its bounded wait
    #[error("{operation} is busy")]
    Busy { operation: &'static str },

    /// Channel to a manager task failed (task stopped or queue full)
    #[error("Channel error: {0}")]
    Channel(String),

    // ===== Connectivity Errors =====
    /// The wireless link is not associated
    #[error("Link is not connected")]
    LinkDown,

    /// The broker session is not established
    #[error("Session is not connected")]
    NotConnected,

    // ===== Resource Errors =====
    /// Allocation failure during initialization
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Serial port could not be opened
    #[error("Failed to open port {port}: {reason}")]
    PortOpen { port: String, reason: String },

    // ===== Transport Errors =====
    /// Write accepted fewer bytes than requested
    #[error("Short write: {accepted} of {requested} bytes accepted")]
    ShortWrite { requested: usize, accepted: usize },

    /// Write failed outright
    #[error("Write failed: {0}")]
    WriteFailed(String),

    /// Read failed
    #[error("Read failed: {0}")]
    ReadFailed(String),
}

/// Coarse error classification
///
/// Every [`EstuaryError`] variant maps to exactly one kind. Callers gate
/// their recovery on the kind rather than on individual variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed input, never retried
    InvalidArgument,
    /// Component not initialized or briefly busy, caller may retry
    NotReady,
    /// Gating state is not ready, caller waits for a status notification
    NotConnected,
    /// Initialization-time allocation failure, fatal to that call
    ResourceExhausted,
    /// Underlying read/write errored or came up short
    TransportFailure,
}

impl EstuaryError {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            EstuaryError::InvalidTopic(_)
            | EstuaryError::InvalidQos { .. }
            | EstuaryError::InvalidConfig(_)
            | EstuaryError::InvalidFrame(_) => ErrorKind::InvalidArgument,
            EstuaryError::NotInitialized { .. }
            | EstuaryError::Busy { .. }
            | EstuaryError::Channel(_) => ErrorKind::NotReady,
            EstuaryError::LinkDown | EstuaryError::NotConnected => ErrorKind::NotConnected,
            EstuaryError::ResourceExhausted(_) | EstuaryError::PortOpen { .. } => {
                ErrorKind::ResourceExhausted
            }
            EstuaryError::ShortWrite { .. }
            | EstuaryError::WriteFailed(_)
            | EstuaryError::ReadFailed(_) => ErrorKind::TransportFailure,
        }
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            EstuaryError::Busy { .. } | EstuaryError::LinkDown | EstuaryError::NotConnected
        )
    }

    /// Get an error code for this error
    pub fn error_code(&self) -> &'static str {
        match self {
            EstuaryError::InvalidTopic(_) => "INVALID_TOPIC",
            EstuaryError::InvalidQos { .. } => "INVALID_QOS",
            EstuaryError::InvalidConfig(_) => "INVALID_CONFIG",
            EstuaryError::InvalidFrame(_) => "INVALID_FRAME",
            EstuaryError::NotInitialized { .. } => "NOT_INITIALIZED",
            EstuaryError::Busy { .. } => "BUSY",
            EstuaryError::Channel(_) => "CHANNEL_ERROR",
            EstuaryError::LinkDown => "LINK_DOWN",
            EstuaryError::NotConnected => "NOT_CONNECTED",
            EstuaryError::ResourceExhausted(_) => "RESOURCE_EXHAUSTED",
            EstuaryError::PortOpen { .. } => "PORT_OPEN_FAILED",
            EstuaryError::ShortWrite { .. } => "SHORT_WRITE",
            EstuaryError::WriteFailed(_) => "WRITE_FAILED",
            EstuaryError::ReadFailed(_) => "READ_FAILED",
        }
    }
}

/// Result type alias for estuary operations
pub type Result<T> = std::result::Result<T, EstuaryError>;

impl From<serde_json::Error> for EstuaryError {
    fn from(err: serde_json::Error) -> Self {
        EstuaryError::InvalidConfig(err.to_string())
    }
}
