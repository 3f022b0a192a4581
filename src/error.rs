//! Error types for the streaming client.
//!
//! Decode failures inside a block never surface here: the codec reports them
//! as `None` and the block is treated as absent. [`StreamError`] covers what a
//! caller can act on.
//!
//! ## Error Categories
//!
//! - **Connection Errors**: the server could not be reached, or the link dropped
//! - **Request Errors**: an object kind the server does not offer, or a feedback
//!   toggle that changes nothing
//! - **Configuration Errors**: invalid axis mappings, buffer sizes, config files
//! - **Timeouts**: no frame arrived before a wait deadline
//!
//! ## Recovery and Retry
//!
//! ```rust
//! use mocap_stream::StreamError;
//!
//! let error = StreamError::connection_failed("127.0.0.1:801", "connection refused");
//! if error.is_retryable() {
//!     for suggestion in error.recovery_suggestions() {
//!         println!("  - {}", suggestion);
//!     }
//! }
//! ```

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::axis::AxisMappingError;
use crate::objects::ObjectKind;

/// Result type alias for client operations.
pub type Result<T, E = StreamError> = std::result::Result<T, E>;

/// Main error type for client operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StreamError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connection {
        endpoint: String,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Socket I/O failed during {operation}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("All connections closed while waiting for a frame")]
    Disconnected,

    #[error("{operation} requires a live server connection")]
    NotConnected { operation: String },

    #[error("Object kind {kind:?} is not supported: {reason}")]
    UnsupportedObjectKind { kind: ObjectKind, reason: String },

    #[error("Feedback for device {device_id} is already {}", if *.enabled { "on" } else { "off" })]
    FeedbackUnchanged { device_id: u32, enabled: bool },

    #[error("Invalid axis mapping")]
    AxisMapping(#[from] AxisMappingError),

    #[error("Block rejected: tag {tag:#x}, length {length}")]
    BlockRejected { tag: u32, length: u32 },

    #[error("Invalid configuration: {reason}")]
    Config {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Config file error: {path}")]
    ConfigFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Async runtime could not be started")]
    Runtime {
        #[source]
        source: std::io::Error,
    },
}

impl StreamError {
    /// Returns whether this error is potentially recoverable through retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            StreamError::Connection { .. } => true,
            StreamError::Io { .. } => true,
            StreamError::Timeout { .. } => true,
            StreamError::Disconnected => true,
            StreamError::NotConnected { .. } => true,
            StreamError::BlockRejected { .. } => true,
            StreamError::UnsupportedObjectKind { .. } => false,
            StreamError::FeedbackUnchanged { .. } => false,
            StreamError::AxisMapping(_) => false,
            StreamError::Config { .. } => false,
            StreamError::ConfigFile { .. } => false,
            StreamError::Runtime { .. } => false,
        }
    }

    /// Returns suggested recovery actions for this error.
    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            StreamError::Connection { .. } => vec![
                "Ensure the capture server is running",
                "Check the host name and port",
                "Check firewall rules between client and server",
            ],
            StreamError::Io { .. } | StreamError::Disconnected => vec![
                "Reconnect to the server",
                "Check network stability",
                "Add a redundant connection to reduce the impact of drops",
            ],
            StreamError::Timeout { .. } => vec![
                "Increase the wait timeout",
                "Check that the server is streaming",
                "Request a frame when not in server-push mode",
            ],
            StreamError::NotConnected { .. } => vec![
                "Call connect before this operation",
                "Wait for the connection to be established",
            ],
            StreamError::BlockRejected { .. } => vec![
                "Check client and server protocol versions",
                "Raise max_block_length if large video frames are expected",
            ],
            StreamError::UnsupportedObjectKind { .. } => vec![
                "Check which kinds the server advertises",
                "Enable the data type on the server",
            ],
            StreamError::FeedbackUnchanged { .. } => {
                vec!["Query the current feedback state before toggling"]
            }
            StreamError::AxisMapping(_) => vec![
                "Use three distinct axes",
                "Choose directions forming a right-handed system",
            ],
            StreamError::Config { .. } | StreamError::ConfigFile { .. } => vec![
                "Check the configuration file syntax",
                "Compare values with the documented defaults",
            ],
            StreamError::Runtime { .. } => vec![
                "Check thread and file descriptor limits",
                "Restart the application",
            ],
        }
    }

    /// Helper constructor for connection errors.
    pub fn connection_failed(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        StreamError::Connection { endpoint: endpoint.into(), reason: reason.into(), source: None }
    }

    /// Helper constructor for connection errors with source.
    pub fn connection_failed_with_source(
        endpoint: impl Into<String>,
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        StreamError::Connection {
            endpoint: endpoint.into(),
            reason: reason.into(),
            source: Some(source),
        }
    }

    /// Helper constructor for socket errors.
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        StreamError::Io { operation: operation.into(), source }
    }

    /// Helper constructor for operations that need a connection.
    pub fn not_connected(operation: impl Into<String>) -> Self {
        StreamError::NotConnected { operation: operation.into() }
    }

    /// Helper constructor for unsupported object kinds.
    pub fn unsupported_kind(kind: ObjectKind, reason: impl Into<String>) -> Self {
        StreamError::UnsupportedObjectKind { kind, reason: reason.into() }
    }

    /// Helper constructor for configuration errors.
    pub fn config(reason: impl Into<String>) -> Self {
        StreamError::Config { reason: reason.into(), source: None }
    }

    /// Whether the error means the peer closed or reset the stream.
    pub fn is_disconnect(&self) -> bool {
        match self {
            StreamError::Disconnected => true,
            StreamError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::UnexpectedEof
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
                    | std::io::ErrorKind::BrokenPipe
            ),
            _ => false,
        }
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::Io { operation: "<unknown>".to_string(), source: err }
    }
}
