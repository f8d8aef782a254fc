//! Error types for the sensor node
//!
//! Every failure the node can hit is mapped onto [`NodeError`]. Inside the
//! provisioning and reporting loops errors are logged and degrade to "stay in
//! the current state"; only startup errors end the process.

use thiserror::Error;

/// Result type alias for node operations
pub type Result<T> = std::result::Result<T, NodeError>;

/// Error taxonomy for discovery, provisioning and reporting
#[derive(Error, Debug)]
pub enum NodeError {
    /// Connection errors (refused, reset, DNS)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Server answered with a non-success status
    #[error("HTTP status {status}: {message}")]
    Http { status: u16, message: String },

    /// HTTP client errors
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// JSON parsing errors
    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    /// Response parsed but lacks an expected field
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// URL construction errors
    #[error("Invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// Service discovery errors
    #[error("Discovery failed: {0}")]
    Discovery(String),

    /// Sensor read errors
    #[error("Sensor read failed: {0}")]
    Sensor(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network join failed; fatal for the process
    #[error("Network join failed: {0}")]
    NetworkJoin(String),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Timeout errors
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Generic I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl NodeError {
    /// Create a connection error
    pub fn connection<S: Into<String>>(msg: S) -> Self {
        Self::Connection(msg.into())
    }

    /// Create an HTTP status error
    pub fn http<S: Into<String>>(status: u16, msg: S) -> Self {
        Self::Http {
            status,
            message: msg.into(),
        }
    }

    /// Create a malformed response error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedResponse(msg.into())
    }

    /// Create a discovery error
    pub fn discovery<S: Into<String>>(msg: S) -> Self {
        Self::Discovery(msg.into())
    }

    /// Create a sensor error
    pub fn sensor<S: Into<String>>(msg: S) -> Self {
        Self::Sensor(msg.into())
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create a network join error
    pub fn network_join<S: Into<String>>(msg: S) -> Self {
        Self::NetworkJoin(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }

    /// Check if error is transient and the step should be retried later
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            NodeError::Connection(_)
                | NodeError::Http { .. }
                | NodeError::Request(_)
                | NodeError::Json(_)
                | NodeError::MalformedResponse(_)
                | NodeError::Discovery(_)
                | NodeError::Sensor(_)
                | NodeError::Timeout(_)
                | NodeError::Io(_)
        )
    }

    /// Check if error must end the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, NodeError::NetworkJoin(_) | NodeError::Config(_))
    }
}
