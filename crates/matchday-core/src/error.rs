//! Error types for matchday-core

use thiserror::Error;

/// Result type alias using matchday-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in matchday-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// No value persisted under the given key yet; callers usually treat
    /// this as "use the default" rather than as a failure
    #[error("No stored value for key: {0}")]
    NotFound(String),

    /// Persistence layer failed to durably write a value
    #[error("Failed to write value for key {key}: {source}")]
    Write {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// Upload could not reach the server
    #[error("Upload network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Server rejected an upload
    #[error("Upload rejected by server: HTTP {0}")]
    Server(u16),

    /// Payload could not be serialized
    #[error("Encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    /// Incoming cross-device package could not be decoded
    #[error("Malformed package: {0}")]
    Decode(String),

    /// A component was constructed with unusable configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
