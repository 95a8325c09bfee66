//! Error types for message routing and payload handling

/// Reasons an inbound message or host action is dropped
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Invalid topic: {0}")]
    InvalidTopic(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    #[error("Unknown instance: {0}")]
    UnknownInstance(String),

    #[error("Not a button: {0}")]
    UnknownButton(String),
}

/// Result type for bridge operations
pub type Result<T> = std::result::Result<T, BridgeError>;
