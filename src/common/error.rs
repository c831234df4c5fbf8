//! Error types for the application.

use thiserror::Error;

/// Top-level application error.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Adapter error: {0}")]
    Adapter(#[from] AdapterError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Bridge graph error: {0}")]
    Graph(#[from] GraphError),

    #[error("No adapter could be started")]
    NoAdapters,
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {message}")]
    IoError { path: String, message: String },

    #[error("Failed to parse config: {message}")]
    ParseError { message: String },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

/// Errors reported by a platform adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Adapter '{adapter}' failed to initialize: {message}")]
    InitFailed { adapter: String, message: String },

    #[error("Unknown adapter type '{kind}'")]
    UnknownKind { kind: String },

    #[error("Missing setting '{setting}' for bot '{bot}'")]
    MissingSetting { bot: String, setting: String },

    #[error("Invalid channel id '{channel}'")]
    InvalidChannel { channel: String },

    #[error("Invalid message id '{message_id}'")]
    InvalidMessageId { message_id: String },

    #[error("Failed to send message: {message}")]
    SendFailed { message: String },

    /// The message has no text body; its visible text is a caption.
    #[error("Message '{message_id}' cannot be edited as text")]
    NotEditableAsText { message_id: String },

    #[error("Adapter '{adapter}' is not initialized")]
    NotInitialized { adapter: String },

    #[error("Serenity error: {0}")]
    Serenity(#[from] serenity::Error),
}

/// Correlation ledger errors.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

/// Errors raised while building the bridge graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("Channel {adapter}/{channel} cannot bridge to itself")]
    SelfBridge { adapter: String, channel: String },

    #[error("Destination of a bridge from {adapter}/{channel} cannot be a wildcard")]
    WildcardDestination { adapter: String, channel: String },
}

/// Result type alias for adapter operations.
pub type AdapterResult<T> = std::result::Result<T, AdapterError>;

/// Result type alias for ledger operations.
pub type LedgerResult<T> = std::result::Result<T, LedgerError>;
