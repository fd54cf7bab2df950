//! Error types for the ingestion pipeline.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Websocket error.
    #[error("websocket error: {0}")]
    WebSocket(#[from] async_tungstenite::tungstenite::Error),

    /// JSON parsing error.
    #[error("JSON error: {0}")]
    Json(String),

    /// Required feed field absent or malformed.
    #[error("invalid field {field}: {reason}")]
    Field {
        field: &'static str,
        reason: String,
    },

    /// Timestamp normalization error.
    #[error(transparent)]
    Core(#[from] quake_core::Error),

    /// Channel send error.
    #[error("channel send error: {0}")]
    ChannelSend(String),

    /// The feed's retry budget ran out.
    #[error("feed unreachable after {attempts} consecutive connection failures")]
    RetryBudgetExhausted { attempts: u32 },

    /// The receiver task ended abnormally.
    #[error("receiver task failed: {0}")]
    Receiver(String),
}
