//! Error types shared across quake crates.

use thiserror::Error;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the shared data model.
#[derive(Error, Debug)]
pub enum Error {
    /// A feed timestamp that does not match the documented layout.
    #[error("invalid feed timestamp {value:?}: {source}")]
    Timestamp {
        value: String,
        #[source]
        source: chrono::ParseError,
    },
}
