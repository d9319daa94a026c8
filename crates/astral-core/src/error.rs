//! Error types for Astral Core

use thiserror::Error;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("Unknown device: {0}")]
    UnknownDevice(String),

    #[error("Unknown property: {0}")]
    UnknownProperty(String),

    #[error("Unknown item: {0}")]
    UnknownItem(String),

    #[error("Device already exists: {0}")]
    DuplicateDevice(String),

    #[error("Property already exists: {0}")]
    DuplicateProperty(String),

    #[error("Item already exists: {0}")]
    DuplicateItem(String),

    #[error("Kind mismatch: expected {expected}, got {got}")]
    KindMismatch { expected: String, got: String },

    #[error("Invalid {field} token: {token}")]
    InvalidToken { field: &'static str, token: String },
}

/// Result type alias for Astral Core operations
pub type Result<T> = std::result::Result<T, Error>;
