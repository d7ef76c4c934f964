/*!
 * @file error.rs
 * @brief Persistor error handling
 */

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistorError {
    /// Request could not be dispatched at all: missing or unknown action.
    /// Raised before any facade call; never turned into a failure reply.
    #[error("{0}")]
    Protocol(String),

    /// A payload field was missing, mistyped, or carried an invalid value.
    #[error("{0}")]
    Argument(String),

    /// The backing store rejected or failed the operation. The message text
    /// is forwarded verbatim into the failure reply.
    #[error("{0}")]
    Store(String),

    #[error("Envelope error: {0}")]
    Envelope(String),

    #[error("BSON error: {0}")]
    Bson(#[from] bson::de::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Network error: {0}")]
    Network(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<mongodb::error::Error> for PersistorError {
    fn from(err: mongodb::error::Error) -> Self {
        PersistorError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PersistorError>;
