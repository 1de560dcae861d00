//! Application-wide error types.

use thiserror::Error;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Application-wide error type.
///
/// `NotFound` and `Upstream` surface before any response byte is written.
/// `TransformSpawn` and `TransformRuntime` cover the external transform
/// process. `ClientDisconnect` only drives cleanup and is never reported to
/// anyone.
#[derive(Error, Debug)]
pub enum Error {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("Transform spawn failed: {0}")]
    TransformSpawn(String),

    #[error("Transform failed: {0}")]
    TransformRuntime(String),

    #[error("Client disconnected")]
    ClientDisconnect,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn transform_spawn(msg: impl Into<String>) -> Self {
        Self::TransformSpawn(msg.into())
    }

    pub fn transform_runtime(msg: impl Into<String>) -> Self {
        Self::TransformRuntime(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}

impl From<catalog::CatalogError> for Error {
    fn from(err: catalog::CatalogError) -> Self {
        match err {
            catalog::CatalogError::NotFound(id) => Self::NotFound(format!("media '{id}'")),
            catalog::CatalogError::Upstream(msg) => Self::Upstream(msg),
            catalog::CatalogError::Payload(msg) => Self::Upstream(msg),
        }
    }
}
