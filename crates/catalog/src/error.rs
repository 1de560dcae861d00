//! Catalog error types.

use thiserror::Error;

/// Errors surfaced by catalog providers.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The media id does not resolve to any item on the source platform.
    #[error("media '{0}' not found")]
    NotFound(String),

    /// The source platform or the extractor failed. The original message is
    /// preserved; no retry happens at this layer.
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The extractor produced output this crate cannot decode.
    #[error("invalid extractor payload: {0}")]
    Payload(String),
}

impl CatalogError {
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }
}
