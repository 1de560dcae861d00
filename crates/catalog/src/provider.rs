//! Provider seam between the transfer path and the source platform.

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

use crate::encoding::{Encoding, MediaCatalog};
use crate::error::CatalogError;

/// An open byte source for one encoding.
pub struct EncodingStream {
    /// Chunked payload bytes in stream order.
    pub bytes: BoxStream<'static, Result<Bytes, CatalogError>>,
    /// Best-known payload size: the response's declared length when present,
    /// else the descriptor's declared length.
    pub content_length: Option<u64>,
}

impl std::fmt::Debug for EncodingStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncodingStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Catalog access as the transfer path consumes it.
///
/// `fetch_media` resolves a media id into metadata plus deduplicated
/// encodings; `open_stream` turns one descriptor into a readable byte
/// stream. Implementations own the network/process work; callers never touch
/// the source platform directly.
#[async_trait]
pub trait CatalogProvider: Send + Sync {
    /// Resolve a media id into metadata and its deduplicated encodings.
    ///
    /// # Errors
    /// `CatalogError::NotFound` for unknown ids, `CatalogError::Upstream`
    /// when the source platform or extractor fails.
    async fn fetch_media(&self, media_id: &str) -> Result<MediaCatalog, CatalogError>;

    /// Open the byte stream behind one encoding descriptor.
    async fn open_stream(&self, encoding: &Encoding) -> Result<EncodingStream, CatalogError>;
}
