//! Encoding catalog for media sources.
//!
//! Normalizes an external extractor's view of a media item into a uniform
//! encoding model, partitions it for presentation, and opens byte streams
//! for chosen encodings. The transfer path consumes this crate through the
//! [`CatalogProvider`] trait and never touches the source platform directly.

pub mod encoding;
pub mod error;
pub mod partition;
pub mod provider;
pub mod ytdlp;

pub use encoding::{Encoding, MediaCatalog};
pub use error::CatalogError;
pub use partition::{audio_renditions, dedupe_encodings, video_renditions};
pub use provider::{CatalogProvider, EncodingStream};
pub use ytdlp::YtDlpProvider;
