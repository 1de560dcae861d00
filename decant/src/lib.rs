//! decant library crate.
//!
//! Resolves media ids into selectable encodings, streams a chosen encoding
//! back over HTTP (muxing or transcoding through an external transform when
//! the shape calls for it), and publishes per-transfer progress over
//! server-sent events.

pub mod api;
pub mod error;
pub mod progress;
pub mod transfer;
pub mod utils;

pub use error::{Error, Result};
