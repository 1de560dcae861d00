//! Encoding descriptors and media summaries.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// One deliverable variant of a media item.
///
/// Immutable once returned by a provider; the transfer path treats it as the
/// complete description of how to fetch and label the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Encoding {
    /// Extractor format id, stable within a session.
    pub id: String,
    /// Container format as a file extension ("mp4", "webm", "m4a").
    pub container: String,
    pub has_audio: bool,
    pub has_video: bool,
    /// Rendition label such as "1080p" or "720p60". Video encodings only.
    pub quality_label: Option<String>,
    /// Declared total bitrate in kbit/s.
    pub bitrate: Option<f64>,
    /// Declared audio bitrate in kbit/s.
    pub audio_bitrate: Option<f64>,
    /// Declared payload size in bytes, when the source reports one.
    pub content_length: Option<u64>,
    /// Approximate media duration in seconds, used for time-based progress.
    pub duration_secs: Option<f64>,
    /// Resolved fetch locator.
    pub url: String,
    /// Minimal request headers the source platform requires.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub http_headers: HashMap<String, String>,
}

impl Encoding {
    /// Whether the encoding carries both elementary streams.
    pub fn is_progressive(&self) -> bool {
        self.has_audio && self.has_video
    }

    pub fn is_audio_only(&self) -> bool {
        self.has_audio && !self.has_video
    }

    pub fn is_video_only(&self) -> bool {
        self.has_video && !self.has_audio
    }
}

/// Metadata and deduplicated encodings for one media item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaCatalog {
    pub media_id: String,
    pub title: String,
    pub channel: Option<String>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
    pub view_count: Option<u64>,
    /// Total duration in seconds as reported by the extractor.
    pub duration_secs: Option<f64>,
    pub encodings: Vec<Encoding>,
}

impl MediaCatalog {
    /// Look up an encoding by id.
    pub fn encoding(&self, id: &str) -> Option<&Encoding> {
        self.encodings.iter().find(|e| e.id == id)
    }

    /// Video renditions for presentation, one per quality label, best first.
    pub fn video_renditions(&self) -> Vec<Encoding> {
        crate::partition::video_renditions(&self.encodings)
    }

    /// Audio-only renditions for presentation, best first.
    pub fn audio_renditions(&self) -> Vec<Encoding> {
        crate::partition::audio_renditions(&self.encodings)
    }
}
