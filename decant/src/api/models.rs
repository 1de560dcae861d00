//! API request and response models (DTOs).
//!
//! Field names on the wire are camelCase to match what media clients
//! already expect; encoding locators and request headers stay server-side
//! and never appear in responses.

use serde::{Deserialize, Serialize};

use catalog::{Encoding, MediaCatalog};

use crate::api::error::ApiError;
use crate::transfer::{DownloadRequest, TransferKind};

/// Maximum accepted media id length.
const MEDIA_ID_MAX_LEN: usize = 64;

/// Validate a client-supplied media id before it reaches the extractor.
///
/// Ids are opaque, but they double as progress channel keys and end up in
/// extractor command lines, so they are restricted to `[A-Za-z0-9_-]`.
pub fn validate_media_id(id: &str) -> Result<(), ApiError> {
    if id.is_empty() || id.len() > MEDIA_ID_MAX_LEN {
        return Err(ApiError::bad_request(format!(
            "mediaId must be 1 to {MEDIA_ID_MAX_LEN} characters"
        )));
    }
    if !id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ApiError::bad_request(
            "mediaId may only contain letters, digits, '-' and '_'",
        ));
    }
    Ok(())
}

// ============================================================================
// Health
// ============================================================================

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
}

// ============================================================================
// Metadata
// ============================================================================

/// One selectable encoding as presented to clients.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingDto {
    pub id: String,
    pub container: String,
    pub has_audio: bool,
    pub has_video: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_bitrate: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_length: Option<u64>,
}

impl From<&Encoding> for EncodingDto {
    fn from(encoding: &Encoding) -> Self {
        Self {
            id: encoding.id.clone(),
            container: encoding.container.clone(),
            has_audio: encoding.has_audio,
            has_video: encoding.has_video,
            quality_label: encoding.quality_label.clone(),
            bitrate: encoding.bitrate,
            audio_bitrate: encoding.audio_bitrate,
            content_length: encoding.content_length,
        }
    }
}

/// Metadata for one media item, with encodings partitioned for the picker.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataResponse {
    pub media_id: String,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    /// Video renditions, one per quality label, best first.
    pub video_encodings: Vec<EncodingDto>,
    /// Audio-only renditions, best first.
    pub audio_encodings: Vec<EncodingDto>,
}

impl From<&MediaCatalog> for MetadataResponse {
    fn from(media: &MediaCatalog) -> Self {
        Self {
            media_id: media.media_id.clone(),
            title: media.title.clone(),
            channel: media.channel.clone(),
            description: media.description.clone(),
            thumbnail_url: media.thumbnail_url.clone(),
            view_count: media.view_count,
            duration_secs: media.duration_secs,
            video_encodings: media.video_renditions().iter().map(Into::into).collect(),
            audio_encodings: media.audio_renditions().iter().map(Into::into).collect(),
        }
    }
}

// ============================================================================
// Download
// ============================================================================

/// Download request body.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequestBody {
    pub media_id: String,
    pub encoding_id: String,
    /// Companion audio encoding, required only for muxing video-only
    /// renditions.
    #[serde(default)]
    pub audio_encoding_id: Option<String>,
    pub kind: TransferKind,
    /// Progress channel key the client will subscribe with; defaults to the
    /// media id.
    #[serde(default)]
    pub ticket: Option<String>,
}

impl From<DownloadRequestBody> for DownloadRequest {
    fn from(body: DownloadRequestBody) -> Self {
        Self {
            media_id: body.media_id,
            encoding_id: body.encoding_id,
            audio_encoding_id: body.audio_encoding_id,
            kind: body.kind,
            ticket: body.ticket,
        }
    }
}
