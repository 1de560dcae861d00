//! Extractor-backed catalog provider.
//!
//! Shells out to `yt-dlp` for metadata resolution and opens encoding byte
//! streams over plain HTTP with the request headers the extractor resolved.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use serde::Deserialize;
use tokio::process::Command;

use crate::encoding::{Encoding, MediaCatalog};
use crate::error::CatalogError;
use crate::partition::dedupe_encodings;
use crate::provider::{CatalogProvider, EncodingStream};

/// How long one extractor invocation may take before it is abandoned.
const EXTRACTOR_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_URL_TEMPLATE: &str = "https://www.youtube.com/watch?v={id}";

/// Catalog provider backed by the `yt-dlp` extractor binary.
pub struct YtDlpProvider {
    binary: PathBuf,
    url_template: String,
    client: reqwest::Client,
}

impl YtDlpProvider {
    pub fn new(binary: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            binary: binary.into(),
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            client,
        }
    }

    /// Read the binary path from `YTDLP_PATH`, defaulting to `yt-dlp` on PATH.
    pub fn from_env(client: reqwest::Client) -> Self {
        let binary = std::env::var("YTDLP_PATH").unwrap_or_else(|_| "yt-dlp".to_string());
        Self::new(binary, client)
    }

    /// Override the media page URL template. `{id}` is replaced by the
    /// media id.
    pub fn with_url_template(mut self, template: impl Into<String>) -> Self {
        self.url_template = template.into();
        self
    }

    fn media_url(&self, media_id: &str) -> String {
        self.url_template.replace("{id}", media_id)
    }
}

#[async_trait]
impl CatalogProvider for YtDlpProvider {
    async fn fetch_media(&self, media_id: &str) -> Result<MediaCatalog, CatalogError> {
        let url = self.media_url(media_id);
        tracing::debug!(media_id, binary = %self.binary.display(), "resolving media via extractor");

        let output = tokio::time::timeout(
            EXTRACTOR_TIMEOUT,
            Command::new(&self.binary)
                .args(["-J", "--no-warnings"])
                .arg(&url)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| {
            CatalogError::upstream(format!(
                "extractor timed out after {}s",
                EXTRACTOR_TIMEOUT.as_secs()
            ))
        })?
        .map_err(|e| CatalogError::upstream(format!("failed to run extractor: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_extractor_failure(media_id, stderr.trim()));
        }

        let payload: ExtractorPayload = serde_json::from_slice(&output.stdout)
            .map_err(|e| CatalogError::Payload(format!("extractor JSON: {e}")))?;

        let catalog = payload.into_catalog(media_id);
        tracing::debug!(
            media_id,
            encodings = catalog.encodings.len(),
            "media resolved"
        );
        Ok(catalog)
    }

    async fn open_stream(&self, encoding: &Encoding) -> Result<EncodingStream, CatalogError> {
        let mut request = self.client.get(&encoding.url);
        for (name, value) in &encoding.http_headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CatalogError::upstream(format!("source fetch failed: {e}")))?;
        if !response.status().is_success() {
            return Err(CatalogError::upstream(format!(
                "source responded with status {}",
                response.status()
            )));
        }

        let content_length = response.content_length().or(encoding.content_length);
        let bytes = response
            .bytes_stream()
            .map(|chunk| {
                chunk.map_err(|e| CatalogError::upstream(format!("source stream failed: {e}")))
            })
            .boxed();

        Ok(EncodingStream {
            bytes,
            content_length,
        })
    }
}

fn classify_extractor_failure(media_id: &str, stderr: &str) -> CatalogError {
    let lowered = stderr.to_lowercase();
    if lowered.contains("unavailable")
        || lowered.contains("does not exist")
        || lowered.contains("not found")
    {
        CatalogError::NotFound(media_id.to_string())
    } else if stderr.is_empty() {
        CatalogError::upstream("extractor failed")
    } else {
        CatalogError::upstream(stderr)
    }
}

/// Subset of the extractor's `-J` payload this crate consumes.
#[derive(Debug, Deserialize)]
struct ExtractorPayload {
    id: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    description: Option<String>,
    thumbnail: Option<String>,
    view_count: Option<u64>,
    duration: Option<f64>,
    #[serde(default)]
    formats: Vec<ExtractorFormat>,
}

#[derive(Debug, Deserialize)]
struct ExtractorFormat {
    format_id: String,
    #[serde(default)]
    ext: String,
    vcodec: Option<String>,
    acodec: Option<String>,
    format_note: Option<String>,
    height: Option<u32>,
    tbr: Option<f64>,
    abr: Option<f64>,
    filesize: Option<u64>,
    filesize_approx: Option<f64>,
    url: Option<String>,
    #[serde(default)]
    http_headers: HashMap<String, String>,
}

impl ExtractorPayload {
    fn into_catalog(self, requested_id: &str) -> MediaCatalog {
        let duration = self.duration;
        let encodings = self
            .formats
            .into_iter()
            .filter_map(|f| f.into_encoding(duration))
            .collect();

        MediaCatalog {
            media_id: self.id.unwrap_or_else(|| requested_id.to_string()),
            title: self.title.unwrap_or_else(|| requested_id.to_string()),
            channel: self.channel,
            description: self.description,
            thumbnail_url: self.thumbnail,
            view_count: self.view_count,
            duration_secs: duration,
            encodings: dedupe_encodings(encodings),
        }
    }
}

impl ExtractorFormat {
    fn into_encoding(self, duration_secs: Option<f64>) -> Option<Encoding> {
        let url = self.url?;
        // Storyboard pseudo-formats carry no media payload.
        if self.ext == "mhtml" {
            return None;
        }

        let has_video = self.vcodec.as_deref().is_some_and(|c| c != "none");
        let has_audio = self.acodec.as_deref().is_some_and(|c| c != "none");
        if !has_video && !has_audio {
            return None;
        }

        let quality_label = if has_video {
            self.format_note
                .clone()
                .or_else(|| self.height.map(|h| format!("{h}p")))
        } else {
            None
        };

        Some(Encoding {
            id: self.format_id,
            container: self.ext,
            has_audio,
            has_video,
            quality_label,
            bitrate: self.tbr,
            audio_bitrate: self.abr,
            content_length: self
                .filesize
                .or_else(|| self.filesize_approx.map(|s| s as u64)),
            duration_secs,
            url,
            http_headers: self.http_headers,
        })
    }
}
