//! Transfer strategy selection.
//!
//! Strategy is decided once per request from encoding descriptor flags
//! alone. Nothing here touches the network or spawns anything, which keeps
//! the decision table directly testable.

use catalog::Encoding;
use serde::Deserialize;

use crate::progress::TransferPhase;

/// Audio containers that can be delivered without a transform pass.
pub const DELIVERABLE_AUDIO_CONTAINERS: &[&str] = &["mp3", "m4a", "mp4"];

/// What the caller asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferKind {
    Video,
    Audio,
}

/// How a request's bytes reach the response.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferPlan {
    /// Copy the chosen encoding through unchanged.
    Direct { encoding: Encoding },
    /// Combine a video-only encoding with a separate audio encoding into
    /// streamable MP4: video copied, audio re-encoded to AAC.
    MuxAv { video: Encoding, audio: Encoding },
    /// Strip any video and re-encode the audio to MP3.
    TranscodeAudio { encoding: Encoding },
    /// Nothing matched a known shape; pass the chosen encoding through as a
    /// best effort.
    Fallback { encoding: Encoding },
}

impl TransferPlan {
    /// Decide the strategy for a request.
    ///
    /// Rules, first match wins:
    /// 1. video request, encoding has both streams: direct copy
    /// 2. video request, video-only encoding, companion audio chosen: mux
    /// 3. audio request, deliverable container: direct copy
    /// 4. audio request, audio-only encoding in any other container:
    ///    transcode to MP3
    /// 5. anything else: fallback passthrough
    pub fn select(kind: TransferKind, primary: &Encoding, audio: Option<&Encoding>) -> TransferPlan {
        match kind {
            TransferKind::Video if primary.is_progressive() => TransferPlan::Direct {
                encoding: primary.clone(),
            },
            TransferKind::Video if primary.is_video_only() => match audio {
                Some(audio) => TransferPlan::MuxAv {
                    video: primary.clone(),
                    audio: audio.clone(),
                },
                None => TransferPlan::Fallback {
                    encoding: primary.clone(),
                },
            },
            TransferKind::Audio
                if primary.has_audio && is_deliverable_audio(&primary.container) =>
            {
                TransferPlan::Direct {
                    encoding: primary.clone(),
                }
            }
            TransferKind::Audio if primary.is_audio_only() => TransferPlan::TranscodeAudio {
                encoding: primary.clone(),
            },
            _ => TransferPlan::Fallback {
                encoding: primary.clone(),
            },
        }
    }

    /// Short name for log lines.
    pub fn name(&self) -> &'static str {
        match self {
            TransferPlan::Direct { .. } => "direct",
            TransferPlan::MuxAv { .. } => "mux",
            TransferPlan::TranscodeAudio { .. } => "transcode",
            TransferPlan::Fallback { .. } => "fallback",
        }
    }

    /// The phase label progress events carry for this plan.
    pub fn phase(&self) -> TransferPhase {
        match self {
            TransferPlan::Direct { .. } | TransferPlan::Fallback { .. } => {
                TransferPhase::Downloading
            }
            TransferPlan::MuxAv { .. } => TransferPhase::Muxing,
            TransferPlan::TranscodeAudio { .. } => TransferPhase::Converting,
        }
    }

    /// File extension of the delivered payload.
    pub fn file_extension(&self) -> &str {
        match self {
            TransferPlan::MuxAv { .. } => "mp4",
            TransferPlan::TranscodeAudio { .. } => "mp3",
            TransferPlan::Direct { encoding } | TransferPlan::Fallback { encoding } => {
                &encoding.container
            }
        }
    }

    /// Content type of the delivered payload.
    pub fn content_type(&self) -> &'static str {
        match self {
            TransferPlan::MuxAv { .. } => "video/mp4",
            TransferPlan::TranscodeAudio { .. } => "audio/mpeg",
            TransferPlan::Direct { encoding } | TransferPlan::Fallback { encoding } => {
                match encoding.container.as_str() {
                    "mp4" if encoding.has_video => "video/mp4",
                    "mp4" | "m4a" => "audio/mp4",
                    "mp3" => "audio/mpeg",
                    "webm" if encoding.has_video => "video/webm",
                    "webm" => "audio/webm",
                    _ => "application/octet-stream",
                }
            }
        }
    }

    /// The encoding whose descriptor labels the transfer (duration, title
    /// sizing). For a mux this is the video leg.
    pub fn primary(&self) -> &Encoding {
        match self {
            TransferPlan::Direct { encoding }
            | TransferPlan::TranscodeAudio { encoding }
            | TransferPlan::Fallback { encoding } => encoding,
            TransferPlan::MuxAv { video, .. } => video,
        }
    }
}

fn is_deliverable_audio(container: &str) -> bool {
    DELIVERABLE_AUDIO_CONTAINERS.contains(&container)
}
