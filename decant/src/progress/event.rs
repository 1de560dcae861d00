//! Progress event model.
//!
//! Events describe one transfer's lifecycle: `processing` while legs are
//! being set up or a transform runs, `downloading` for byte-counted
//! passthrough, then exactly one terminal `finished` or `error`. Subscribers
//! receive them verbatim as SSE payloads, so field names here are the wire
//! contract.

use serde::{Deserialize, Serialize};

/// Lifecycle state carried by every event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    Processing,
    Downloading,
    Finished,
    Error,
}

/// The leg of the transfer an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferPhase {
    Downloading,
    Muxing,
    Converting,
}

/// One progress event as published to subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub status: ProgressStatus,
    /// Percent complete, 0 to 100.
    pub progress: u8,
    /// Bytes delivered so far (byte-counted transfers only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub downloaded: Option<u64>,
    /// Declared payload size in bytes (byte-counted transfers only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Observed throughput in bytes per second.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speed: Option<f64>,
    /// Media seconds processed so far (time-counted transfers only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_time: Option<f64>,
    /// Declared media duration in seconds (time-counted transfers only).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_time: Option<f64>,
    /// The phase this event belongs to.
    #[serde(rename = "event", skip_serializing_if = "Option::is_none")]
    pub phase: Option<TransferPhase>,
    /// Failure reason, present only on `error` events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ProgressEvent {
    fn base(status: ProgressStatus, progress: u8) -> Self {
        Self {
            status,
            progress,
            downloaded: None,
            total: None,
            speed: None,
            current_time: None,
            total_time: None,
            phase: None,
            error: None,
        }
    }

    /// A transfer leg has been set up and is about to produce data.
    pub fn starting(phase: TransferPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::base(ProgressStatus::Processing, 0)
        }
    }

    /// Byte-counted progress for a passthrough transfer.
    pub fn downloading(progress: u8, downloaded: u64, total: u64, speed: f64) -> Self {
        Self {
            downloaded: Some(downloaded),
            total: Some(total),
            speed: Some(speed),
            phase: Some(TransferPhase::Downloading),
            ..Self::base(ProgressStatus::Downloading, progress)
        }
    }

    /// Time-counted progress derived from transform diagnostics.
    pub fn transforming(
        phase: TransferPhase,
        progress: u8,
        current_time: f64,
        total_time: Option<f64>,
    ) -> Self {
        Self {
            current_time: Some(current_time),
            total_time,
            phase: Some(phase),
            ..Self::base(ProgressStatus::Processing, progress)
        }
    }

    /// The transform drained its inputs and exited cleanly; progress is
    /// pinned to 100 just before the terminal event.
    pub fn phase_complete(phase: TransferPhase, total_time: Option<f64>) -> Self {
        Self {
            current_time: total_time,
            total_time,
            phase: Some(phase),
            ..Self::base(ProgressStatus::Processing, 100)
        }
    }

    /// Terminal success event.
    pub fn finished(phase: TransferPhase) -> Self {
        Self {
            phase: Some(phase),
            ..Self::base(ProgressStatus::Finished, 100)
        }
    }

    /// Terminal failure event.
    pub fn failed(phase: Option<TransferPhase>, reason: impl Into<String>) -> Self {
        Self {
            phase,
            error: Some(reason.into()),
            ..Self::base(ProgressStatus::Error, 0)
        }
    }

    /// Whether this event ends the transfer's channel.
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, ProgressStatus::Finished | ProgressStatus::Error)
    }
}
