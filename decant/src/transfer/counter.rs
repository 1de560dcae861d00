//! Byte-counted transfer progress.

use std::time::Instant;

/// One byte-counted progress emission.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressUpdate {
    /// Percent of the declared total delivered, floored, 0 to 100.
    pub progress: u8,
    pub downloaded: u64,
    pub total: u64,
    /// Bytes per second since the first observed chunk.
    pub speed: f64,
}

/// Accumulates delivered bytes against a declared total.
///
/// Every observed chunk yields an update once the total is known; with no
/// usable total, chunks still accumulate but nothing is emitted. Throughput
/// is measured from the first observed chunk, so the first update reports the
/// chunk's own instantaneous rate.
#[derive(Debug)]
pub struct ByteProgress {
    total: Option<u64>,
    downloaded: u64,
    started_at: Option<Instant>,
}

impl ByteProgress {
    pub fn new(total: Option<u64>) -> Self {
        Self {
            total: total.filter(|t| *t > 0),
            downloaded: 0,
            started_at: None,
        }
    }

    /// Record one delivered chunk.
    pub fn observe(&mut self, chunk_len: usize) -> Option<ProgressUpdate> {
        let now = Instant::now();
        let started = *self.started_at.get_or_insert(now);
        self.downloaded += chunk_len as u64;

        let total = self.total?;
        let progress = (self.downloaded as f64 / total as f64 * 100.0)
            .floor()
            .clamp(0.0, 100.0) as u8;
        let elapsed = now.duration_since(started).as_secs_f64().max(1e-3);

        Some(ProgressUpdate {
            progress,
            downloaded: self.downloaded,
            total,
            speed: self.downloaded as f64 / elapsed,
        })
    }

    pub fn downloaded(&self) -> u64 {
        self.downloaded
    }
}
