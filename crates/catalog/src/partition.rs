//! Encoding list normalization: dedup and presentation partitions.

use std::collections::{HashMap, HashSet};

use crate::encoding::Encoding;

/// Container offered for selectable video renditions.
pub const DELIVERABLE_VIDEO_CONTAINER: &str = "mp4";

/// Remove descriptors sharing an id, keeping the first occurrence.
///
/// Extractors may emit the same format id more than once. Order is preserved
/// so callers keep the extractor's ranking; running this twice yields the
/// same list.
pub fn dedupe_encodings(encodings: Vec<Encoding>) -> Vec<Encoding> {
    let mut seen = HashSet::new();
    encodings
        .into_iter()
        .filter(|e| seen.insert(e.id.clone()))
        .collect()
}

/// Video renditions with a quality label in the deliverable container, one
/// per label (highest total bitrate wins), sorted by descending numeric
/// quality.
pub fn video_renditions(encodings: &[Encoding]) -> Vec<Encoding> {
    let mut per_label: HashMap<&str, &Encoding> = HashMap::new();
    for enc in encodings {
        if !enc.has_video || enc.container != DELIVERABLE_VIDEO_CONTAINER {
            continue;
        }
        let Some(label) = enc.quality_label.as_deref() else {
            continue;
        };
        match per_label.get(label) {
            Some(best) if best.bitrate.unwrap_or(0.0) >= enc.bitrate.unwrap_or(0.0) => {}
            _ => {
                per_label.insert(label, enc);
            }
        }
    }

    let mut renditions: Vec<Encoding> = per_label.into_values().cloned().collect();
    renditions.sort_by(|a, b| {
        quality_rank(b.quality_label.as_deref()).cmp(&quality_rank(a.quality_label.as_deref()))
    });
    renditions
}

/// Audio-only renditions sorted by descending bitrate.
pub fn audio_renditions(encodings: &[Encoding]) -> Vec<Encoding> {
    let mut audio: Vec<Encoding> = encodings
        .iter()
        .filter(|e| e.is_audio_only())
        .cloned()
        .collect();
    audio.sort_by(|a, b| {
        audio_rate(b)
            .partial_cmp(&audio_rate(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    audio
}

/// Leading digits of a quality label ("1080p60" ranks as 1080).
fn quality_rank(label: Option<&str>) -> u32 {
    let digits: String = label
        .unwrap_or_default()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().unwrap_or(0)
}

fn audio_rate(enc: &Encoding) -> f64 {
    enc.audio_bitrate.or(enc.bitrate).unwrap_or(0.0)
}
