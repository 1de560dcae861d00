//! Transform diagnostic output parsing.
//!
//! The transform process reports progress only inside human-readable log
//! lines on stderr. This module owns the narrow `time=HH:MM:SS.ms` grammar;
//! a line that does not match simply yields no data and is never treated as
//! a failure.

/// Parse a clock string in HH:MM:SS.ms format to seconds.
///
/// # Examples
/// ```ignore
/// assert_eq!(parse_clock("00:00:10.50"), Some(10.5));
/// assert_eq!(parse_clock("01:30:00.00"), Some(5400.0));
/// assert_eq!(parse_clock("N/A"), None);
/// ```
pub fn parse_clock(clock: &str) -> Option<f64> {
    let parts: Vec<&str> = clock.split(':').collect();
    if parts.len() != 3 {
        return None;
    }

    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;

    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Extract the `time=` marker from a diagnostic line, in seconds.
pub fn parse_time_marker(line: &str) -> Option<f64> {
    let start = line.find("time=")? + "time=".len();
    let rest = &line[start..];
    let end = rest.find(' ').unwrap_or(rest.len());
    parse_clock(&rest[..end])
}

/// Derives percent progress for time-counted transfers.
///
/// Percents are floored against the declared media duration and emitted only
/// while strictly increasing from zero and strictly below 100; the 100 mark
/// is reserved for the completion event after the transform exits. Without a
/// declared duration nothing is ever derived, so subscribers see only the
/// start and terminal events.
#[derive(Debug)]
pub struct DiagnosticProgress {
    duration_secs: Option<f64>,
    last_percent: u8,
}

impl DiagnosticProgress {
    pub fn new(duration_secs: Option<f64>) -> Self {
        Self {
            duration_secs: duration_secs.filter(|d| d.is_finite() && *d > 0.0),
            last_percent: 0,
        }
    }

    /// Observe one diagnostic line.
    ///
    /// Returns `(percent, elapsed_secs)` when the line moved progress
    /// forward, `None` otherwise.
    pub fn observe(&mut self, line: &str) -> Option<(u8, f64)> {
        let duration = self.duration_secs?;
        let elapsed = parse_time_marker(line)?;
        if !elapsed.is_finite() || elapsed < 0.0 {
            return None;
        }

        let percent = (elapsed / duration * 100.0).floor().clamp(0.0, 100.0) as u8;
        if percent >= 100 || percent <= self.last_percent {
            return None;
        }
        self.last_percent = percent;
        Some((percent, elapsed))
    }

    pub fn duration_secs(&self) -> Option<f64> {
        self.duration_secs
    }
}
