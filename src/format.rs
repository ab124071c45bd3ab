//! Human-readable sizes, speeds, durations and progress lines.

use std::time::Duration;

use crate::engine::EngineProgress;

const UNITS: [&str; 4] = ["KB", "MB", "GB", "TB"];

/// Formats a byte count with binary units, two decimals above 1 KB.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        return format!("{bytes} B");
    }
    let mut value = bytes as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit + 1 < UNITS.len() {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.2} {}", UNITS[unit])
}

/// Formats a transfer rate given in bytes per second.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
#[must_use]
pub fn format_speed(bytes_per_sec: f64) -> String {
    let bytes = if bytes_per_sec.is_finite() && bytes_per_sec > 0.0 {
        bytes_per_sec as u64
    } else {
        0
    };
    format!("{}/s", format_bytes(bytes))
}

/// Formats an elapsed time: "4.2s" under a minute, then "3m 07s" or "1h 01m 05s".
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    let (hours, mins, rest) = (secs / 3600, (secs / 60) % 60, secs % 60);
    match (hours, mins) {
        (0, 0) => format!("{rest}.{}s", d.subsec_millis() / 100),
        (0, _) => format!("{mins}m {rest:02}s"),
        _ => format!("{hours}h {mins:02}m {rest:02}s"),
    }
}

/// Formats a remaining time in clock style ("0:42", "12:05", "1:02:03").
#[must_use]
pub fn format_eta(secs: u64) -> String {
    if secs >= 3600 {
        format!("{}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else {
        format!("{}:{:02}", secs / 60, secs % 60)
    }
}

/// Builds the one-line description shown for an engine progress notification.
///
/// Missing fields are left out rather than shown as placeholders.
#[must_use]
pub fn describe_progress(name: &str, progress: &EngineProgress) -> String {
    let mut line = match progress.percent {
        Some(p) => format!("Downloading {name}: {p:.1}%"),
        None => format!("Downloading {name}"),
    };
    match (progress.downloaded_bytes, progress.total_bytes) {
        (Some(done), Some(total)) => {
            line.push_str(&format!(" ({} of {})", format_bytes(done), format_bytes(total)));
        }
        (Some(done), None) => line.push_str(&format!(" ({})", format_bytes(done))),
        _ => {}
    }
    if let Some(speed) = progress.speed_bytes_per_sec {
        line.push_str(&format!(" at {}", format_speed(speed)));
    }
    if let Some(eta) = progress.eta_seconds {
        line.push_str(&format!(", ETA {}", format_eta(eta)));
    }
    line
}
