//! Transfer statistics for single items and whole sessions.

use std::time::{Duration, Instant};

use crate::engine::EngineProgress;

/// Statistics for one downloaded item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemStats {
    /// Bytes transferred, as last reported by the engine.
    pub bytes: u64,
    pub elapsed: Duration,
    /// Average speed in bytes per second.
    pub average_speed: u64,
    /// Highest speed reported by the engine, in bytes per second.
    pub peak_speed: u64,
}

/// Statistics for an entire batch or single-item session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStats {
    pub items_completed: usize,
    pub items_failed: usize,
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// Highest per-item peak speed, in bytes per second.
    pub peak_speed: u64,
}

impl Default for SessionStats {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStats {
    /// Creates empty session stats.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            items_completed: 0,
            items_failed: 0,
            total_bytes: 0,
            elapsed: Duration::ZERO,
            peak_speed: 0,
        }
    }

    /// Returns the average download speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            (self.total_bytes as f64 / secs) as u64
        } else {
            0
        }
    }
}

/// Follows engine progress notifications for one item.
///
/// An item may span several files (separate video and audio streams, playlist
/// entries). Each restarts the engine's byte counter, so a drop in
/// `downloaded_bytes` closes the current stream and starts a new one.
#[derive(Debug)]
pub struct ItemStatsTracker {
    start_time: Instant,
    finished_streams: u64,
    current_stream: u64,
    peak_speed: u64,
}

impl Default for ItemStatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ItemStatsTracker {
    /// Starts tracking from now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            finished_streams: 0,
            current_stream: 0,
            peak_speed: 0,
        }
    }

    /// Folds one engine notification into the running totals.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn observe(&mut self, progress: &EngineProgress) {
        if let Some(done) = progress.downloaded_bytes {
            if done < self.current_stream {
                self.finished_streams = self.finished_streams.saturating_add(self.current_stream);
            }
            self.current_stream = done;
        }
        // A finished stream transferred its whole size.
        if progress.percent.is_some_and(|p| p >= 100.0)
            && let Some(total) = progress.total_bytes
        {
            self.current_stream = self.current_stream.max(total);
        }
        if let Some(speed) = progress.speed_bytes_per_sec
            && speed.is_finite()
            && speed > 0.0
        {
            self.peak_speed = self.peak_speed.max(speed as u64);
        }
    }

    #[must_use]
    pub const fn bytes(&self) -> u64 {
        self.finished_streams.saturating_add(self.current_stream)
    }

    #[must_use]
    pub const fn peak_speed(&self) -> u64 {
        self.peak_speed
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Returns the average speed in bytes per second.
    #[must_use]
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn average_speed(&self) -> u64 {
        let secs = self.elapsed().as_secs_f64();
        if secs > 0.0 {
            (self.bytes() as f64 / secs) as u64
        } else {
            0
        }
    }

    /// Converts this tracker into final item statistics.
    #[must_use]
    pub fn finish(self) -> ItemStats {
        ItemStats {
            bytes: self.bytes(),
            elapsed: self.elapsed(),
            average_speed: self.average_speed(),
            peak_speed: self.peak_speed,
        }
    }
}

/// Accumulates session statistics while items are processed.
#[derive(Debug)]
pub struct SessionStatsBuilder {
    items_completed: usize,
    items_failed: usize,
    total_bytes: u64,
    start_time: Instant,
    peak_speed: u64,
}

impl Default for SessionStatsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStatsBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items_completed: 0,
            items_failed: 0,
            total_bytes: 0,
            start_time: Instant::now(),
            peak_speed: 0,
        }
    }

    /// Records a completed item.
    pub fn add_completed(&mut self, item: &ItemStats) {
        self.items_completed += 1;
        self.total_bytes += item.bytes;
        self.peak_speed = self.peak_speed.max(item.peak_speed);
    }

    /// Records a failed item.
    pub const fn add_failed(&mut self) {
        self.items_failed += 1;
    }

    /// Builds the final session statistics.
    #[must_use]
    pub fn build(self) -> SessionStats {
        SessionStats {
            items_completed: self.items_completed,
            items_failed: self.items_failed,
            total_bytes: self.total_bytes,
            elapsed: self.start_time.elapsed(),
            peak_speed: self.peak_speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(percent: f32, done: u64, total: u64, speed: f64) -> EngineProgress {
        EngineProgress {
            percent: Some(percent),
            downloaded_bytes: Some(done),
            total_bytes: Some(total),
            speed_bytes_per_sec: Some(speed),
            eta_seconds: None,
        }
    }

    #[test]
    fn session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.items_completed, 0);
        assert_eq!(stats.items_failed, 0);
        assert_eq!(stats.total_bytes, 0);
    }

    #[test]
    fn session_stats_average_speed_zero_elapsed() {
        let stats = SessionStats {
            total_bytes: 1000,
            ..SessionStats::new()
        };
        assert_eq!(stats.average_speed(), 0);
    }

    #[test]
    fn session_stats_average_speed() {
        let stats = SessionStats {
            items_completed: 1,
            total_bytes: 1000,
            elapsed: Duration::from_secs(2),
            ..SessionStats::new()
        };
        assert_eq!(stats.average_speed(), 500);
    }

    #[test]
    fn tracker_keeps_peak_speed_and_bytes() {
        let mut tracker = ItemStatsTracker::new();
        tracker.observe(&progress(10.0, 100, 1000, 100.0));
        tracker.observe(&progress(50.0, 500, 1000, 500.0));
        tracker.observe(&progress(60.0, 600, 1000, 300.0));
        assert_eq!(tracker.peak_speed(), 500);
        assert_eq!(tracker.bytes(), 600);

        tracker.observe(&progress(100.0, 900, 1000, 200.0));
        assert_eq!(tracker.bytes(), 1000);
    }

    #[test]
    fn tracker_sums_consecutive_streams() {
        let mut tracker = ItemStatsTracker::new();
        // Video stream.
        tracker.observe(&progress(40.0, 400, 1000, 100.0));
        tracker.observe(&progress(100.0, 1000, 1000, 100.0));
        // Audio stream restarts the counter.
        tracker.observe(&progress(25.0, 50, 200, 100.0));
        assert_eq!(tracker.bytes(), 1050);
        tracker.observe(&progress(100.0, 200, 200, 100.0));
        // Next playlist entry, never reported as finished.
        tracker.observe(&progress(10.0, 30, 300, 100.0));
        assert_eq!(tracker.finish().bytes, 1230);
    }

    #[test]
    fn tracker_ignores_garbage_speed() {
        let mut tracker = ItemStatsTracker::new();
        tracker.observe(&EngineProgress {
            speed_bytes_per_sec: Some(f64::NAN),
            ..EngineProgress::default()
        });
        tracker.observe(&EngineProgress {
            speed_bytes_per_sec: Some(-5.0),
            ..EngineProgress::default()
        });
        assert_eq!(tracker.finish().peak_speed, 0);
    }

    #[test]
    fn session_stats_builder() {
        let mut builder = SessionStatsBuilder::new();
        builder.add_completed(&ItemStats {
            bytes: 500,
            elapsed: Duration::from_secs(1),
            average_speed: 500,
            peak_speed: 600,
        });
        builder.add_completed(&ItemStats {
            bytes: 250,
            elapsed: Duration::from_secs(1),
            average_speed: 250,
            peak_speed: 900,
        });
        builder.add_failed();

        let stats = builder.build();
        assert_eq!(stats.items_completed, 2);
        assert_eq!(stats.items_failed, 1);
        assert_eq!(stats.total_bytes, 750);
        assert_eq!(stats.peak_speed, 900);
    }
}
