//! Bounded, de-duplicated log of user-visible progress events.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::EngineProgress;
use crate::format::describe_progress;

/// Default number of events kept in the log.
pub const DEFAULT_LOG_CAPACITY: usize = 100;

/// Category of a progress event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Success,
    Warning,
    Error,
    Progress,
}

/// One timestamped entry of the progress log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub kind: EventKind,
    /// Completion in percent, always within `0.0..=100.0`.
    pub percent: Option<f32>,
}

impl ProgressEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(kind: EventKind, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            kind,
            percent: None,
        }
    }

    #[must_use]
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(EventKind::Info, message)
    }

    #[must_use]
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(EventKind::Success, message)
    }

    #[must_use]
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(EventKind::Warning, message)
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(EventKind::Error, message)
    }

    /// Creates a `Progress` event; `percent` is clamped and NaN is dropped.
    #[must_use]
    pub fn progress(message: impl Into<String>, percent: Option<f32>) -> Self {
        Self {
            percent: percent.filter(|p| !p.is_nan()).map(|p| p.clamp(0.0, 100.0)),
            ..Self::new(EventKind::Progress, message)
        }
    }

    /// Returns `true` for `Progress` events.
    #[must_use]
    pub fn is_progress(&self) -> bool {
        self.kind == EventKind::Progress
    }
}

/// A copy of the log at one point in time.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProgressSnapshot {
    /// Oldest first.
    pub log: Vec<ProgressEvent>,
    pub latest: Option<ProgressEvent>,
}

/// Keeps the most recent events, collapsing runs of `Progress` updates.
#[derive(Debug, Clone)]
pub struct ProgressAggregator {
    log: VecDeque<ProgressEvent>,
    capacity: usize,
}

impl Default for ProgressAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressAggregator {
    /// Creates an aggregator holding up to [`DEFAULT_LOG_CAPACITY`] events.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }

    /// Creates an aggregator holding up to `capacity` events (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            log: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Adds an event to the log.
    ///
    /// A `Progress` event directly following another `Progress` event replaces
    /// it. Once the log is full, the oldest event is evicted.
    pub fn append(&mut self, event: ProgressEvent) {
        if event.is_progress()
            && let Some(last) = self.log.back_mut()
            && last.is_progress()
        {
            *last = event;
            return;
        }
        if self.log.len() == self.capacity {
            self.log.pop_front();
        }
        self.log.push_back(event);
    }

    /// Formats an engine notification into a `Progress` event and appends it.
    ///
    /// Returns the appended event.
    pub fn record_engine_progress(&mut self, name: &str, progress: &EngineProgress) -> ProgressEvent {
        let event = ProgressEvent::progress(describe_progress(name, progress), progress.percent);
        self.append(event.clone());
        event
    }

    /// Copies the current log and latest entry.
    #[must_use]
    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            log: self.log.iter().cloned().collect(),
            latest: self.log.back().cloned(),
        }
    }

    #[must_use]
    pub fn latest(&self) -> Option<&ProgressEvent> {
        self.log.back()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.log.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log.is_empty()
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.log.clear();
    }
}
