//! Multi-item analysis and download.
//!
//! A [`BatchOrchestrator`] owns an index-addressed list of [`BatchItem`]s and
//! moves each one through a checked state machine:
//!
//! ```text
//! Pending -> Analyzing -> Ready | Warning | Error
//! Ready | Warning -> Downloading -> Completed | Failed
//! ```
//!
//! Items are analyzed and downloaded strictly one at a time, in input order.
//! A failing item is recorded and the batch moves on; only an empty ready
//! list fails a whole call.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};

use crate::config::BatchConfig;
use crate::engine::{DownloadOutcome, MediaEngine, VideoMetadata};
use crate::error::{Error, Result};
use crate::format::format_bytes;
use crate::job::{JobCanceller, ResolvedJob, drive_download};
use crate::params::DownloadParameters;
use crate::progress::{ProgressAggregator, ProgressEvent};
use crate::stats::{ItemStats, SessionStats, SessionStatsBuilder};
use crate::url::looks_like_playlist;

/// Lifecycle state of one batch item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    Analyzing,
    Ready,
    Warning,
    Error,
    Downloading,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Returns `true` if the state machine allows moving from `self` to `next`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Analyzing)
                | (Self::Analyzing, Self::Ready | Self::Warning | Self::Error)
                | (Self::Ready | Self::Warning, Self::Downloading)
                | (Self::Downloading, Self::Completed | Self::Failed)
        )
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Error | Self::Completed | Self::Failed)
    }

    /// Returns `true` for items a download call will pick up.
    #[must_use]
    pub const fn is_downloadable(self) -> bool {
        matches!(self, Self::Ready | Self::Warning)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::Analyzing => "analyzing",
            Self::Ready => "ready",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Downloading => "downloading",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// One URL tracked by the orchestrator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchItem {
    pub url: String,
    pub status: ItemStatus,
    /// Present once analysis succeeded.
    pub metadata: Option<VideoMetadata>,
    pub error: Option<String>,
    pub warning: Option<String>,
    /// Final file reported by the engine after a completed download.
    pub output: Option<PathBuf>,
}

impl BatchItem {
    fn new(url: String) -> Self {
        Self {
            url,
            status: ItemStatus::Pending,
            metadata: None,
            error: None,
            warning: None,
            output: None,
        }
    }

    /// Title when known, otherwise the URL.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.metadata
            .as_ref()
            .map_or(self.url.as_str(), |m| m.title.as_str())
    }

    /// Returns `true` for a multi-item playlist that will be fetched as one.
    ///
    /// Items flagged with a warning always count as a single video.
    #[must_use]
    pub fn is_playlist(&self) -> bool {
        self.warning.is_none()
            && self
                .metadata
                .as_ref()
                .is_some_and(VideoMetadata::is_multi_item_playlist)
    }

    /// Number of videos this item stands for (0 for analysis errors).
    #[must_use]
    pub fn video_count(&self) -> usize {
        match (&self.metadata, self.status) {
            (_, ItemStatus::Error) => 0,
            (Some(metadata), _) if self.is_playlist() => metadata.item_count,
            _ => 1,
        }
    }
}

/// Aggregate view over the analyzed items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct BatchSummary {
    pub total_videos: usize,
    pub total_playlists: usize,
    pub total_single_videos: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl BatchSummary {
    /// Computes the summary from scratch over `items`.
    #[must_use]
    pub fn from_items(items: &[BatchItem]) -> Self {
        let mut summary = Self::default();
        for item in items {
            if item.warning.is_some() {
                summary.warnings += 1;
            }
            if item.status == ItemStatus::Error {
                summary.errors += 1;
                continue;
            }
            if item.is_playlist() {
                summary.total_playlists += 1;
            } else {
                summary.total_single_videos += 1;
            }
            summary.total_videos += item.video_count();
        }
        summary
    }
}

/// Running totals of a download call, in videos.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct BatchProgress {
    pub completed_count: usize,
    pub failed_count: usize,
    pub remaining: usize,
    /// Display name of the item being processed.
    pub current: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedItem {
    pub index: usize,
    pub url: String,
    pub name: String,
    pub output: Option<PathBuf>,
    pub stats: ItemStats,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub index: usize,
    pub url: String,
    pub name: String,
    pub error: String,
}

/// Outcome of one download call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub completed: Vec<CompletedItem>,
    pub failed: Vec<FailedItem>,
    pub stats: SessionStats,
}

/// Notifications published to subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum BatchEvent {
    ItemStatusChanged { index: usize, status: ItemStatus },
    Log(ProgressEvent),
    Progress(BatchProgress),
    Summary(BatchSummary),
    Finished(BatchReport),
}

/// Sequences analysis and download across a list of URLs.
pub struct BatchOrchestrator<E: MediaEngine> {
    engine: E,
    items: Vec<BatchItem>,
    log: ProgressAggregator,
    events: broadcast::Sender<BatchEvent>,
    last_report: Option<BatchReport>,
    canceller: JobCanceller,
}

impl<E: MediaEngine> BatchOrchestrator<E> {
    /// Creates an orchestrator with default batch settings.
    pub fn new(engine: E) -> Self {
        Self::with_config(engine, &BatchConfig::default())
    }

    pub fn with_config(engine: E, config: &BatchConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            engine,
            items: Vec::new(),
            log: ProgressAggregator::with_capacity(config.log_capacity),
            events,
            last_report: None,
            canceller: JobCanceller::new(),
        }
    }

    pub const fn engine(&self) -> &E {
        &self.engine
    }

    /// Subscribes to batch events. Dropping the receiver unsubscribes.
    pub fn subscribe(&self) -> broadcast::Receiver<BatchEvent> {
        self.events.subscribe()
    }

    /// Batch events as a stream; events missed by a lagging consumer are skipped.
    pub fn event_stream(&self) -> impl Stream<Item = BatchEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe()).filter_map(std::result::Result::ok)
    }

    /// Handle that cancels the running download job; the batch then moves on.
    pub fn canceller(&self) -> JobCanceller {
        self.canceller.clone()
    }

    pub fn items(&self) -> &[BatchItem] {
        &self.items
    }

    pub fn item(&self, index: usize) -> Option<&BatchItem> {
        self.items.get(index)
    }

    /// Indices of the items a download call would process, in input order.
    pub fn ready_indices(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| item.status.is_downloadable())
            .map(|(index, _)| index)
            .collect()
    }

    pub const fn log(&self) -> &ProgressAggregator {
        &self.log
    }

    pub const fn last_report(&self) -> Option<&BatchReport> {
        self.last_report.as_ref()
    }

    /// Recomputes the summary from the current items.
    pub fn summary(&self) -> BatchSummary {
        BatchSummary::from_items(&self.items)
    }

    /// Discards items, the progress log and the last report.
    pub fn reset(&mut self) {
        self.items.clear();
        self.log.clear();
        self.last_report = None;
        log::debug!("Batch reset");
    }

    fn emit(&self, event: BatchEvent) {
        // No receivers is not an error.
        let _ = self.events.send(event);
    }

    fn record(&mut self, event: ProgressEvent) {
        self.log.append(event.clone());
        self.emit(BatchEvent::Log(event));
    }

    fn transition(&mut self, index: usize, to: ItemStatus) -> Result<()> {
        let item = self.items.get_mut(index).ok_or(Error::InvalidTransition {
            index,
            from: ItemStatus::Pending,
            to,
        })?;
        let from = item.status;
        if !from.can_transition_to(to) {
            return Err(Error::InvalidTransition { index, from, to });
        }
        item.status = to;
        log::debug!("Item {index}: {from} -> {to}");
        self.emit(BatchEvent::ItemStatusChanged { index, status: to });
        Ok(())
    }

    /// Replaces the item list with `urls` and fetches metadata for each.
    ///
    /// Fetch failures mark the item as `Error` and never fail the call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTransition`] only on an internal state machine
    /// violation.
    pub async fn analyze<I, S>(&mut self, urls: I) -> Result<BatchSummary>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.items = urls.into_iter().map(|u| BatchItem::new(u.into())).collect();
        self.last_report = None;
        let total = self.items.len();
        log::info!("Analyzing {total} URL(s) with {}", self.engine.name());

        for index in 0..total {
            self.transition(index, ItemStatus::Analyzing)?;
            let url = self.items[index].url.clone();
            self.record(ProgressEvent::info(format!(
                "Analyzing {}/{total}: {url}",
                index + 1
            )));

            match self.engine.fetch_metadata(&url).await {
                Ok(metadata) => {
                    let status = if looks_like_playlist(&url) && !metadata.platform.supports_playlists
                    {
                        let message = format!(
                            "{} does not support playlists; {url} will be downloaded as a single video",
                            metadata.platform.name
                        );
                        self.items[index].warning = Some(message.clone());
                        self.record(ProgressEvent::warning(message));
                        ItemStatus::Warning
                    } else {
                        ItemStatus::Ready
                    };
                    self.items[index].metadata = Some(metadata);
                    self.transition(index, status)?;
                }
                Err(err) => {
                    log::warn!("Failed to analyze {url}: {err}");
                    self.items[index].error = Some(err.to_string());
                    self.record(ProgressEvent::error(format!("{url}: {err}")));
                    self.transition(index, ItemStatus::Error)?;
                }
            }
        }

        let summary = self.summary();
        self.record(ProgressEvent::info(format!(
            "Found {} video(s): {} playlist(s), {} single, {} error(s), {} warning(s)",
            summary.total_videos,
            summary.total_playlists,
            summary.total_single_videos,
            summary.errors,
            summary.warnings
        )));
        self.emit(BatchEvent::Summary(summary));
        log::info!("Analysis finished: {summary:?}");
        Ok(summary)
    }

    /// Downloads every `Ready` or `Warning` item, one at a time, in order.
    ///
    /// Each item is resolved and compiled against `parameters`. A failing item
    /// is marked `Failed` and the batch continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NoReadyItems`] when there is nothing to download.
    pub async fn download(
        &mut self,
        parameters: &DownloadParameters,
        output_root: &Path,
    ) -> Result<BatchReport> {
        let ready = self.ready_indices();
        if ready.is_empty() {
            return Err(Error::NoReadyItems);
        }

        let total_videos: usize = ready.iter().map(|&i| self.items[i].video_count()).sum();
        log::info!(
            "Downloading {} item(s) ({total_videos} video(s)) to {}",
            ready.len(),
            output_root.display()
        );

        let mut session = SessionStatsBuilder::new();
        let mut completed = Vec::new();
        let mut failed = Vec::new();
        let mut progress = BatchProgress {
            remaining: total_videos,
            ..BatchProgress::default()
        };

        for index in ready {
            let name = self.items[index].display_name().to_string();
            let url = self.items[index].url.clone();
            let videos = self.items[index].video_count();

            self.transition(index, ItemStatus::Downloading)?;
            progress.current = Some(name.clone());
            self.emit(BatchEvent::Progress(progress.clone()));

            match self.download_item(index, parameters, output_root).await {
                Ok((outcome, stats)) => {
                    self.items[index].output.clone_from(&outcome.output);
                    self.transition(index, ItemStatus::Completed)?;
                    self.record(ProgressEvent::success(format!(
                        "Downloaded {name} ({})",
                        format_bytes(stats.bytes)
                    )));
                    session.add_completed(&stats);
                    progress.completed_count += videos;
                    completed.push(CompletedItem {
                        index,
                        url,
                        name,
                        output: outcome.output,
                        stats,
                    });
                }
                Err(err) => {
                    log::warn!("Download of {url} failed: {err}");
                    self.items[index].error = Some(err.to_string());
                    self.transition(index, ItemStatus::Failed)?;
                    self.record(ProgressEvent::error(format!("{name}: {err}")));
                    session.add_failed();
                    progress.failed_count += videos;
                    failed.push(FailedItem {
                        index,
                        url,
                        name,
                        error: err.to_string(),
                    });
                }
            }

            progress.remaining =
                total_videos.saturating_sub(progress.completed_count + progress.failed_count);
            self.emit(BatchEvent::Progress(progress.clone()));
        }

        let report = BatchReport {
            completed,
            failed,
            stats: session.build(),
        };
        self.record(ProgressEvent::info(format!(
            "Batch finished: {} completed, {} failed",
            report.completed.len(),
            report.failed.len()
        )));
        self.emit(BatchEvent::Finished(report.clone()));
        log::info!(
            "Batch finished: {} completed, {} failed",
            report.completed.len(),
            report.failed.len()
        );
        self.last_report = Some(report.clone());
        Ok(report)
    }

    async fn download_item(
        &mut self,
        index: usize,
        parameters: &DownloadParameters,
        output_root: &Path,
    ) -> Result<(DownloadOutcome, ItemStats)> {
        let item = &self.items[index];
        let url = item.url.clone();
        let name = item.display_name().to_string();
        let playlist = item.is_playlist();
        let metadata = item
            .metadata
            .clone()
            .ok_or_else(|| Error::Engine(format!("{url} has no metadata")))?;

        let job = ResolvedJob::prepare(parameters, &metadata)?;
        if let Some(warning) = &job.warning {
            self.record(ProgressEvent::warning(warning.clone()));
        }
        log::debug!("{url}: format {}, {}", job.format_label(), job.directives);

        let request = job
            .request(&url, output_root, playlist)
            .with_cancellation(self.canceller.next_job());
        let events = self.events.clone();
        let (result, stats) = drive_download(&self.engine, &request, &name, &mut self.log, |event| {
            let _ = events.send(BatchEvent::Log(event.clone()));
        })
        .await;
        result.map(|outcome| (outcome, stats))
    }
}
