//! Turning parameters and metadata into a concrete engine job, and running it.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::FormatCatalog;
use crate::directives::{DirectiveSet, compile_directives};
use crate::engine::{DownloadOutcome, DownloadRequest, MediaEngine, VideoMetadata};
use crate::error::{Error, Result};
use crate::params::DownloadParameters;
use crate::progress::{ProgressAggregator, ProgressEvent};
use crate::resolver::resolve_format;
use crate::stats::{ItemStats, ItemStatsTracker};

/// The outcome of resolution and compilation for one item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedJob {
    /// Pinned format; `None` means the selection expression alone decides.
    pub format_id: Option<String>,
    pub directives: DirectiveSet,
    /// Set when resolution degraded to an unspecified format.
    pub warning: Option<String>,
}

impl ResolvedJob {
    /// Resolves a format from `metadata` and compiles `parameters` against it.
    ///
    /// Resolution is skipped for audio-only requests. An empty catalog or an
    /// unmatched request leaves the format unspecified and records a warning.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidParameters`] if the parameters are inconsistent.
    pub fn prepare(parameters: &DownloadParameters, metadata: &VideoMetadata) -> Result<Self> {
        let mut warning = None;
        let format_id = if parameters.extract_audio_only {
            None
        } else {
            let resolved = FormatCatalog::classify(metadata.formats.clone())
                .and_then(|catalog| resolve_format(parameters, &catalog).map(|d| d.id.clone()));
            match resolved {
                Ok(id) => Some(id),
                Err(err @ (Error::EmptyCatalog | Error::NoFormatAvailable)) => {
                    log::warn!("{}: {err}, leaving format unspecified", metadata.title);
                    warning = Some(format!(
                        "{}: {err}; using the generic selection",
                        metadata.title
                    ));
                    None
                }
                Err(err) => return Err(err),
            }
        };

        let directives = compile_directives(parameters, format_id.as_deref())?;
        Ok(Self {
            format_id,
            directives,
            warning,
        })
    }

    /// Format id for display, `"unspecified"` when none was pinned.
    #[must_use]
    pub fn format_label(&self) -> &str {
        self.format_id.as_deref().unwrap_or("unspecified")
    }

    /// Builds the engine request for this job.
    #[must_use]
    pub fn request(&self, url: &str, output_dir: &Path, playlist: bool) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            directives: self.directives.clone(),
            format_id: self.format_id.clone(),
            output_dir: output_dir.to_path_buf(),
            playlist,
            cancel: CancellationToken::new(),
        }
    }
}

/// Cancels whichever job is currently running, from outside the batch.
///
/// Each job receives a fresh token from [`JobCanceller::next_job`], so a
/// cancellation never carries over to the jobs that follow.
#[derive(Debug, Clone, Default)]
pub struct JobCanceller {
    current: Arc<Mutex<CancellationToken>>,
}

impl JobCanceller {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancels the running job, if any.
    pub fn cancel_current(&self) {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }

    /// Issues the token for the next job and makes it the current one.
    #[must_use]
    pub fn next_job(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.current.lock().unwrap_or_else(PoisonError::into_inner) = token.clone();
        token
    }
}

/// Runs one engine download while draining its progress channel in order.
///
/// Every notification is folded into the item statistics, recorded in `log`
/// and handed to `on_event`.
pub async fn drive_download<E>(
    engine: &E,
    request: &DownloadRequest,
    name: &str,
    log: &mut ProgressAggregator,
    mut on_event: impl FnMut(&ProgressEvent) + Send,
) -> (Result<DownloadOutcome>, ItemStats)
where
    E: MediaEngine + ?Sized,
{
    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut tracker = ItemStatsTracker::new();
    let download = engine.download(request, tx);
    tokio::pin!(download);

    let result = loop {
        tokio::select! {
            biased;
            Some(update) = rx.recv() => {
                tracker.observe(&update);
                on_event(&log.record_engine_progress(name, &update));
            }
            result = &mut download => break result,
        }
    };
    while let Ok(update) = rx.try_recv() {
        tracker.observe(&update);
        on_event(&log.record_engine_progress(name, &update));
    }

    (result, tracker.finish())
}

/// Result of [`download_single`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SingleDownload {
    pub title: String,
    pub format_id: Option<String>,
    pub output: Option<PathBuf>,
    pub stats: ItemStats,
}

/// Fetches, prepares and downloads one URL, reporting into `log`.
///
/// # Errors
///
/// Any metadata, parameter or engine failure is recorded in `log` and returned.
pub async fn download_single<E>(
    engine: &E,
    url: &str,
    parameters: &DownloadParameters,
    output_dir: &Path,
    log: &mut ProgressAggregator,
) -> Result<SingleDownload>
where
    E: MediaEngine + ?Sized,
{
    log.append(ProgressEvent::info(format!("Analyzing {url}")));
    let metadata = match engine.fetch_metadata(url).await {
        Ok(metadata) => metadata,
        Err(err) => {
            log.append(ProgressEvent::error(format!("{url}: {err}")));
            return Err(err);
        }
    };

    let job = match ResolvedJob::prepare(parameters, &metadata) {
        Ok(job) => job,
        Err(err) => {
            log.append(ProgressEvent::error(format!("{}: {err}", metadata.title)));
            return Err(err);
        }
    };
    if let Some(warning) = &job.warning {
        log.append(ProgressEvent::warning(warning.clone()));
    }
    log::debug!("{url}: format {}, {}", job.format_label(), job.directives);

    let request = job.request(url, output_dir, metadata.is_multi_item_playlist());
    let (result, stats) = drive_download(engine, &request, &metadata.title, log, |_| {}).await;
    match result {
        Ok(outcome) => {
            log.append(ProgressEvent::success(format!("Downloaded {}", metadata.title)));
            Ok(SingleDownload {
                title: metadata.title,
                format_id: job.format_id,
                output: outcome.output,
                stats,
            })
        }
        Err(err) => {
            log.append(ProgressEvent::error(format!("{}: {err}", metadata.title)));
            Err(err)
        }
    }
}
