//! vidbatch - batch video downloading on top of an external media engine.
//!
//! The library turns declarative [`DownloadParameters`] into engine
//! directives, picks a concrete format from each video's catalog and drives
//! a batch of URLs through analysis and download. It is independent of any
//! UI: progress is published as [`BatchEvent`]s that a front end subscribes to.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use vidbatch::{BatchOrchestrator, DownloadParameters, EngineConfig, YtDlpEngine};
//!
//! # async fn example() -> vidbatch::Result<()> {
//! let engine = YtDlpEngine::new(EngineConfig::default());
//! let mut batch = BatchOrchestrator::new(engine);
//!
//! let summary = batch
//!     .analyze(["https://www.youtube.com/watch?v=dQw4w9WgXcQ"])
//!     .await?;
//! println!("{} video(s) to fetch", summary.total_videos);
//!
//! let params = DownloadParameters::new().with_container("mkv");
//! let report = batch.download(&params, Path::new("downloads")).await?;
//! println!("{} completed, {} failed", report.completed.len(), report.failed.len());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod batch;
pub mod catalog;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod directives;
pub mod engine;
pub mod error;
pub mod format;
pub mod job;
pub mod params;
pub mod progress;
pub mod resolver;
pub mod stats;
pub mod url;
pub mod ytdlp;

// Re-export main types for convenience
pub use batch::{
    BatchEvent, BatchItem, BatchOrchestrator, BatchProgress, BatchReport, BatchSummary,
    CompletedItem, FailedItem, ItemStatus,
};
pub use catalog::{FormatCatalog, FormatDescriptor};
pub use config::{AppConfig, BatchConfig, EngineConfig};
pub use directives::{Directive, DirectiveKind, DirectiveSet, compile_directives};
pub use engine::{
    DownloadOutcome, DownloadRequest, EngineProgress, MediaEngine, PlatformInfo, VideoMetadata,
};
pub use error::{Error, ParameterViolation, Result};
pub use format::{describe_progress, format_bytes, format_duration, format_eta, format_speed};
pub use job::{JobCanceller, ResolvedJob, SingleDownload, download_single, drive_download};
pub use params::{DownloadParameters, QualityTarget, Timecode, VideoCodec};
pub use progress::{EventKind, ProgressAggregator, ProgressEvent, ProgressSnapshot};
pub use resolver::resolve_format;
pub use stats::{ItemStats, ItemStatsTracker, SessionStats, SessionStatsBuilder};
pub use url::{extract_urls, looks_like_playlist};
pub use ytdlp::{YtDlpEngine, parse_metadata, parse_progress_line};
