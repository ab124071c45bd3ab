//! Abstraction over the external downloading engine.
//!
//! The orchestrator only talks to a [`MediaEngine`]; [`crate::ytdlp::YtDlpEngine`]
//! is the production implementation and tests substitute their own.

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::catalog::FormatDescriptor;
use crate::directives::DirectiveSet;
use crate::error::Result;

/// The site a URL belongs to, as reported by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformInfo {
    pub name: String,
    pub supports_playlists: bool,
}

/// Metadata fetched for one URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub title: String,
    pub duration_seconds: Option<f64>,
    pub thumbnail_url: Option<String>,
    pub formats: Vec<FormatDescriptor>,
    pub is_playlist: bool,
    /// Number of entries; 1 for a single video.
    pub item_count: usize,
    pub platform: PlatformInfo,
}

impl VideoMetadata {
    /// Returns `true` for a playlist holding more than one entry.
    #[must_use]
    pub const fn is_multi_item_playlist(&self) -> bool {
        self.is_playlist && self.item_count > 1
    }
}

/// One progress notification emitted by the engine during a download.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EngineProgress {
    pub percent: Option<f32>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub speed_bytes_per_sec: Option<f64>,
    pub eta_seconds: Option<u64>,
}

/// Everything the engine needs to run one download job.
#[derive(Debug, Clone)]
pub struct DownloadRequest {
    pub url: String,
    pub directives: DirectiveSet,
    /// Resolved format id, `None` when resolution was skipped.
    pub format_id: Option<String>,
    pub output_dir: PathBuf,
    /// Whether every entry of a playlist URL should be fetched.
    pub playlist: bool,
    /// Cancels this job only; later jobs get their own token.
    pub cancel: CancellationToken,
}

impl DownloadRequest {
    /// Replaces the job's cancellation token.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }
}

/// What the engine reports once a download finished.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DownloadOutcome {
    /// Final path of the produced file, when the engine reports one.
    pub output: Option<PathBuf>,
}

/// An external engine able to describe and download media URLs.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Name of the engine (for logging).
    fn name(&self) -> &'static str;

    /// Fetches metadata and available formats for `url`.
    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata>;

    /// Runs one download, sending progress notifications in emission order.
    ///
    /// The sender is dropped when the download ends, which closes the channel.
    async fn download(
        &self,
        request: &DownloadRequest,
        progress: mpsc::UnboundedSender<EngineProgress>,
    ) -> Result<DownloadOutcome>;
}
