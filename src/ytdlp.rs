//! [`MediaEngine`] implementation driving the `yt-dlp` executable.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use crate::catalog::FormatDescriptor;
use crate::config::EngineConfig;
use crate::engine::{
    DownloadOutcome, DownloadRequest, EngineProgress, MediaEngine, PlatformInfo, VideoMetadata,
};
use crate::error::{Error, Result};

const TOOL: &str = "yt-dlp";

/// Prefix of the lines produced by our `--progress-template`.
const PROGRESS_MARKER: &str = "[vidbatch-progress]";

/// Prefix of the line printed once the final file is in place.
const FILE_MARKER: &str = "[vidbatch-file]";

/// Extractors that only ever serve single media items.
const SINGLE_MEDIA_PLATFORMS: &[&str] = &[
    "tiktok",
    "instagram",
    "twitter",
    "reddit",
    "facebook",
    "streamable",
];

static PROGRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^\[vidbatch-progress\]\s+(?P<done>\S+)\s+(?P<total>\S+)\s+(?P<estimate>\S+)\s+(?P<speed>\S+)\s+(?P<eta>\S+)(?:\s+(?P<percent>[0-9.]+)%)?",
    )
    .expect("valid regex")
});

/// Returns `false` for platforms known to host only single media items.
#[must_use]
pub fn platform_supports_playlists(platform: &str) -> bool {
    let platform = platform.to_ascii_lowercase();
    !SINGLE_MEDIA_PLATFORMS.iter().any(|p| platform.contains(p))
}

#[derive(Debug, Deserialize)]
struct RawInfo {
    #[serde(rename = "_type")]
    kind: Option<String>,
    title: Option<String>,
    duration: Option<f64>,
    thumbnail: Option<String>,
    formats: Option<Vec<RawFormat>>,
    playlist_count: Option<usize>,
    entries: Option<Vec<serde_json::Value>>,
    extractor_key: Option<String>,
    extractor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawFormat {
    format_id: String,
    ext: Option<String>,
    vcodec: Option<String>,
    acodec: Option<String>,
    height: Option<u32>,
    abr: Option<f64>,
    filesize: Option<f64>,
    filesize_approx: Option<f64>,
    fps: Option<f64>,
}

fn codec(value: Option<String>) -> Option<String> {
    value.filter(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn byte_count(value: f64) -> Option<u64> {
    (value.is_finite() && value >= 0.0).then_some(value as u64)
}

impl From<RawFormat> for FormatDescriptor {
    fn from(raw: RawFormat) -> Self {
        Self {
            id: raw.format_id,
            container: raw.ext.unwrap_or_default(),
            video_codec: codec(raw.vcodec),
            audio_codec: codec(raw.acodec),
            height_px: raw.height,
            audio_bitrate_kbps: raw.abr.filter(|abr| *abr > 0.0),
            file_size_bytes: raw.filesize.or(raw.filesize_approx).and_then(byte_count),
            frame_rate: raw.fps,
        }
    }
}

/// Parses the output of `yt-dlp --dump-single-json`.
///
/// # Errors
///
/// Returns [`Error::Json`] if the text is not a valid info document.
pub fn parse_metadata(json: &str) -> Result<VideoMetadata> {
    let raw: RawInfo = serde_json::from_str(json)?;

    let is_playlist = raw.kind.as_deref() == Some("playlist");
    let item_count = if is_playlist {
        raw.playlist_count
            .or_else(|| raw.entries.as_ref().map(Vec::len))
            .unwrap_or(0)
    } else {
        1
    };
    let name = raw
        .extractor_key
        .or(raw.extractor)
        .unwrap_or_else(|| "Generic".to_string());

    Ok(VideoMetadata {
        title: raw.title.unwrap_or_else(|| "Untitled".to_string()),
        duration_seconds: raw.duration,
        thumbnail_url: raw.thumbnail,
        formats: raw
            .formats
            .unwrap_or_default()
            .into_iter()
            .map(FormatDescriptor::from)
            .collect(),
        is_playlist,
        item_count,
        platform: PlatformInfo {
            supports_playlists: platform_supports_playlists(&name),
            name,
        },
    })
}

fn parse_number(field: &str) -> Option<f64> {
    if field == "NA" || field == "None" {
        return None;
    }
    field.parse::<f64>().ok().filter(|n| n.is_finite() && *n >= 0.0)
}

/// Parses one line produced by our progress template.
///
/// Returns `None` for any other line. Missing values (`NA`) stay unset; the
/// percentage is derived from the byte counts when yt-dlp does not print one.
#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn parse_progress_line(line: &str) -> Option<EngineProgress> {
    let caps = PROGRESS_RE.captures(line.trim())?;
    let field = |name: &str| caps.name(name).and_then(|m| parse_number(m.as_str()));

    let downloaded_bytes = field("done").map(|n| n as u64);
    let total_bytes = field("total").or_else(|| field("estimate")).map(|n| n as u64);
    let percent = field("percent").map(|p| p as f32).or_else(|| {
        match (downloaded_bytes, total_bytes) {
            (Some(done), Some(total)) if total > 0 => Some((done as f64 / total as f64 * 100.0) as f32),
            _ => None,
        }
    });

    Some(EngineProgress {
        percent: percent.map(|p| p.clamp(0.0, 100.0)),
        downloaded_bytes,
        total_bytes,
        speed_bytes_per_sec: field("speed"),
        eta_seconds: field("eta").map(|n| n as u64),
    })
}

/// Picks the most useful failure message out of yt-dlp's stderr.
fn last_error_line(stderr: &str) -> Option<String> {
    let lines: Vec<&str> = stderr.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:"))
        .map(|l| l.trim().to_string())
        .or_else(|| lines.last().map(|l| (*l).to_string()))
}

/// Feeds every line of `reader` to `f` until EOF.
///
/// Invalid UTF-8 is replaced rather than treated as the end of output, so the
/// pipe keeps draining and the child never blocks or dies on a write.
async fn for_each_line<R, F>(reader: R, mut f: F)
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => f(String::from_utf8_lossy(&buf).trim_end_matches(['\r', '\n'])),
            Err(err) => {
                log::debug!("Stopped reading {TOOL} output: {err}");
                break;
            }
        }
    }
}

/// Engine backed by the `yt-dlp` command-line program.
#[derive(Debug, Clone, Default)]
pub struct YtDlpEngine {
    config: EngineConfig,
}

impl YtDlpEngine {
    #[must_use]
    pub const fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The executable that will be spawned.
    #[must_use]
    pub fn program(&self) -> &Path {
        self.config
            .ytdlp_path
            .as_deref()
            .unwrap_or_else(|| Path::new(TOOL))
    }

    /// Arguments of the metadata fetch for `url`.
    #[must_use]
    pub fn metadata_args(&self, url: &str) -> Vec<String> {
        vec![
            "--dump-single-json".to_string(),
            "--flat-playlist".to_string(),
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
            "--".to_string(),
            url.to_string(),
        ]
    }

    /// Arguments of the download described by `request`.
    #[must_use]
    pub fn download_args(&self, request: &DownloadRequest) -> Vec<String> {
        let template = request.output_dir.join(&self.config.output_template);
        let mut args = vec![
            "--newline".to_string(),
            "--progress".to_string(),
            "--progress-template".to_string(),
            format!(
                "download:{PROGRESS_MARKER} %(progress.downloaded_bytes)s %(progress.total_bytes)s \
                 %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s \
                 %(progress._percent_str)s"
            ),
            "--print".to_string(),
            format!("after_move:{FILE_MARKER} %(filepath)s"),
            "-o".to_string(),
            template.to_string_lossy().into_owned(),
            if request.playlist {
                "--yes-playlist"
            } else {
                "--no-playlist"
            }
            .to_string(),
            "--socket-timeout".to_string(),
            self.config.socket_timeout_secs.to_string(),
        ];
        if let Some(ffmpeg) = &self.config.ffmpeg_location {
            args.push("--ffmpeg-location".to_string());
            args.push(ffmpeg.to_string_lossy().into_owned());
        }
        args.extend(request.directives.to_args());
        args.push("--".to_string());
        args.push(request.url.clone());
        args
    }

    fn command(&self, args: &[String]) -> Command {
        log::debug!("{} {}", self.program().display(), args.join(" "));
        let mut command = Command::new(self.program());
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }

    fn spawn_error(err: std::io::Error) -> Error {
        if err.kind() == std::io::ErrorKind::NotFound {
            Error::ToolNotFound {
                tool: TOOL.to_string(),
            }
        } else {
            Error::Io(err)
        }
    }
}

#[async_trait]
impl MediaEngine for YtDlpEngine {
    fn name(&self) -> &'static str {
        TOOL
    }

    async fn fetch_metadata(&self, url: &str) -> Result<VideoMetadata> {
        let secs = self.config.metadata_timeout_secs;
        let output = tokio::time::timeout(
            Duration::from_secs(secs),
            self.command(&self.metadata_args(url)).output(),
        )
        .await
        .map_err(|_| Error::Timeout(secs))?
        .map_err(Self::spawn_error)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Engine(last_error_line(&stderr).unwrap_or_else(|| {
                format!("{TOOL} exited with {}", output.status)
            })));
        }
        parse_metadata(&String::from_utf8_lossy(&output.stdout))
    }

    async fn download(
        &self,
        request: &DownloadRequest,
        progress: mpsc::UnboundedSender<EngineProgress>,
    ) -> Result<DownloadOutcome> {
        if request.cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let mut child = self
            .command(&self.download_args(request))
            .spawn()
            .map_err(Self::spawn_error)?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Engine(format!("{TOOL} stdout unavailable")))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Engine(format!("{TOOL} stderr unavailable")))?;

        let stdout_reader = tokio::spawn(async move {
            let mut output = None;
            for_each_line(stdout, |line| {
                if let Some(update) = parse_progress_line(line) {
                    // A dropped receiver only means nobody is watching.
                    let _ = progress.send(update);
                } else if let Some(path) = line.trim().strip_prefix(FILE_MARKER) {
                    output = Some(PathBuf::from(path.trim()));
                }
            })
            .await;
            output
        });
        let stderr_reader = tokio::spawn(async move {
            let mut buf = String::new();
            for_each_line(stderr, |line| {
                buf.push_str(line);
                buf.push('\n');
            })
            .await;
            buf
        });

        let status = tokio::select! {
            status = child.wait() => status?,
            () = request.cancel.cancelled() => {
                let _ = child.kill().await;
                stdout_reader.abort();
                stderr_reader.abort();
                log::warn!("Cancelled download of {}", request.url);
                return Err(Error::Cancelled);
            }
        };

        let output = stdout_reader.await.unwrap_or_default();
        let stderr = stderr_reader.await.unwrap_or_default();

        if !status.success() {
            return Err(Error::Engine(
                last_error_line(&stderr).unwrap_or_else(|| format!("{TOOL} exited with {status}")),
            ));
        }
        Ok(DownloadOutcome { output })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directives::compile_directives;
    use crate::params::DownloadParameters;
    use tokio_util::sync::CancellationToken;

    const VIDEO_JSON: &str = r#"{
        "_type": "video",
        "id": "abc",
        "title": "A clip",
        "duration": 61.5,
        "thumbnail": "https://i.example/abc.jpg",
        "extractor_key": "Youtube",
        "formats": [
            {"format_id": "sb0", "ext": "mhtml", "vcodec": "none", "acodec": "none"},
            {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2", "abr": 129.5, "filesize": 1000},
            {"format_id": "137", "ext": "mp4", "vcodec": "avc1.640028", "acodec": "none", "height": 1080, "fps": 30, "filesize_approx": 5000.0},
            {"format_id": "18", "ext": "mp4", "vcodec": "avc1.42001E", "acodec": "mp4a.40.2", "height": 360, "abr": null}
        ]
    }"#;

    #[test]
    fn parses_video_metadata() {
        let metadata = parse_metadata(VIDEO_JSON).unwrap();
        assert_eq!(metadata.title, "A clip");
        assert_eq!(metadata.duration_seconds, Some(61.5));
        assert!(!metadata.is_playlist);
        assert_eq!(metadata.item_count, 1);
        assert_eq!(metadata.platform.name, "Youtube");
        assert!(metadata.platform.supports_playlists);
        assert_eq!(metadata.formats.len(), 4);

        let audio = &metadata.formats[1];
        assert_eq!(audio.video_codec, None);
        assert!(audio.has_audio());
        assert_eq!(audio.file_size_bytes, Some(1000));

        let video = &metadata.formats[2];
        assert_eq!(video.height_px, Some(1080));
        assert_eq!(video.audio_codec, None);
        assert_eq!(video.file_size_bytes, Some(5000));
    }

    #[test]
    fn parses_playlist_metadata() {
        let json = r#"{"_type": "playlist", "title": "Mix", "extractor_key": "YoutubeTab",
            "entries": [{"id": "a"}, {"id": "b"}, null]}"#;
        let metadata = parse_metadata(json).unwrap();
        assert!(metadata.is_playlist);
        assert_eq!(metadata.item_count, 3);
        assert!(metadata.formats.is_empty());

        let counted = r#"{"_type": "playlist", "title": "Mix", "playlist_count": 12}"#;
        assert_eq!(parse_metadata(counted).unwrap().item_count, 12);
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(parse_metadata("not json"), Err(Error::Json(_))));
    }

    #[test]
    fn single_media_platforms() {
        assert!(!platform_supports_playlists("TikTok"));
        assert!(!platform_supports_playlists("Twitter"));
        assert!(!platform_supports_playlists("InstagramStory"));
        assert!(platform_supports_playlists("Youtube"));
        assert!(platform_supports_playlists("Soundcloud"));
    }

    #[test]
    fn parses_progress_lines() {
        let progress =
            parse_progress_line("[vidbatch-progress] 1024 4096 NA 512.5 6  25.0%").unwrap();
        assert_eq!(progress.downloaded_bytes, Some(1024));
        assert_eq!(progress.total_bytes, Some(4096));
        assert_eq!(progress.speed_bytes_per_sec, Some(512.5));
        assert_eq!(progress.eta_seconds, Some(6));
        assert_eq!(progress.percent, Some(25.0));
    }

    #[test]
    fn progress_falls_back_to_estimate_and_derived_percent() {
        let progress = parse_progress_line("[vidbatch-progress] 50 NA 200.0 NA NA Unknown").unwrap();
        assert_eq!(progress.total_bytes, Some(200));
        assert_eq!(progress.percent, Some(25.0));
        assert_eq!(progress.speed_bytes_per_sec, None);
        assert_eq!(progress.eta_seconds, None);
    }

    #[test]
    fn ignores_unrelated_lines() {
        assert!(parse_progress_line("[youtube] abc: Downloading webpage").is_none());
        assert!(parse_progress_line("").is_none());
    }

    #[test]
    fn picks_last_error_line() {
        let stderr = "WARNING: slow\nERROR: first\nERROR: [youtube] abc: Video unavailable\n";
        assert_eq!(
            last_error_line(stderr).as_deref(),
            Some("[youtube] abc: Video unavailable")
        );
        assert_eq!(last_error_line("boom\n").as_deref(), Some("boom"));
        assert_eq!(last_error_line(""), None);
    }

    fn request(url: &str, output_dir: &str, playlist: bool) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            directives: compile_directives(&DownloadParameters::new(), None).unwrap(),
            format_id: None,
            output_dir: PathBuf::from(output_dir),
            playlist,
            cancel: CancellationToken::new(),
        }
    }

    #[test]
    fn download_args_layout() {
        let engine = YtDlpEngine::new(EngineConfig::new().with_ffmpeg_location("/opt/ffmpeg"));
        let request = DownloadRequest {
            directives: compile_directives(&DownloadParameters::new(), Some("22")).unwrap(),
            format_id: Some("22".to_string()),
            ..request("https://youtu.be/abc", "/tmp/out", false)
        };
        let args = engine.download_args(&request);

        assert_eq!(args.first().map(String::as_str), Some("--newline"));
        assert!(args.contains(&"--no-playlist".to_string()));
        assert!(args.contains(&"/opt/ffmpeg".to_string()));
        assert!(args.iter().any(|a| a.starts_with("/tmp/out")));
        assert!(args.iter().any(|a| a.starts_with("after_move:[vidbatch-file]")));
        assert!(args.contains(&"-f".to_string()));
        assert_eq!(
            &args[args.len() - 2..],
            &["--".to_string(), "https://youtu.be/abc".to_string()]
        );
    }

    #[test]
    fn playlist_requests_enable_playlists() {
        let engine = YtDlpEngine::default();
        let request = request("https://youtube.com/playlist?list=PL1", ".", true);
        assert!(engine.download_args(&request).contains(&"--yes-playlist".to_string()));
        assert_eq!(engine.program(), Path::new("yt-dlp"));
    }

    #[tokio::test]
    async fn missing_binary_is_reported() {
        let engine = YtDlpEngine::new(
            EngineConfig::new().with_ytdlp_path("/nonexistent/definitely-not-yt-dlp"),
        );
        let err = engine.fetch_metadata("https://youtu.be/abc").await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound { .. }));
    }

    #[tokio::test]
    async fn cancelled_job_aborts_before_spawning() {
        let token = CancellationToken::new();
        token.cancel();
        let engine = YtDlpEngine::new(
            EngineConfig::new().with_ytdlp_path("/nonexistent/definitely-not-yt-dlp"),
        );
        let cancelled = request("https://youtu.be/abc", ".", false).with_cancellation(token);
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            engine.download(&cancelled, tx).await,
            Err(Error::Cancelled)
        ));

        // The next job has its own token and gets as far as spawning.
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(matches!(
            engine.download(&request("https://youtu.be/abc", ".", false), tx).await,
            Err(Error::ToolNotFound { .. })
        ));
    }

    #[cfg(unix)]
    mod fake_binary {
        use super::*;
        use std::os::unix::fs::PermissionsExt;

        /// Installs `script` as the engine executable inside `dir`.
        fn engine_running(dir: &Path, script: &str) -> YtDlpEngine {
            let path = dir.join("fake-yt-dlp");
            std::fs::write(&path, format!("#!/bin/sh\n{script}")).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
            YtDlpEngine::new(EngineConfig::new().with_ytdlp_path(path))
        }

        #[tokio::test]
        async fn undecodable_output_does_not_break_the_download() {
            let dir = tempfile::tempdir().unwrap();
            let engine = engine_running(
                dir.path(),
                r#"printf 'title \377\376 bad\n'
printf '[vidbatch-progress] 512 1024 NA 256.0 2  50.0%%\n'
printf 'warning \377 on stderr\n' >&2
i=0
while [ $i -lt 5000 ]; do
  echo "[download] padding line $i ......................................................"
  i=$((i + 1))
done
echo "[vidbatch-file] /tmp/out.mp4"
exit 0
"#,
            );
            let (tx, mut rx) = mpsc::unbounded_channel();

            let outcome = engine
                .download(&request("https://youtu.be/abc", "/tmp", false), tx)
                .await
                .unwrap();

            assert_eq!(outcome.output, Some(PathBuf::from("/tmp/out.mp4")));
            let update = rx.recv().await.unwrap();
            assert_eq!(update.downloaded_bytes, Some(512));
            assert_eq!(update.percent, Some(50.0));
        }

        #[tokio::test]
        async fn failing_run_reports_the_last_error_line() {
            let dir = tempfile::tempdir().unwrap();
            let engine = engine_running(
                dir.path(),
                "echo 'ERROR: [youtube] abc: Video unavailable' >&2\nexit 1\n",
            );
            let (tx, _rx) = mpsc::unbounded_channel();

            let err = engine
                .download(&request("https://youtu.be/abc", "/tmp", false), tx)
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Engine(msg) if msg == "[youtube] abc: Video unavailable"));
        }

        #[tokio::test]
        async fn cancelling_the_job_kills_the_child() {
            let dir = tempfile::tempdir().unwrap();
            let engine = engine_running(dir.path(), "exec sleep 30\n");
            let job = request("https://youtu.be/abc", "/tmp", false);
            let token = job.cancel.clone();
            let (tx, _rx) = mpsc::unbounded_channel();

            let (result, ()) = tokio::join!(engine.download(&job, tx), async {
                tokio::time::sleep(Duration::from_millis(100)).await;
                token.cancel();
            });

            assert!(matches!(result, Err(Error::Cancelled)));
        }
    }
}
