//! CLI mode for vidbatch: analyze and download a batch of video URLs.

mod progress;

use std::path::{Path, PathBuf};

use futures::StreamExt;

use crate::{
    AppConfig, BatchOrchestrator, BatchReport, BatchSummary, DownloadParameters, Error,
    MediaEngine, QualityTarget, Timecode, VideoCodec, YtDlpEngine, extract_urls,
};

use progress::{BatchView, make_spinner, print_item_list, print_report, print_summary};

/// Options parsed from the command line.
///
/// Every parameter option is an override on top of the configured defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliArgs {
    /// Raw positional arguments; URLs are extracted from them.
    pub inputs: Vec<String>,
    pub output: Option<PathBuf>,
    pub config: Option<PathBuf>,
    pub audio_only: bool,
    pub audio_format: Option<String>,
    pub quality: Option<QualityTarget>,
    pub container: Option<String>,
    pub codec: Option<VideoCodec>,
    pub no_integrated_audio: bool,
    pub subtitles: bool,
    pub thumbnail: bool,
    pub trim_start: Option<Timecode>,
    pub trim_end: Option<Timecode>,
    pub extra: Option<String>,
}

/// What the command line asks for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliCommand {
    Help,
    Run(CliArgs),
}

impl CliArgs {
    /// Applies the command-line overrides to `defaults`.
    #[must_use]
    pub fn apply_to(&self, defaults: DownloadParameters) -> DownloadParameters {
        let mut params = defaults;
        if let Some(quality) = self.quality {
            params.quality_target = quality;
        }
        if let Some(container) = &self.container {
            params.preferred_container.clone_from(container);
        }
        if let Some(codec) = self.codec {
            params.preferred_video_codec = codec;
        }
        if let Some(format) = &self.audio_format {
            params.audio_container.clone_from(format);
        }
        if self.audio_only {
            params.extract_audio_only = true;
        }
        if self.no_integrated_audio {
            params.include_integrated_audio = false;
        }
        if self.subtitles {
            params.download_subtitles = true;
        }
        if self.thumbnail {
            params.embed_thumbnail = true;
        }
        if self.trim_start.is_some() {
            params.trim_start = self.trim_start;
        }
        if self.trim_end.is_some() {
            params.trim_end = self.trim_end;
        }
        if let Some(extra) = &self.extra {
            params.extra_directives.clone_from(extra);
        }
        params
    }
}

/// Parses command-line arguments (without the program name).
///
/// # Errors
///
/// Returns a message describing the first malformed option.
pub fn parse_args<I>(args: I) -> Result<CliCommand, String>
where
    I: IntoIterator<Item = String>,
{
    let mut parsed = CliArgs::default();
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        let mut value = |name: &str| {
            args.next()
                .ok_or_else(|| format!("{name} requires a value"))
        };
        match arg.as_str() {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-o" | "--output" => parsed.output = Some(PathBuf::from(value(&arg)?)),
            "-c" | "--config" => parsed.config = Some(PathBuf::from(value(&arg)?)),
            "--audio" => parsed.audio_only = true,
            "--audio-format" => parsed.audio_format = Some(value(&arg)?),
            "--quality" => parsed.quality = Some(value(&arg)?.parse()?),
            "--container" => parsed.container = Some(value(&arg)?),
            "--codec" => parsed.codec = Some(value(&arg)?.parse()?),
            "--no-integrated-audio" => parsed.no_integrated_audio = true,
            "--subs" => parsed.subtitles = true,
            "--thumbnail" => parsed.thumbnail = true,
            "--trim-start" => {
                parsed.trim_start = Some(value(&arg)?.parse().map_err(|e| format!("{e}"))?);
            }
            "--trim-end" => {
                parsed.trim_end = Some(value(&arg)?.parse().map_err(|e| format!("{e}"))?);
            }
            "--extra" => parsed.extra = Some(value(&arg)?),
            other if other.starts_with('-') && other.len() > 1 => {
                return Err(format!("unknown option {other}"));
            }
            _ => parsed.inputs.push(arg),
        }
    }

    Ok(CliCommand::Run(parsed))
}

/// Prints usage information to stderr.
pub fn print_usage() {
    eprintln!("Usage: vidbatch [OPTIONS] <url>...");
    eprintln!();
    eprintln!("Arguments:");
    eprintln!("  <url>...                 Video, playlist or channel URLs (any text containing them)");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -o, --output <DIR>       Output directory (default: from config, else .)");
    eprintln!("  -c, --config <FILE>      Configuration file (default: <config dir>/vidbatch/config.toml)");
    eprintln!("      --audio              Extract audio only");
    eprintln!("      --audio-format <F>   Audio container: mp3, m4a, aac, opus, flac, wav, vorbis, alac");
    eprintln!("      --quality <Q>        best, worst or a height such as 720");
    eprintln!("      --container <C>      Video container: mp4, webm, mkv, mov, avi, flv");
    eprintln!("      --codec <C>          auto, h264, h265, vp9 or av1");
    eprintln!("      --no-integrated-audio  Download video without its audio track");
    eprintln!("      --subs               Download subtitles, including auto-generated ones");
    eprintln!("      --thumbnail          Embed the thumbnail");
    eprintln!("      --trim-start <T>     Section start (SS, MM:SS or HH:MM:SS)");
    eprintln!("      --trim-end <T>       Section end");
    eprintln!("      --extra <ARGS>       Extra yt-dlp arguments, appended verbatim");
    eprintln!("  -h, --help               Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  RUST_LOG                 Log filter (default: warn)");
}

/// Runs the CLI batch with the given arguments.
///
/// Returns `true` when every item was analyzed and downloaded.
///
/// # Errors
///
/// Returns an error if the configuration cannot be loaded.
pub async fn run(args: CliArgs) -> crate::Result<bool> {
    let config = match &args.config {
        Some(path) => AppConfig::load_from(path)?,
        None => AppConfig::load()?,
    };
    let parameters = args.apply_to(config.defaults.clone());
    let output_dir = args
        .output
        .clone()
        .unwrap_or_else(|| config.batch.output_dir.clone());

    let urls = extract_urls(&args.inputs.join("\n"));
    if urls.is_empty() {
        println!("No URLs found.");
        return Ok(false);
    }
    log::info!("{} URL(s), output to {}", urls.len(), output_dir.display());
    tokio::fs::create_dir_all(&output_dir).await?;

    let engine = YtDlpEngine::new(config.engine.clone());
    let batch = BatchOrchestrator::with_config(engine, &config.batch);
    let outcome = run_batch(batch, urls, &parameters, &output_dir).await?;
    log::debug!("Progress view printed {} log line(s)", outcome.logged);

    match outcome.report {
        Some(report) => {
            print_report(&report);
            Ok(report.failed.is_empty() && outcome.summary.errors == 0)
        }
        None => {
            println!("Nothing to download.");
            Ok(false)
        }
    }
}

/// What [`run_batch`] produced.
struct BatchRun {
    summary: BatchSummary,
    /// `None` when no item was ready to download.
    report: Option<BatchReport>,
    /// Log lines the progress view printed during the download.
    logged: usize,
}

/// Analyzes `urls` behind a spinner, lists the items, then downloads them
/// with live progress bars.
///
/// The progress view only subscribes once the lists are printed, so nothing
/// else writes to the terminal while they are.
async fn run_batch<E: MediaEngine>(
    mut batch: BatchOrchestrator<E>,
    urls: Vec<String>,
    parameters: &DownloadParameters,
    output_dir: &Path,
) -> crate::Result<BatchRun> {
    let spinner = make_spinner(format!("Analyzing {} URL(s)...", urls.len()));
    let summary = batch.analyze(urls).await;
    spinner.finish_and_clear();
    let summary = summary?;
    print_item_list(batch.items());
    print_summary(&summary);

    let mut events = batch.event_stream();
    let view = tokio::spawn(async move {
        let mut view = BatchView::new();
        while let Some(event) = events.next().await {
            view.handle(&event);
        }
        view.logged()
    });

    let report = match batch.download(parameters, output_dir).await {
        Ok(report) => Some(report),
        Err(Error::NoReadyItems) => None,
        Err(err) => return Err(err),
    };

    // Closing the event channel lets the view drain and exit.
    drop(batch);
    let logged = view.await.unwrap_or_default();

    Ok(BatchRun {
        summary,
        report,
        logged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::combined;
    use crate::job::tests::{MockEngine, metadata};

    const A: &str = "https://example.com/a";
    const B: &str = "https://example.com/b";

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(ToString::to_string).collect()
    }

    fn run_args(list: &[&str]) -> CliArgs {
        match parse_args(args(list)).unwrap() {
            CliCommand::Run(parsed) => parsed,
            CliCommand::Help => panic!("unexpected help"),
        }
    }

    #[test]
    fn parses_every_option() {
        let parsed = run_args(&[
            "-o", "out", "-c", "cfg.toml", "--audio", "--audio-format", "opus", "--quality", "720p",
            "--container", "mkv", "--codec", "vp9", "--no-integrated-audio", "--subs",
            "--thumbnail", "--trim-start", "0:10", "--trim-end", "1:15", "--extra",
            "--limit-rate 1M", "https://youtu.be/a",
        ]);
        assert_eq!(parsed.output, Some(PathBuf::from("out")));
        assert_eq!(parsed.config, Some(PathBuf::from("cfg.toml")));
        assert!(parsed.audio_only);
        assert_eq!(parsed.audio_format.as_deref(), Some("opus"));
        assert_eq!(parsed.quality, Some(QualityTarget::ExactHeight(720)));
        assert_eq!(parsed.container.as_deref(), Some("mkv"));
        assert_eq!(parsed.codec, Some(VideoCodec::Vp9));
        assert!(parsed.no_integrated_audio);
        assert!(parsed.subtitles);
        assert!(parsed.thumbnail);
        assert_eq!(parsed.trim_start, Some(Timecode::from_secs(10)));
        assert_eq!(parsed.trim_end, Some(Timecode::from_secs(75)));
        assert_eq!(parsed.extra.as_deref(), Some("--limit-rate 1M"));
        assert_eq!(parsed.inputs, vec!["https://youtu.be/a"]);
    }

    #[test]
    fn help_wins() {
        assert_eq!(
            parse_args(args(&["https://a", "--help"])).unwrap(),
            CliCommand::Help
        );
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse_args(args(&["--quality", "huge"])).is_err());
        assert!(parse_args(args(&["--codec", "mpeg2"])).is_err());
        assert!(parse_args(args(&["--trim-start", "1:99"])).is_err());
        assert!(parse_args(args(&["--output"])).is_err());
        assert!(parse_args(args(&["--frobnicate"])).is_err());
    }

    #[test]
    fn overrides_apply_on_top_of_defaults() {
        let defaults = DownloadParameters::new()
            .with_container("webm")
            .with_subtitles(true);
        let parsed = run_args(&["--quality", "worst", "--thumbnail"]);
        let params = parsed.apply_to(defaults);

        assert_eq!(params.quality_target, QualityTarget::Worst);
        assert_eq!(params.preferred_container, "webm");
        assert!(params.download_subtitles);
        assert!(params.embed_thumbnail);
        assert!(!params.extract_audio_only);
    }

    #[tokio::test]
    async fn progress_view_only_shows_the_download_phase() {
        let engine = MockEngine::default().with_video(B, metadata("b", vec![combined("18", 360, "mp4")]));
        let batch = BatchOrchestrator::new(engine);

        let run = run_batch(
            batch,
            vec![A.to_string(), B.to_string()],
            &DownloadParameters::new(),
            Path::new("/tmp"),
        )
        .await
        .unwrap();

        assert_eq!(run.summary.errors, 1);
        assert_eq!(run.report.unwrap().completed.len(), 1);
        // "Downloaded b" and "Batch finished"; analysis lines went to the item list.
        assert_eq!(run.logged, 2);
    }

    #[tokio::test]
    async fn nothing_ready_skips_the_download() {
        let batch = BatchOrchestrator::new(MockEngine::default());
        let run = run_batch(batch, vec![A.to_string()], &DownloadParameters::new(), Path::new("/tmp"))
            .await
            .unwrap();
        assert!(run.report.is_none());
        assert_eq!(run.logged, 0);
    }

    #[test]
    fn no_overrides_keep_defaults() {
        let defaults = DownloadParameters::new().with_audio_only("flac");
        assert_eq!(CliArgs::default().apply_to(defaults.clone()), defaults);
    }
}
