//! Compiles download parameters into ordered engine directives.

use std::fmt;

use crate::error::{Error, Result};
use crate::params::{DownloadParameters, QualityTarget, Timecode, VideoCodec};

/// One compiled instruction for the external engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Directive {
    /// Video format selection expression.
    SelectVideo(String),
    /// Audio format selection expression.
    SelectAudio(String),
    /// Strip audio from the produced file.
    ///
    /// Runs as a stream copy after download, so it applies even when the
    /// selected format already carries audio and no remux takes place.
    NoAudio,
    /// Merge separate streams into this container.
    MergeContainer(String),
    /// Remux a single video stream into this container.
    RemuxContainer(String),
    /// Rank formats of this codec first.
    PreferCodec(VideoCodec),
    /// Extract the audio track and convert it to this container.
    ExtractAudio(String),
    /// Fetch subtitles, including auto-generated ones.
    FetchSubtitles,
    /// Embed the thumbnail as cover art.
    EmbedThumbnail,
    /// Download only this section. A missing end means the end of the video.
    DownloadSection {
        start: Timecode,
        end: Option<Timecode>,
    },
    /// User-supplied arguments, passed through untouched.
    Raw(String),
}

/// Coarse classification of a [`Directive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirectiveKind {
    VideoQuality,
    AudioSelection,
    NoAudio,
    VideoContainer,
    VideoCodec,
    AudioExtraction,
    Subtitles,
    Thumbnail,
    Section,
    Raw,
}

impl Directive {
    /// Returns the kind of this directive.
    #[must_use]
    pub const fn kind(&self) -> DirectiveKind {
        match self {
            Self::SelectVideo(_) => DirectiveKind::VideoQuality,
            Self::SelectAudio(_) => DirectiveKind::AudioSelection,
            Self::NoAudio => DirectiveKind::NoAudio,
            Self::MergeContainer(_) | Self::RemuxContainer(_) => DirectiveKind::VideoContainer,
            Self::PreferCodec(_) => DirectiveKind::VideoCodec,
            Self::ExtractAudio(_) => DirectiveKind::AudioExtraction,
            Self::FetchSubtitles => DirectiveKind::Subtitles,
            Self::EmbedThumbnail => DirectiveKind::Thumbnail,
            Self::DownloadSection { .. } => DirectiveKind::Section,
            Self::Raw(_) => DirectiveKind::Raw,
        }
    }

    /// Renders the directive as yt-dlp command-line arguments.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::SelectVideo(expr) | Self::SelectAudio(expr) => vec!["-f".into(), expr.clone()],
            Self::NoAudio => vec![
                "--use-postprocessor".into(),
                "FFmpegCopyStream".into(),
                "--postprocessor-args".into(),
                "CopyStream:-an".into(),
            ],
            Self::MergeContainer(c) => vec!["--merge-output-format".into(), c.clone()],
            Self::RemuxContainer(c) => vec!["--remux-video".into(), c.clone()],
            Self::PreferCodec(codec) => codec
                .sort_key()
                .map(|key| vec!["-S".into(), format!("vcodec:{key}")])
                .unwrap_or_default(),
            Self::ExtractAudio(c) => vec!["-x".into(), "--audio-format".into(), c.clone()],
            Self::FetchSubtitles => vec!["--write-subs".into(), "--write-auto-subs".into()],
            Self::EmbedThumbnail => vec!["--embed-thumbnail".into()],
            Self::DownloadSection { start, end } => {
                let end = end.map_or_else(|| "inf".to_string(), |e| e.to_string());
                vec![
                    "--download-sections".into(),
                    format!("*{start}-{end}"),
                    "--force-keyframes-at-cuts".into(),
                ]
            }
            Self::Raw(raw) => raw.split_whitespace().map(str::to_string).collect(),
        }
    }
}

/// Ordered directives ready for the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectiveSet {
    directives: Vec<Directive>,
}

impl DirectiveSet {
    /// Iterates over the directives in order.
    pub fn iter(&self) -> std::slice::Iter<'_, Directive> {
        self.directives.iter()
    }

    /// Number of directives.
    #[must_use]
    pub fn len(&self) -> usize {
        self.directives.len()
    }

    /// Returns `true` if there are no directives.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Returns `true` if any directive is of `kind`.
    #[must_use]
    pub fn contains(&self, kind: DirectiveKind) -> bool {
        self.directives.iter().any(|d| d.kind() == kind)
    }

    /// Flattens every directive into yt-dlp arguments, in order.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        self.directives.iter().flat_map(Directive::to_args).collect()
    }
}

impl<'a> IntoIterator for &'a DirectiveSet {
    type Item = &'a Directive;
    type IntoIter = std::slice::Iter<'a, Directive>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for DirectiveSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_args().join(" "))
    }
}

/// Selection expression for video mode, independent of any resolved format.
fn video_selector(target: QualityTarget, integrated_audio: bool) -> String {
    match (target, integrated_audio) {
        (QualityTarget::Best, true) => "bv*+ba/b".to_string(),
        (QualityTarget::Worst, true) => "wv*+wa/w".to_string(),
        (QualityTarget::ExactHeight(h), true) => format!(
            "bv*[height={h}]+ba/b[height={h}]/bv*[height<={h}]+ba/b[height<={h}]/bv*+ba/b"
        ),
        (QualityTarget::Best, false) => "bv".to_string(),
        (QualityTarget::Worst, false) => "wv".to_string(),
        (QualityTarget::ExactHeight(h), false) => format!("bv[height={h}]/bv[height<={h}]/bv"),
    }
}

/// Validates `parameters` and compiles them into a [`DirectiveSet`].
///
/// When `format_id` is given the selection is pinned to it, with the generic
/// expression kept as a fallback should the engine no longer offer that id.
///
/// # Errors
///
/// Returns [`Error::InvalidParameters`] listing every rule the parameters break.
pub fn compile_directives(
    parameters: &DownloadParameters,
    format_id: Option<&str>,
) -> Result<DirectiveSet> {
    let violations = parameters.violations();
    if !violations.is_empty() {
        return Err(Error::InvalidParameters(violations));
    }

    let mut directives = Vec::new();

    if parameters.extract_audio_only {
        let selector = format_id.map_or_else(|| "ba/b".to_string(), |id| format!("{id}/ba/b"));
        directives.push(Directive::SelectAudio(selector));
        directives.push(Directive::ExtractAudio(
            parameters.audio_container.to_ascii_lowercase(),
        ));
    } else {
        let integrated = parameters.include_integrated_audio;
        let generic = video_selector(parameters.quality_target, integrated);
        let selector = match format_id {
            Some(id) if integrated => format!("{id}[acodec!=none]/{id}+ba/{generic}"),
            Some(id) => format!("{id}/{generic}"),
            None => generic,
        };
        let container = parameters.preferred_container.to_ascii_lowercase();

        directives.push(Directive::SelectVideo(selector));
        if integrated {
            directives.push(Directive::MergeContainer(container));
        } else {
            directives.push(Directive::NoAudio);
            directives.push(Directive::RemuxContainer(container));
        }
        if parameters.preferred_video_codec != VideoCodec::Auto {
            directives.push(Directive::PreferCodec(parameters.preferred_video_codec));
        }
    }

    if parameters.download_subtitles {
        directives.push(Directive::FetchSubtitles);
    }
    if parameters.embed_thumbnail {
        directives.push(Directive::EmbedThumbnail);
    }
    if let Some((start, end)) = parameters.trim_range() {
        directives.push(Directive::DownloadSection { start, end });
    }
    let extra = parameters.extra_directives.trim();
    if !extra.is_empty() {
        directives.push(Directive::Raw(extra.to_string()));
    }

    Ok(DirectiveSet { directives })
}
