//! Declarative download parameters shared by single and batch downloads.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ParameterViolation;

/// Containers a video download may be merged or remuxed into.
pub const VIDEO_CONTAINERS: &[&str] = &["mp4", "webm", "mkv", "mov", "avi", "flv"];

/// Formats extracted audio may be converted into.
pub const AUDIO_CONTAINERS: &[&str] = &["mp3", "m4a", "aac", "opus", "flac", "wav", "vorbis", "alac"];

/// Returns `true` if `name` is a known video container (case-insensitive).
#[must_use]
pub fn is_known_video_container(name: &str) -> bool {
    VIDEO_CONTAINERS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Returns `true` if `name` is a known audio container (case-insensitive).
#[must_use]
pub fn is_known_audio_container(name: &str) -> bool {
    AUDIO_CONTAINERS.iter().any(|c| c.eq_ignore_ascii_case(name))
}

/// Which quality the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTarget {
    /// Highest ranked format.
    #[default]
    Best,
    /// Lowest ranked format.
    Worst,
    /// A specific frame height, or the closest one available.
    ExactHeight(u32),
}

impl FromStr for QualityTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "best" => Ok(Self::Best),
            "worst" => Ok(Self::Worst),
            other => other
                .trim_end_matches('p')
                .parse::<u32>()
                .map(Self::ExactHeight)
                .map_err(|_| format!("unknown quality {s:?} (expected best, worst or a height)")),
        }
    }
}

/// Preferred video codec family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VideoCodec {
    /// No preference.
    #[default]
    Auto,
    /// H.264 / AVC.
    H264,
    /// H.265 / HEVC.
    H265,
    /// VP9.
    Vp9,
    /// AV1.
    Av1,
}

impl VideoCodec {
    /// Returns `true` if a raw codec string reported by the engine belongs to this family.
    ///
    /// `Auto` matches every codec.
    #[must_use]
    pub fn matches(self, codec: &str) -> bool {
        let codec = codec.to_ascii_lowercase();
        match self {
            Self::Auto => true,
            Self::H264 => codec.starts_with("avc") || codec.starts_with("h264"),
            Self::H265 => {
                codec.starts_with("hvc") || codec.starts_with("hev") || codec.starts_with("h265")
            }
            Self::Vp9 => codec.starts_with("vp9") || codec.starts_with("vp09"),
            Self::Av1 => codec.starts_with("av01") || codec.starts_with("av1"),
        }
    }

    /// The codec name understood by the engine's format sorter.
    #[must_use]
    pub const fn sort_key(self) -> Option<&'static str> {
        match self {
            Self::Auto => None,
            Self::H264 => Some("h264"),
            Self::H265 => Some("h265"),
            Self::Vp9 => Some("vp9"),
            Self::Av1 => Some("av01"),
        }
    }
}

impl FromStr for VideoCodec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "h264" | "avc" | "avc1" => Ok(Self::H264),
            "h265" | "hevc" => Ok(Self::H265),
            "vp9" => Ok(Self::Vp9),
            "av1" | "av01" => Ok(Self::Av1),
            other => Err(format!("unknown codec {other:?}")),
        }
    }
}

/// A point in a video, stored with millisecond precision.
///
/// Parses `SS`, `MM:SS` and `HH:MM:SS`, each with optional fractional seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timecode {
    millis: u64,
}

impl Timecode {
    /// The start of the video.
    pub const ZERO: Self = Self { millis: 0 };

    /// Creates a timecode from whole seconds, saturating at `u64::MAX` milliseconds.
    #[must_use]
    pub const fn from_secs(secs: u64) -> Self {
        Self {
            millis: secs.saturating_mul(1000),
        }
    }

    /// Creates a timecode from milliseconds.
    #[must_use]
    pub const fn from_millis(millis: u64) -> Self {
        Self { millis }
    }

    /// Milliseconds since the start of the video.
    #[must_use]
    pub const fn as_millis(self) -> u64 {
        self.millis
    }
}

fn parse_whole(part: &str) -> Option<u64> {
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

/// Parses `SS` or `SS.fff` into milliseconds.
fn parse_seconds(part: &str) -> Option<u64> {
    let (whole, fraction) = part.split_once('.').unwrap_or((part, ""));
    let secs = parse_whole(whole)?;
    let millis = if fraction.is_empty() {
        0
    } else {
        if !fraction.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits: String = fraction.chars().chain("000".chars()).take(3).collect();
        digits.parse::<u64>().ok()?
    };
    secs.checked_mul(1000)?.checked_add(millis)
}

/// Combines clock components into milliseconds, `None` on overflow.
fn clock_millis(hours: u64, mins: u64, secs_millis: u64) -> Option<u64> {
    hours
        .checked_mul(3_600_000)?
        .checked_add(mins.checked_mul(60_000)?)?
        .checked_add(secs_millis)
}

impl FromStr for Timecode {
    type Err = ParameterViolation;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ParameterViolation::MalformedTimecode(s.to_string());
        let parts: Vec<&str> = s.trim().split(':').collect();
        let millis = match parts.as_slice() {
            [secs] => parse_seconds(secs),
            [mins, secs] => {
                let secs = parse_seconds(secs).filter(|ms| *ms < 60_000);
                parse_whole(mins)
                    .zip(secs)
                    .and_then(|(m, s)| clock_millis(0, m, s))
            }
            [hours, mins, secs] => {
                let mins = parse_whole(mins).filter(|m| *m < 60);
                let secs = parse_seconds(secs).filter(|ms| *ms < 60_000);
                match (parse_whole(hours), mins, secs) {
                    (Some(h), Some(m), Some(s)) => clock_millis(h, m, s),
                    _ => None,
                }
            }
            _ => None,
        };
        millis.map(Self::from_millis).ok_or_else(malformed)
    }
}

impl TryFrom<String> for Timecode {
    type Error = ParameterViolation;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timecode> for String {
    fn from(value: Timecode) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Timecode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total_secs = self.millis / 1000;
        let millis = self.millis % 1000;
        write!(
            f,
            "{:02}:{:02}:{:02}",
            total_secs / 3600,
            (total_secs % 3600) / 60,
            total_secs % 60
        )?;
        if millis > 0 {
            write!(f, ".{millis:03}")?;
        }
        Ok(())
    }
}

/// A user's declarative download request.
///
/// The same value is used for a single download or applied uniformly to every
/// item of a batch. It records intent only: options that do not apply in the
/// chosen mode are ignored at compile time rather than rewritten here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadParameters {
    pub quality_target: QualityTarget,
    pub preferred_container: String,
    pub extract_audio_only: bool,
    pub audio_container: String,
    /// Ignored when `extract_audio_only` is set.
    pub include_integrated_audio: bool,
    pub preferred_video_codec: VideoCodec,
    pub download_subtitles: bool,
    pub embed_thumbnail: bool,
    pub trim_start: Option<Timecode>,
    pub trim_end: Option<Timecode>,
    /// Passed to the engine verbatim after every structured directive.
    pub extra_directives: String,
}

impl Default for DownloadParameters {
    fn default() -> Self {
        Self {
            quality_target: QualityTarget::Best,
            preferred_container: "mp4".to_string(),
            extract_audio_only: false,
            audio_container: "mp3".to_string(),
            include_integrated_audio: true,
            preferred_video_codec: VideoCodec::Auto,
            download_subtitles: false,
            embed_thumbnail: false,
            trim_start: None,
            trim_end: None,
            extra_directives: String::new(),
        }
    }
}

impl DownloadParameters {
    /// Creates parameters with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the quality target.
    #[must_use]
    pub const fn with_quality(mut self, quality: QualityTarget) -> Self {
        self.quality_target = quality;
        self
    }

    /// Sets the preferred video container.
    #[must_use]
    pub fn with_container(mut self, container: impl Into<String>) -> Self {
        self.preferred_container = container.into();
        self
    }

    /// Switches to audio extraction into `container`.
    #[must_use]
    pub fn with_audio_only(mut self, container: impl Into<String>) -> Self {
        self.extract_audio_only = true;
        self.audio_container = container.into();
        self
    }

    /// Sets whether the video should carry its audio track.
    #[must_use]
    pub const fn with_integrated_audio(mut self, include: bool) -> Self {
        self.include_integrated_audio = include;
        self
    }

    /// Sets the preferred video codec.
    #[must_use]
    pub const fn with_codec(mut self, codec: VideoCodec) -> Self {
        self.preferred_video_codec = codec;
        self
    }

    /// Sets whether subtitles are fetched.
    #[must_use]
    pub const fn with_subtitles(mut self, subtitles: bool) -> Self {
        self.download_subtitles = subtitles;
        self
    }

    /// Sets whether the thumbnail is embedded.
    #[must_use]
    pub const fn with_thumbnail(mut self, thumbnail: bool) -> Self {
        self.embed_thumbnail = thumbnail;
        self
    }

    /// Restricts the download to a section of the video.
    #[must_use]
    pub const fn with_trim(mut self, start: Option<Timecode>, end: Option<Timecode>) -> Self {
        self.trim_start = start;
        self.trim_end = end;
        self
    }

    /// Sets the raw directives appended after everything else.
    #[must_use]
    pub fn with_extra(mut self, extra: impl Into<String>) -> Self {
        self.extra_directives = extra.into();
        self
    }

    /// Returns the requested section as `(start, end)`, if any trim is set.
    ///
    /// A missing start means the beginning of the video; a missing end means
    /// the end of it.
    #[must_use]
    pub fn trim_range(&self) -> Option<(Timecode, Option<Timecode>)> {
        match (self.trim_start, self.trim_end) {
            (None, None) => None,
            (start, end) => Some((start.unwrap_or(Timecode::ZERO), end)),
        }
    }

    /// Lists every consistency rule these parameters break.
    #[must_use]
    pub fn violations(&self) -> Vec<ParameterViolation> {
        let mut violations = Vec::new();

        if let Some((start, Some(end))) = self.trim_range()
            && end < start
        {
            violations.push(ParameterViolation::TrimEndBeforeStart {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        if !is_known_audio_container(&self.audio_container) {
            violations.push(ParameterViolation::UnknownAudioContainer(
                self.audio_container.clone(),
            ));
        }
        if !is_known_video_container(&self.preferred_container) {
            violations.push(ParameterViolation::UnknownVideoContainer(
                self.preferred_container.clone(),
            ));
        }

        violations
    }
}
