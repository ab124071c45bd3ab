//! Format descriptors and their classification into a queryable catalog.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One concrete encoding offered by the source platform for a video.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Identifier, unique within one video.
    pub id: String,
    /// File container, e.g. `"mp4"`.
    pub container: String,
    /// Video codec; `"none"` or empty means there is no video stream.
    pub video_codec: Option<String>,
    /// Audio codec; `"none"` or empty means there is no audio stream.
    pub audio_codec: Option<String>,
    pub height_px: Option<u32>,
    pub audio_bitrate_kbps: Option<f64>,
    pub file_size_bytes: Option<u64>,
    pub frame_rate: Option<f64>,
}

fn codec_present(codec: Option<&str>) -> bool {
    codec.is_some_and(|c| !c.is_empty() && !c.eq_ignore_ascii_case("none"))
}

impl FormatDescriptor {
    /// Creates a descriptor with just an id and a container.
    #[must_use]
    pub fn new(id: impl Into<String>, container: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            container: container.into(),
            ..Self::default()
        }
    }

    /// Returns `true` if the descriptor carries a video stream.
    #[must_use]
    pub fn has_video(&self) -> bool {
        codec_present(self.video_codec.as_deref())
    }

    /// Returns `true` if the descriptor carries an audio stream.
    #[must_use]
    pub fn has_audio(&self) -> bool {
        codec_present(self.audio_codec.as_deref())
    }

    /// Returns the video codec unless it is the `"none"` sentinel.
    #[must_use]
    pub fn video_codec(&self) -> Option<&str> {
        self.video_codec.as_deref().filter(|_| self.has_video())
    }

    /// Returns the audio codec unless it is the `"none"` sentinel.
    #[must_use]
    pub fn audio_codec(&self) -> Option<&str> {
        self.audio_codec.as_deref().filter(|_| self.has_audio())
    }
}

/// Quality ordering used by every catalog list: higher ranks first.
///
/// Height, then audio bitrate, then file size. A descriptor that reports a
/// value outranks one that does not, which keeps the order total.
fn quality_order(a: &FormatDescriptor, b: &FormatDescriptor) -> Ordering {
    fn option_cmp<T>(a: Option<T>, b: Option<T>, cmp: impl Fn(&T, &T) -> Ordering) -> Ordering {
        match (a, b) {
            (Some(a), Some(b)) => cmp(&a, &b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        }
    }

    option_cmp(a.height_px, b.height_px, Ord::cmp)
        .then_with(|| option_cmp(a.audio_bitrate_kbps, b.audio_bitrate_kbps, f64::total_cmp))
        .then_with(|| option_cmp(a.file_size_bytes, b.file_size_bytes, Ord::cmp))
        .reverse()
}

/// A video's formats split by stream composition and ranked by quality.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormatCatalog {
    combined: Vec<FormatDescriptor>,
    video_only: Vec<FormatDescriptor>,
    audio_only: Vec<FormatDescriptor>,
    heights: Vec<u32>,
}

impl FormatCatalog {
    /// Partitions descriptors into combined, video-only and audio-only lists.
    ///
    /// Descriptors with neither stream are dropped. Each list is ranked best
    /// first; equal descriptors keep their input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyCatalog`] when `descriptors` is empty.
    pub fn classify(descriptors: Vec<FormatDescriptor>) -> Result<Self> {
        if descriptors.is_empty() {
            return Err(Error::EmptyCatalog);
        }

        let mut heights: Vec<u32> = descriptors.iter().filter_map(|d| d.height_px).collect();
        heights.sort_unstable_by(|a, b| b.cmp(a));
        heights.dedup();

        let mut catalog = Self {
            heights,
            ..Self::default()
        };
        for descriptor in descriptors {
            match (descriptor.has_video(), descriptor.has_audio()) {
                (true, true) => catalog.combined.push(descriptor),
                (true, false) => catalog.video_only.push(descriptor),
                (false, true) => catalog.audio_only.push(descriptor),
                (false, false) => {
                    log::debug!("Dropping format {} with no streams", descriptor.id);
                }
            }
        }

        catalog.combined.sort_by(quality_order);
        catalog.video_only.sort_by(quality_order);
        catalog.audio_only.sort_by(quality_order);

        Ok(catalog)
    }

    /// Formats carrying both video and audio, best first.
    #[must_use]
    pub fn combined(&self) -> &[FormatDescriptor] {
        &self.combined
    }

    /// Formats carrying only video, best first.
    #[must_use]
    pub fn video_only(&self) -> &[FormatDescriptor] {
        &self.video_only
    }

    /// Formats carrying only audio, best first.
    #[must_use]
    pub fn audio_only(&self) -> &[FormatDescriptor] {
        &self.audio_only
    }

    /// Every distinct height reported by any format, tallest first.
    #[must_use]
    pub fn available_heights(&self) -> &[u32] {
        &self.heights
    }

    /// Number of classified (usable) formats.
    #[must_use]
    pub fn len(&self) -> usize {
        self.combined.len() + self.video_only.len() + self.audio_only.len()
    }

    /// Returns `true` if no usable format survived classification.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a format up by id across all lists.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&FormatDescriptor> {
        self.combined
            .iter()
            .chain(&self.video_only)
            .chain(&self.audio_only)
            .find(|d| d.id == id)
    }
}
