//! Picks one concrete format that best satisfies a set of download parameters.

use crate::catalog::{FormatCatalog, FormatDescriptor};
use crate::error::{Error, Result};
use crate::params::{DownloadParameters, QualityTarget, VideoCodec};

/// Selects the single best format for `parameters` from `catalog`.
///
/// Container and codec preferences are soft: they narrow the candidates only
/// when at least one candidate satisfies them. The result is a pure function
/// of its inputs.
///
/// # Errors
///
/// Returns [`Error::NoFormatAvailable`] when the catalog holds nothing of the
/// requested media type.
pub fn resolve_format<'a>(
    parameters: &DownloadParameters,
    catalog: &'a FormatCatalog,
) -> Result<&'a FormatDescriptor> {
    if parameters.extract_audio_only {
        return resolve_audio(catalog);
    }

    let pool = candidate_pool(catalog, parameters.include_integrated_audio);
    let pool = soft_filter(pool, |d| {
        d.container
            .eq_ignore_ascii_case(&parameters.preferred_container)
    });
    let pool = match parameters.preferred_video_codec {
        VideoCodec::Auto => pool,
        codec => soft_filter(pool, |d| d.video_codec().is_some_and(|c| codec.matches(c))),
    };

    pick_quality(&pool, parameters.quality_target).ok_or(Error::NoFormatAvailable)
}

/// Highest-bitrate audio-only stream, falling back to the audio inside a combined format.
fn resolve_audio(catalog: &FormatCatalog) -> Result<&FormatDescriptor> {
    best_bitrate(catalog.audio_only())
        .or_else(|| best_bitrate(catalog.combined()))
        .ok_or(Error::NoFormatAvailable)
}

fn best_bitrate(formats: &[FormatDescriptor]) -> Option<&FormatDescriptor> {
    // `max_by` keeps the last maximum, so reverse to let catalog order break ties.
    formats.iter().rev().max_by(|a, b| {
        a.audio_bitrate_kbps
            .unwrap_or(0.0)
            .total_cmp(&b.audio_bitrate_kbps.unwrap_or(0.0))
    })
}

fn candidate_pool(catalog: &FormatCatalog, integrated_audio: bool) -> Vec<&FormatDescriptor> {
    let (preferred, fallback) = if integrated_audio {
        (catalog.combined(), catalog.video_only())
    } else {
        (catalog.video_only(), catalog.combined())
    };
    let source = if preferred.is_empty() {
        fallback
    } else {
        preferred
    };
    source.iter().collect()
}

fn soft_filter<'a>(
    pool: Vec<&'a FormatDescriptor>,
    keep: impl Fn(&FormatDescriptor) -> bool,
) -> Vec<&'a FormatDescriptor> {
    if pool.iter().any(|d| keep(d)) {
        pool.into_iter().filter(|d| keep(d)).collect()
    } else {
        pool
    }
}

fn pick_quality<'a>(
    pool: &[&'a FormatDescriptor],
    target: QualityTarget,
) -> Option<&'a FormatDescriptor> {
    match target {
        QualityTarget::Best => pool.first().copied(),
        QualityTarget::Worst => pool.last().copied(),
        QualityTarget::ExactHeight(px) => pool
            .iter()
            .find(|d| d.height_px == Some(px))
            .or_else(|| {
                // `min_by_key` keeps the first minimum, i.e. the taller candidate.
                pool.iter()
                    .min_by_key(|d| d.height_px.map_or(u32::MAX, |h| h.abs_diff(px)))
            })
            .copied(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::tests::{audio, combined, video};

    fn catalog(formats: Vec<FormatDescriptor>) -> FormatCatalog {
        FormatCatalog::classify(formats).unwrap()
    }

    #[test]
    fn exact_height_tie_goes_to_the_taller_format() {
        let catalog = catalog(vec![combined("720", 720, "mp4"), combined("1440", 1440, "mp4")]);
        let params = DownloadParameters::new().with_quality(QualityTarget::ExactHeight(1080));
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "1440");
    }

    #[test]
    fn exact_height_prefers_an_exact_match() {
        let catalog = catalog(vec![
            combined("1080", 1080, "mp4"),
            combined("720", 720, "mp4"),
            combined("480", 480, "mp4"),
        ]);
        let params = DownloadParameters::new().with_quality(QualityTarget::ExactHeight(720));
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "720");
    }

    #[test]
    fn exact_height_picks_the_closest() {
        let catalog = catalog(vec![combined("1080", 1080, "mp4"), combined("360", 360, "mp4")]);
        let params = DownloadParameters::new().with_quality(QualityTarget::ExactHeight(900));
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "1080");
    }

    #[test]
    fn best_and_worst_take_the_ends_of_the_ranking() {
        let catalog = catalog(vec![
            combined("360", 360, "mp4"),
            combined("1080", 1080, "mp4"),
            combined("720", 720, "mp4"),
        ]);
        let best = DownloadParameters::new();
        let worst = DownloadParameters::new().with_quality(QualityTarget::Worst);
        assert_eq!(resolve_format(&best, &catalog).unwrap().id, "1080");
        assert_eq!(resolve_format(&worst, &catalog).unwrap().id, "360");
    }

    #[test]
    fn container_preference_is_soft() {
        let catalog = catalog(vec![combined("webm", 1080, "webm"), combined("mp4", 720, "mp4")]);
        let mp4 = DownloadParameters::new().with_container("mp4");
        assert_eq!(resolve_format(&mp4, &catalog).unwrap().id, "mp4");

        let mkv = DownloadParameters::new().with_container("mkv");
        assert_eq!(resolve_format(&mkv, &catalog).unwrap().id, "webm");
    }

    #[test]
    fn codec_preference_is_soft() {
        let catalog = catalog(vec![
            video("vp9", 1080, "vp9", "webm"),
            video("avc", 720, "avc1.4d401f", "mp4"),
        ]);
        let h264 = DownloadParameters::new()
            .with_integrated_audio(false)
            .with_container("mkv")
            .with_codec(VideoCodec::H264);
        assert_eq!(resolve_format(&h264, &catalog).unwrap().id, "avc");

        let av1 = h264.clone().with_codec(VideoCodec::Av1);
        assert_eq!(resolve_format(&av1, &catalog).unwrap().id, "vp9");
    }

    #[test]
    fn video_only_request_falls_back_to_combined() {
        let catalog = catalog(vec![combined("18", 360, "mp4"), audio("140", 128.0, "m4a")]);
        let params = DownloadParameters::new().with_integrated_audio(false);
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "18");
    }

    #[test]
    fn integrated_request_falls_back_to_video_only() {
        let catalog = catalog(vec![video("137", 1080, "avc1", "mp4"), audio("140", 128.0, "m4a")]);
        let params = DownloadParameters::new();
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "137");
    }

    #[test]
    fn audio_only_picks_highest_bitrate() {
        let catalog = catalog(vec![
            audio("139", 48.0, "m4a"),
            audio("251", 160.0, "webm"),
            combined("22", 720, "mp4"),
        ]);
        let params = DownloadParameters::new().with_audio_only("mp3");
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "251");
    }

    #[test]
    fn audio_only_falls_back_to_combined_audio() {
        let mut rich = combined("rich", 360, "mp4");
        rich.audio_bitrate_kbps = Some(192.0);
        let catalog = catalog(vec![combined("22", 720, "mp4"), rich]);
        let params = DownloadParameters::new().with_audio_only("m4a");
        assert_eq!(resolve_format(&params, &catalog).unwrap().id, "rich");
    }

    #[test]
    fn audio_only_without_audio_is_unavailable() {
        let catalog = catalog(vec![video("137", 1080, "avc1", "mp4")]);
        let params = DownloadParameters::new().with_audio_only("mp3");
        assert!(matches!(
            resolve_format(&params, &catalog),
            Err(Error::NoFormatAvailable)
        ));
    }

    #[test]
    fn video_request_against_audio_catalog_is_unavailable() {
        let catalog = catalog(vec![audio("140", 128.0, "m4a")]);
        assert!(matches!(
            resolve_format(&DownloadParameters::new(), &catalog),
            Err(Error::NoFormatAvailable)
        ));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        fn arb_format() -> impl Strategy<Value = FormatDescriptor> {
            (
                0usize..3,
                proptest::option::of(144u32..2160),
                proptest::option::of(32.0f64..320.0),
                prop_oneof![Just("mp4"), Just("webm")],
            )
                .prop_map(|(kind, height, abr, container)| FormatDescriptor {
                    id: String::new(),
                    container: container.to_string(),
                    video_codec: Some(if kind == 2 { "none" } else { "avc1" }.to_string()),
                    audio_codec: Some(if kind == 1 { "none" } else { "opus" }.to_string()),
                    height_px: height,
                    audio_bitrate_kbps: abr,
                    file_size_bytes: None,
                    frame_rate: None,
                })
        }

        fn arb_quality() -> impl Strategy<Value = QualityTarget> {
            prop_oneof![
                Just(QualityTarget::Best),
                Just(QualityTarget::Worst),
                (144u32..2160).prop_map(QualityTarget::ExactHeight),
            ]
        }

        proptest! {
            #[test]
            fn resolution_is_deterministic(
                mut formats in proptest::collection::vec(arb_format(), 1..20),
                quality in arb_quality(),
                audio_only in any::<bool>(),
                integrated in any::<bool>(),
            ) {
                for (i, f) in formats.iter_mut().enumerate() {
                    f.id = format!("f{i}");
                }
                let mut params = DownloadParameters::new()
                    .with_quality(quality)
                    .with_integrated_audio(integrated);
                params.extract_audio_only = audio_only;

                let first = FormatCatalog::classify(formats.clone()).unwrap();
                let second = FormatCatalog::classify(formats).unwrap();
                let a = resolve_format(&params, &first).map(|d| d.id.clone()).ok();
                let b = resolve_format(&params, &second).map(|d| d.id.clone()).ok();
                prop_assert_eq!(a, b);
            }
        }
    }
}
