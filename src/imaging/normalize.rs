//! The normalization pipeline.
//!
//! Combines the pure calculations with codec execution:
//!
//! ```text
//! declared type ──► accepted? ──► decode ──► fit_within ──► resize? ──► encode @ q
//!                      │             │                                   │
//!                UnsupportedType   Decode                 over budget and q > floor?
//!                                                           └── yes: q -= step, re-encode
//! ```
//!
//! Nothing here allocates preview handles; that is the job of
//! [`Normalizer`](crate::normalizer::Normalizer), which wraps [`normalize`]
//! with a [`PreviewStore`](crate::preview::PreviewStore).

use super::calculations::fit_within;
use super::codec::{CodecError, Dimensions, RasterCodec};
use super::params::{Limits, Quality, QualitySchedule};
use crate::media::{AcceptedTypes, MediaType, TargetEncoding};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum NormalizeError {
    /// Declared type is unknown or not in the accepted set. No decode was attempted.
    #[error("unsupported image type: {0:?}")]
    UnsupportedType(String),
    /// The payload could not be decoded as a raster of the declared type.
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("could not encode image: {0}")]
    Encode(String),
    /// The task running the normalization was cancelled before it finished.
    #[error("normalization interrupted: {0}")]
    Interrupted(String),
}

impl From<CodecError> for NormalizeError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Decode(msg) => Self::Decode(msg),
            CodecError::Encode(msg) => Self::Encode(msg),
        }
    }
}

pub type Result<T> = std::result::Result<T, NormalizeError>;

/// Raw upload as handed over by the file-selection flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub bytes: Vec<u8>,
    pub declared_type: String,
}

impl SourceImage {
    pub fn new(bytes: impl Into<Vec<u8>>, declared_type: impl Into<String>) -> Self {
        Self {
            bytes: bytes.into(),
            declared_type: declared_type.into(),
        }
    }
}

/// Everything [`normalize`] needs to know besides the image itself.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NormalizeSettings {
    pub limits: Limits,
    pub schedule: QualitySchedule,
    pub accepted: AcceptedTypes,
    pub target: TargetEncoding,
}

/// One pass through the encoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct EncodeAttempt {
    pub quality: Quality,
    pub size: usize,
}

/// Output of [`normalize`] before a preview handle is attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub source_type: MediaType,
    pub source_dimensions: Dimensions,
    pub encoding: TargetEncoding,
    /// Quality of the returned payload (the last attempt).
    pub quality: Quality,
    /// Every encode in the order performed; never empty.
    pub attempts: Vec<EncodeAttempt>,
    /// `false` when even the floor quality exceeded the byte budget.
    pub within_budget: bool,
}

/// Check the declared type against the accepted set.
pub fn check_type(declared_type: &str, accepted: &AcceptedTypes) -> Result<MediaType> {
    accepted
        .resolve(declared_type)
        .ok_or_else(|| NormalizeError::UnsupportedType(declared_type.to_string()))
}

/// Type-check and decode without encoding; returns the source dimensions.
pub fn inspect<C: RasterCodec>(
    codec: &C,
    source: &SourceImage,
    accepted: &AcceptedTypes,
) -> Result<Dimensions> {
    let media_type = check_type(&source.declared_type, accepted)?;
    let raster = codec.decode(&source.bytes, media_type)?;
    Ok(codec.dimensions(&raster))
}

/// Resize and re-encode `source` so it fits the configured limits.
///
/// The output is always re-encoded in `settings.target`, even when the
/// source already satisfies every limit. If no quality in the schedule
/// brings the payload under `max_bytes`, the floor-quality payload is
/// returned with `within_budget == false`.
pub fn normalize<C: RasterCodec>(
    codec: &C,
    source: &SourceImage,
    settings: &NormalizeSettings,
) -> Result<Encoded> {
    let media_type = check_type(&source.declared_type, &settings.accepted)?;

    let raster = codec.decode(&source.bytes, media_type)?;
    let source_dimensions = codec.dimensions(&raster);

    let limits = &settings.limits;
    let (width, height) = fit_within(
        source_dimensions.as_tuple(),
        (limits.max_width, limits.max_height),
    );
    let raster = if (width, height) == source_dimensions.as_tuple() {
        raster
    } else {
        debug!(
            from = format!("{}x{}", source_dimensions.width, source_dimensions.height),
            to = format!("{width}x{height}"),
            "Downscaling to fit bounds"
        );
        codec.resize(&raster, width, height)
    };

    let mut attempts = Vec::new();
    let mut best: Option<(Quality, Vec<u8>)> = None;
    for quality in settings.schedule.qualities() {
        let bytes = codec.encode(&raster, settings.target, quality)?;
        debug!(
            quality = %quality,
            size = bytes.len(),
            budget = limits.max_bytes,
            "Encoded candidate"
        );
        attempts.push(EncodeAttempt {
            quality,
            size: bytes.len(),
        });
        let fits = bytes.len() <= limits.max_bytes;
        best = Some((quality, bytes));
        if fits {
            break;
        }
    }

    let Some((quality, bytes)) = best else {
        // qualities() always yields the initial quality
        return Err(NormalizeError::Encode("empty quality schedule".into()));
    };
    let within_budget = bytes.len() <= limits.max_bytes;
    if !within_budget {
        warn!(
            size = bytes.len(),
            budget = limits.max_bytes,
            floor = %quality,
            "Byte budget not met at quality floor; returning best effort"
        );
    }

    Ok(Encoded {
        bytes,
        width,
        height,
        source_type: media_type,
        source_dimensions,
        encoding: settings.target,
        quality,
        attempts,
        within_budget,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::codec::tests::{MockCodec, RecordedOp, synthetic_image};

    fn settings() -> NormalizeSettings {
        NormalizeSettings::default()
    }

    fn source(width: u32, height: u32) -> SourceImage {
        SourceImage::new(synthetic_image(width, height), "image/png")
    }

    #[test]
    fn unsupported_type_does_no_decode_work() {
        let codec = MockCodec::new();
        let src = SourceImage::new(synthetic_image(10, 10), "image/tiff");

        let err = normalize(&codec, &src, &settings()).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedType(t) if t == "image/tiff"));
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn type_outside_configured_set_is_rejected() {
        let codec = MockCodec::new();
        let settings = NormalizeSettings {
            accepted: AcceptedTypes::new([MediaType::Jpeg]),
            ..settings()
        };

        let err = normalize(&codec, &source(10, 10), &settings).unwrap_err();
        assert!(matches!(err, NormalizeError::UnsupportedType(_)));
        assert!(codec.get_operations().is_empty());
    }

    #[test]
    fn corrupt_bytes_fail_with_decode_error() {
        let codec = MockCodec::new();
        let src = SourceImage::new(b"garbage".to_vec(), "image/jpeg");

        let err = normalize(&codec, &src, &settings()).unwrap_err();
        assert!(matches!(err, NormalizeError::Decode(_)));
        // Decoded once, never retried, nothing encoded
        assert_eq!(
            codec.get_operations(),
            vec![RecordedOp::Decode(MediaType::Jpeg)]
        );
    }

    #[test]
    fn small_image_keeps_dimensions_and_skips_resize() {
        let codec = MockCodec::new();

        let out = normalize(&codec, &source(200, 150), &settings()).unwrap();
        assert_eq!((out.width, out.height), (200, 150));
        assert!(
            !codec
                .get_operations()
                .iter()
                .any(|op| matches!(op, RecordedOp::Resize { .. }))
        );
    }

    #[test]
    fn oversized_image_is_downscaled_preserving_aspect() {
        let codec = MockCodec::new();

        let out = normalize(&codec, &source(4000, 2000), &settings()).unwrap();
        assert_eq!((out.width, out.height), (1920, 960));
        assert_eq!(out.source_dimensions, Dimensions::new(4000, 2000));
        assert!(codec.get_operations().contains(&RecordedOp::Resize {
            width: 1920,
            height: 960
        }));
    }

    #[test]
    fn under_budget_at_first_quality_encodes_once() {
        let codec = MockCodec::with_size(500_000);

        let out = normalize(&codec, &source(800, 600), &settings()).unwrap();
        assert_eq!(codec.encoded_qualities(), vec![90]);
        assert_eq!(out.quality, Quality::new(90));
        assert_eq!(out.attempts.len(), 1);
        assert!(out.within_budget);
    }

    #[test]
    fn steps_down_until_budget_met() {
        let mb = 1024 * 1024;
        let codec = MockCodec::with_sizes(&[(90, 3 * mb), (80, 2 * mb), (70, mb + 1), (60, mb)], 1);

        let out = normalize(&codec, &source(1000, 1000), &settings()).unwrap();
        assert_eq!(codec.encoded_qualities(), vec![90, 80, 70, 60]);
        assert_eq!(out.quality, Quality::new(60));
        assert_eq!(out.bytes.len(), mb);
        assert!(out.within_budget);
        let sizes: Vec<usize> = out.attempts.iter().map(|a| a.size).collect();
        assert_eq!(sizes, vec![3 * mb, 2 * mb, mb + 1, mb]);
    }

    #[test]
    fn floor_result_returned_when_budget_unreachable() {
        let codec = MockCodec::with_size(5 * 1024 * 1024);

        let out = normalize(&codec, &source(1000, 1000), &settings()).unwrap();
        assert_eq!(codec.encoded_qualities(), vec![90, 80, 70, 60, 50]);
        assert_eq!(out.quality, Quality::new(50));
        assert!(out.bytes.len() > settings().limits.max_bytes);
        assert!(!out.within_budget);
    }

    #[test]
    fn encodes_even_when_already_within_limits() {
        let codec = MockCodec::with_size(100);

        let out = normalize(&codec, &source(10, 10), &settings()).unwrap();
        assert_eq!(out.encoding, TargetEncoding::Jpeg);
        assert_eq!(codec.encoded_qualities(), vec![90]);
    }

    #[test]
    fn target_encoding_is_passed_to_codec() {
        let codec = MockCodec::with_size(100);
        let settings = NormalizeSettings {
            target: TargetEncoding::Avif,
            ..settings()
        };

        let out = normalize(&codec, &source(10, 10), &settings).unwrap();
        assert_eq!(out.encoding, TargetEncoding::Avif);
        assert!(codec.get_operations().contains(&RecordedOp::Encode {
            quality: 90,
            encoding: TargetEncoding::Avif
        }));
    }

    #[test]
    fn renormalizing_output_keeps_dimensions() {
        for target in [TargetEncoding::Jpeg, TargetEncoding::Avif] {
            let codec = MockCodec::with_size(2048);
            let settings = NormalizeSettings {
                target,
                ..settings()
            };

            let first = normalize(&codec, &source(4000, 3000), &settings).unwrap();
            let again = SourceImage::new(first.bytes.clone(), first.encoding.mime());
            let second = normalize(&codec, &again, &settings).unwrap();
            assert_eq!(second.source_type, target.media_type());
            assert_eq!((second.width, second.height), (first.width, first.height));
        }
    }

    #[test]
    fn zero_pixel_bounds_still_produce_an_image() {
        let codec = MockCodec::with_size(100);
        let settings = NormalizeSettings {
            limits: Limits {
                max_width: 0,
                max_height: 0,
                ..Limits::default()
            },
            ..settings()
        };

        let out = normalize(&codec, &source(100, 100), &settings).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert!(codec.get_operations().contains(&RecordedOp::Resize {
            width: 1,
            height: 1
        }));
    }

    #[test]
    fn inspect_reports_source_dimensions_without_encoding() {
        let codec = MockCodec::new();

        let dims = inspect(&codec, &source(640, 480), &AcceptedTypes::default()).unwrap();
        assert_eq!(dims, Dimensions::new(640, 480));
        assert_eq!(codec.encoded_qualities(), Vec::<u8>::new());
    }

    #[test]
    fn inspect_rejects_unsupported_type() {
        let codec = MockCodec::new();
        let src = SourceImage::new(synthetic_image(1, 1), "video/mp4");
        assert!(matches!(
            inspect(&codec, &src, &AcceptedTypes::default()),
            Err(NormalizeError::UnsupportedType(_))
        ));
    }
}
