//! Raster codec trait and shared types.
//!
//! The [`RasterCodec`] trait is the capability the normalizer needs from a
//! pixel library: decode bytes into a raster, resize a raster, and encode a
//! raster at a given quality. The normalizer's control flow (type check,
//! bounds, quality descent) only talks to this trait, so it runs unchanged
//! against the production [`ImageCodec`](super::image_codec::ImageCodec) or a
//! synthetic codec in tests.

use super::params::Quality;
use crate::media::{MediaType, TargetEncoding};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
}

/// Raster dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Pixel library capability used by the normalizer.
///
/// `Sync` so one codec can serve a rayon batch.
pub trait RasterCodec: Sync {
    /// Decoded pixel buffer. Lives only for the duration of one call.
    type Raster;

    /// Decode `bytes` as `media_type`.
    fn decode(&self, bytes: &[u8], media_type: MediaType) -> Result<Self::Raster, CodecError>;

    /// Dimensions of a decoded raster.
    fn dimensions(&self, raster: &Self::Raster) -> Dimensions;

    /// Resize to exactly `width` × `height`.
    fn resize(&self, raster: &Self::Raster, width: u32, height: u32) -> Self::Raster;

    /// Encode to `encoding` at `quality`.
    fn encode(
        &self,
        raster: &Self::Raster,
        encoding: TargetEncoding,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Magic prefix of a synthetic "image": `SYNT` + width LE + height LE.
    const SYNTHETIC_MAGIC: &[u8; 4] = b"SYNT";

    /// Encode dimensions as bytes [`MockCodec`] can decode.
    pub fn synthetic_image(width: u32, height: u32) -> Vec<u8> {
        let mut bytes = SYNTHETIC_MAGIC.to_vec();
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        bytes
    }

    /// Mock codec that records operations and produces fake payloads.
    ///
    /// Rasters are just [`Dimensions`]. Encoded size for a quality comes from
    /// `sizes` when present, otherwise from `default_size`.
    /// Uses Mutex (not RefCell) so it is Sync.
    #[derive(Default)]
    pub struct MockCodec {
        pub sizes: HashMap<u8, usize>,
        pub default_size: usize,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Decode(MediaType),
        Resize { width: u32, height: u32 },
        Encode { quality: u8, encoding: TargetEncoding },
    }

    impl MockCodec {
        pub fn new() -> Self {
            Self {
                default_size: 1000,
                ..Self::default()
            }
        }

        /// Every encode produces `size` bytes.
        pub fn with_size(size: usize) -> Self {
            Self {
                default_size: size,
                ..Self::default()
            }
        }

        /// Per-quality sizes as `(percent, bytes)`; other qualities use `default_size`.
        pub fn with_sizes(sizes: &[(u8, usize)], default_size: usize) -> Self {
            Self {
                sizes: sizes.iter().copied().collect(),
                default_size,
                operations: Mutex::new(Vec::new()),
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn encoded_qualities(&self) -> Vec<u8> {
            self.get_operations()
                .into_iter()
                .filter_map(|op| match op {
                    RecordedOp::Encode { quality, .. } => Some(quality),
                    _ => None,
                })
                .collect()
        }
    }

    impl RasterCodec for MockCodec {
        type Raster = Dimensions;

        fn decode(&self, bytes: &[u8], media_type: MediaType) -> Result<Dimensions, CodecError> {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Decode(media_type));

            if bytes.len() < 12 || &bytes[..4] != SYNTHETIC_MAGIC {
                return Err(CodecError::Decode("not a synthetic image".into()));
            }
            let width = u32::from_le_bytes(bytes[4..8].try_into().unwrap());
            let height = u32::from_le_bytes(bytes[8..12].try_into().unwrap());
            Ok(Dimensions { width, height })
        }

        fn dimensions(&self, raster: &Dimensions) -> Dimensions {
            *raster
        }

        fn resize(&self, _raster: &Dimensions, width: u32, height: u32) -> Dimensions {
            self.operations
                .lock()
                .unwrap()
                .push(RecordedOp::Resize { width, height });
            Dimensions { width, height }
        }

        fn encode(
            &self,
            raster: &Dimensions,
            encoding: TargetEncoding,
            quality: Quality,
        ) -> Result<Vec<u8>, CodecError> {
            self.operations.lock().unwrap().push(RecordedOp::Encode {
                quality: quality.percent(),
                encoding,
            });
            let size = self
                .sizes
                .get(&quality.percent())
                .copied()
                .unwrap_or(self.default_size);
            // Payload re-decodes to the encoded dimensions when large enough.
            let mut bytes = synthetic_image(raster.width, raster.height);
            bytes.resize(size.max(bytes.len()), 0);
            bytes.truncate(size);
            Ok(bytes)
        }
    }

    #[test]
    fn mock_decodes_synthetic_image() {
        let codec = MockCodec::new();
        let raster = codec
            .decode(&synthetic_image(800, 600), MediaType::Png)
            .unwrap();
        assert_eq!(raster, Dimensions::new(800, 600));
        assert_eq!(codec.get_operations(), vec![RecordedOp::Decode(MediaType::Png)]);
    }

    #[test]
    fn mock_rejects_garbage() {
        let codec = MockCodec::new();
        assert!(matches!(
            codec.decode(b"definitely not pixels", MediaType::Jpeg),
            Err(CodecError::Decode(_))
        ));
    }

    #[test]
    fn mock_records_encode_quality() {
        let codec = MockCodec::with_sizes(&[(90, 5000)], 10);
        let raster = Dimensions::new(10, 10);
        let out = codec
            .encode(&raster, TargetEncoding::Jpeg, Quality::new(90))
            .unwrap();
        assert_eq!(out.len(), 5000);
        let out = codec
            .encode(&raster, TargetEncoding::Jpeg, Quality::new(80))
            .unwrap();
        assert_eq!(out.len(), 10);
        assert_eq!(codec.encoded_qualities(), vec![90, 80]);
    }
}
