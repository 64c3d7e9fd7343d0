//! Pure Rust raster codec built on the `image` crate.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG, WebP, GIF) | `image::ImageReader::with_format` (pure Rust decoders) |
//! | Decode (AVIF) | `avif-parse` + `rav1d`, see [`super::avif`] |
//! | Resize | `image::DynamicImage::resize_exact` with `Lanczos3` filter |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6) |
//!
//! GIF input decodes its first frame only. JPEG has no alpha channel, so
//! transparent pixels are composited onto white before encoding.

use super::avif;
use super::codec::{CodecError, Dimensions, RasterCodec};
use super::params::Quality;
use crate::media::{MediaType, TargetEncoding};
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader, RgbImage};
use std::io::Cursor;

/// rav1e speed preset; 6 trades a little size for reasonable throughput.
const AVIF_SPEED: u8 = 6;

/// Raster codec backed by the `image` crate.
///
/// See the [module docs](self) for the crate-to-operation mapping.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCodec;

impl ImageCodec {
    pub fn new() -> Self {
        Self
    }
}

/// Composite an image with alpha onto a white background.
fn flatten_onto_white(img: &DynamicImage) -> RgbImage {
    let rgba = img.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let a = u16::from(a);
        let blend = |c: u8| ((u16::from(c) * a + 255 * (255 - a) + 127) / 255) as u8;
        image::Rgb([blend(r), blend(g), blend(b)])
    })
}

fn encode_jpeg(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let rgb = if img.color().has_alpha() {
        flatten_onto_white(img)
    } else {
        img.to_rgb8()
    };
    let mut buf = Vec::new();
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, quality.percent());
    DynamicImage::ImageRgb8(rgb)
        .write_with_encoder(encoder)
        .map_err(|e| CodecError::Encode(format!("JPEG encode failed: {e}")))?;
    Ok(buf)
}

fn encode_avif(img: &DynamicImage, quality: Quality) -> Result<Vec<u8>, CodecError> {
    let normalized = if img.color().has_alpha() {
        DynamicImage::ImageRgba8(img.to_rgba8())
    } else {
        DynamicImage::ImageRgb8(img.to_rgb8())
    };
    let mut buf = Vec::new();
    let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
        &mut buf,
        AVIF_SPEED,
        quality.percent(),
    );
    normalized
        .write_with_encoder(encoder)
        .map_err(|e| CodecError::Encode(format!("AVIF encode failed: {e}")))?;
    Ok(buf)
}

impl RasterCodec for ImageCodec {
    type Raster = DynamicImage;

    fn decode(&self, bytes: &[u8], media_type: MediaType) -> Result<DynamicImage, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Decode("empty payload".into()));
        }
        let img = match media_type {
            MediaType::Avif => avif::decode(bytes)?,
            _ => ImageReader::with_format(Cursor::new(bytes), media_type.image_format())
                .decode()
                .map_err(|e| CodecError::Decode(format!("failed to decode {media_type}: {e}")))?,
        };
        if img.width() == 0 || img.height() == 0 {
            return Err(CodecError::Decode(format!(
                "{media_type} has zero-sized dimensions {}x{}",
                img.width(),
                img.height()
            )));
        }
        Ok(img)
    }

    fn dimensions(&self, raster: &DynamicImage) -> Dimensions {
        Dimensions {
            width: raster.width(),
            height: raster.height(),
        }
    }

    fn resize(&self, raster: &DynamicImage, width: u32, height: u32) -> DynamicImage {
        raster.resize_exact(width, height, FilterType::Lanczos3)
    }

    fn encode(
        &self,
        raster: &DynamicImage,
        encoding: TargetEncoding,
        quality: Quality,
    ) -> Result<Vec<u8>, CodecError> {
        match encoding {
            TargetEncoding::Jpeg => encode_jpeg(raster, quality),
            TargetEncoding::Avif => encode_avif(raster, quality),
        }
    }
}
