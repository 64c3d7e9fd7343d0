//! Image normalization in pure Rust, no system libraries.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Decode** | `image::ImageReader` (JPEG, PNG, WebP, GIF), `avif-parse` + `rav1d` (AVIF) |
//! | **Fit to bounds** | [`fit_within`] (pure math) |
//! | **Resize** | Lanczos3 via `DynamicImage::resize_exact` |
//! | **Encode** | JPEG (`JpegEncoder`) or AVIF (rav1e) at a stepped quality |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Quality, quality schedule and limits
//! - **Codec**: [`RasterCodec`] trait + [`ImageCodec`]
//! - **Normalize**: The decode → fit → encode → budget loop

mod avif;
mod calculations;
pub mod codec;
pub mod image_codec;
pub mod normalize;
mod params;

pub use calculations::fit_within;
pub use codec::{CodecError, Dimensions, RasterCodec};
pub use image_codec::ImageCodec;
pub use normalize::{
    EncodeAttempt, Encoded, NormalizeError, NormalizeSettings, SourceImage, check_type, inspect,
    normalize,
};
pub use params::{Limits, Quality, QualitySchedule};
