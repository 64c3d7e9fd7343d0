//! # Pinstar Media
//!
//! Client-side image normalization for pin uploads. A user-selected image is
//! type-checked, decoded, scaled down to fit the pixel bounds, and re-encoded
//! at the highest quality that fits the byte budget, before it is handed to
//! the media host uploader.
//!
//! # Pipeline
//!
//! ```text
//! bytes + declared type
//!   → type check        (accepted set, before any decoding)
//!   → decode            (JPEG, PNG, WebP, AVIF, GIF first frame)
//!   → fit to bounds     (aspect-preserving, never upscales)
//!   → encode loop       (quality 0.9, 0.8, ... down to the 0.5 floor)
//!   → NormalizedImage   (bytes, dimensions, preview handle)
//! ```
//!
//! The first encode that fits the budget wins. If even the floor quality is
//! too large, the floor result is returned with `within_budget = false`; the
//! upload layer decides whether to send it.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`imaging`] | Codec trait, the `image`-crate codec, bounds math, the normalize loop |
//! | [`normalizer`] | Caller-facing [`Normalizer`], sync and async, with preview handles |
//! | [`preview`] | Revocable `blob:` preview URLs for normalized bytes |
//! | [`media`] | Declared media types, the accepted set, the output encoding |
//! | [`upload`] | Upload signing, multipart form and delivery URLs for the media host |
//! | [`process`] | Parallel batch normalization of files on disk |
//! | [`config`] | `pinstar.toml` loading, validation and merging |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Integer Quality Steps
//!
//! Quality is held as a whole percent. The descent 90, 80, 70, 60, 50 is exact,
//! and the last step is clamped to the floor, so the loop never tries a quality
//! below the floor and always ends on it.
//!
//! ## Codec Behind a Trait
//!
//! The normalize loop only talks to [`imaging::RasterCodec`]. Production uses
//! [`imaging::ImageCodec`] (the `image` crate, Lanczos3 resampling, pure-Rust
//! JPEG and AVIF encoders); tests drive the same loop with a recording mock
//! and assert on the exact sequence of decode, resize and encode calls.

pub mod config;
pub mod imaging;
pub mod media;
pub mod normalizer;
pub mod output;
pub mod preview;
pub mod process;
pub mod upload;

pub use imaging::{NormalizeError, NormalizeSettings, SourceImage};
pub use media::{MediaType, TargetEncoding};
pub use normalizer::{NormalizedImage, Normalizer};
pub use preview::{PreviewHandle, PreviewStore};
