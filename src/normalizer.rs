//! Caller-facing normalizer: settings + codec + preview store.
//!
//! [`Normalizer::normalize`] runs [`imaging::normalize`] and attaches a
//! [`PreviewHandle`] to the result. [`Normalizer::normalize_async`] runs the
//! same computation on tokio's blocking pool so an async caller can await
//! it without stalling its executor. Calls share nothing but the preview
//! store; a superseded call can simply be dropped or its result ignored.

use crate::imaging::{
    self, Dimensions, EncodeAttempt, ImageCodec, NormalizeError, NormalizeSettings, Quality,
    RasterCodec, SourceImage,
};
use crate::media::{MediaType, TargetEncoding};
use crate::preview::{PreviewHandle, PreviewStore};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use std::sync::Arc;
use tracing::info;

/// A normalized image, owned by the caller.
///
/// Dropping it (or its [`preview`](Self::preview)) revokes the preview URL.
#[derive(Debug)]
pub struct NormalizedImage {
    pub bytes: Arc<[u8]>,
    pub width: u32,
    pub height: u32,
    pub encoding: TargetEncoding,
    pub quality: Quality,
    pub attempts: Vec<EncodeAttempt>,
    pub within_budget: bool,
    pub source_type: MediaType,
    pub source_dimensions: Dimensions,
    pub preview: PreviewHandle,
}

impl NormalizedImage {
    /// Self-contained `data:` URL of the encoded bytes.
    pub fn data_url(&self) -> String {
        format!(
            "data:{};base64,{}",
            self.encoding.mime(),
            STANDARD.encode(&self.bytes)
        )
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Normalizes uploads with one codec and one set of settings.
///
/// Cloning is cheap and clones share the preview store.
pub struct Normalizer<C = ImageCodec> {
    codec: Arc<C>,
    settings: Arc<NormalizeSettings>,
    previews: PreviewStore,
}

impl<C> Clone for Normalizer<C> {
    fn clone(&self) -> Self {
        Self {
            codec: Arc::clone(&self.codec),
            settings: Arc::clone(&self.settings),
            previews: self.previews.clone(),
        }
    }
}

impl Normalizer<ImageCodec> {
    pub fn new(settings: NormalizeSettings) -> Self {
        Self::with_codec(ImageCodec::new(), settings)
    }
}

impl Default for Normalizer<ImageCodec> {
    fn default() -> Self {
        Self::new(NormalizeSettings::default())
    }
}

impl<C: RasterCodec> Normalizer<C> {
    pub fn with_codec(codec: C, settings: NormalizeSettings) -> Self {
        Self {
            codec: Arc::new(codec),
            settings: Arc::new(settings),
            previews: PreviewStore::new(),
        }
    }

    /// Use an existing preview store (e.g. one shared with a renderer).
    pub fn with_previews(mut self, previews: PreviewStore) -> Self {
        self.previews = previews;
        self
    }

    pub fn settings(&self) -> &NormalizeSettings {
        &self.settings
    }

    pub fn previews(&self) -> &PreviewStore {
        &self.previews
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// Normalize one image and allocate its preview.
    pub fn normalize(&self, source: &SourceImage) -> Result<NormalizedImage, NormalizeError> {
        let encoded = imaging::normalize(self.codec.as_ref(), source, &self.settings)?;
        info!(
            source_type = %encoded.source_type,
            from = format!(
                "{}x{}",
                encoded.source_dimensions.width, encoded.source_dimensions.height
            ),
            to = format!("{}x{}", encoded.width, encoded.height),
            quality = %encoded.quality,
            size = encoded.bytes.len(),
            attempts = encoded.attempts.len(),
            "Image normalized"
        );

        let bytes: Arc<[u8]> = Arc::from(encoded.bytes);
        let preview = self
            .previews
            .create(Arc::clone(&bytes), encoded.encoding.mime());

        Ok(NormalizedImage {
            bytes,
            width: encoded.width,
            height: encoded.height,
            encoding: encoded.encoding,
            quality: encoded.quality,
            attempts: encoded.attempts,
            within_budget: encoded.within_budget,
            source_type: encoded.source_type,
            source_dimensions: encoded.source_dimensions,
            preview,
        })
    }

    /// Type-check and decode only.
    pub fn inspect(&self, source: &SourceImage) -> Result<Dimensions, NormalizeError> {
        imaging::inspect(self.codec.as_ref(), source, &self.settings.accepted)
    }
}

impl<C: RasterCodec + Send + 'static> Normalizer<C> {
    /// [`normalize`](Self::normalize) on tokio's blocking pool.
    ///
    /// Must be called from within a tokio runtime. A panic inside the codec
    /// is resumed on the caller; runtime shutdown surfaces as
    /// [`NormalizeError::Interrupted`].
    pub async fn normalize_async(
        &self,
        source: SourceImage,
    ) -> Result<NormalizedImage, NormalizeError> {
        let this = self.clone();
        match tokio::task::spawn_blocking(move || this.normalize(&source)).await {
            Ok(result) => result,
            Err(err) if err.is_panic() => std::panic::resume_unwind(err.into_panic()),
            Err(err) => Err(NormalizeError::Interrupted(err.to_string())),
        }
    }
}
