//! Media types accepted on input and produced on output.
//!
//! Uploads arrive with a *declared* media type string (whatever the browser or
//! file picker reported). [`MediaType::parse`] maps that string onto the small
//! set of raster formats the normalizer knows how to decode; [`AcceptedTypes`]
//! narrows it further to what the configuration allows. Everything outside the
//! accepted set is rejected before any bytes are decoded.
//!
//! Output is always a single [`TargetEncoding`], regardless of the input type.

use image::ImageFormat;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

/// Raster input formats with a compiled-in decoder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MediaType {
    Jpeg,
    Png,
    WebP,
    Gif,
    Avif,
}

/// Extension → media type. Shared by [`MediaType::from_extension`] and the
/// batch driver when it has to invent a declared type for a file on disk.
const EXTENSIONS: &[(&str, MediaType)] = &[
    ("jpg", MediaType::Jpeg),
    ("jpeg", MediaType::Jpeg),
    ("png", MediaType::Png),
    ("webp", MediaType::WebP),
    ("gif", MediaType::Gif),
    ("avif", MediaType::Avif),
];

impl MediaType {
    pub const ALL: [MediaType; 5] = [
        MediaType::Jpeg,
        MediaType::Png,
        MediaType::WebP,
        MediaType::Gif,
        MediaType::Avif,
    ];

    /// Parse a declared MIME type.
    ///
    /// Matching is case-insensitive, parameters after `;` are ignored, and
    /// `image/jpg` is treated as an alias of `image/jpeg`.
    ///
    /// ```
    /// # use pinstar_media::media::MediaType;
    /// assert_eq!(MediaType::parse("image/JPG"), Some(MediaType::Jpeg));
    /// assert_eq!(MediaType::parse("image/png; charset=binary"), Some(MediaType::Png));
    /// assert_eq!(MediaType::parse("image/tiff"), None);
    /// ```
    pub fn parse(declared: &str) -> Option<Self> {
        let essence = declared.split(';').next().unwrap_or("").trim();
        match essence.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            "image/gif" => Some(Self::Gif),
            "image/avif" => Some(Self::Avif),
            _ => None,
        }
    }

    /// Guess the media type from a file extension.
    pub fn from_extension(ext: &str) -> Option<Self> {
        EXTENSIONS
            .iter()
            .find(|(e, _)| e.eq_ignore_ascii_case(ext))
            .map(|(_, t)| *t)
    }

    /// Guess the media type from a path's extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }

    /// Canonical MIME string.
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
        }
    }

    /// The `image` crate format of this type.
    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
            Self::Avif => ImageFormat::Avif,
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}

/// The set of input media types a normalizer will try to decode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedTypes(Vec<MediaType>);

impl AcceptedTypes {
    pub fn new(types: impl IntoIterator<Item = MediaType>) -> Self {
        let mut types: Vec<MediaType> = types.into_iter().collect();
        types.sort();
        types.dedup();
        Self(types)
    }

    /// Build from MIME strings. Returns the first unrecognised string on failure.
    pub fn from_mime_list<S: AsRef<str>>(list: &[S]) -> Result<Self, String> {
        list.iter()
            .map(|s| MediaType::parse(s.as_ref()).ok_or_else(|| s.as_ref().to_string()))
            .collect::<Result<Vec<_>, _>>()
            .map(Self::new)
    }

    /// Resolve a declared type against this set.
    ///
    /// `None` means the declared type is either unknown or not accepted; both
    /// cases are an unsupported-type error for the caller.
    pub fn resolve(&self, declared: &str) -> Option<MediaType> {
        MediaType::parse(declared).filter(|t| self.0.contains(t))
    }

    pub fn contains(&self, media_type: MediaType) -> bool {
        self.0.contains(&media_type)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = MediaType> + '_ {
        self.0.iter().copied()
    }
}

impl Default for AcceptedTypes {
    fn default() -> Self {
        Self::new(MediaType::ALL)
    }
}

/// The single output encoding every normalized image is written in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetEncoding {
    #[default]
    Jpeg,
    Avif,
}

impl TargetEncoding {
    pub fn mime(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Avif => "image/avif",
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Avif => "avif",
        }
    }

    /// The input type this encoding is read back as.
    pub fn media_type(self) -> MediaType {
        match self {
            Self::Jpeg => MediaType::Jpeg,
            Self::Avif => MediaType::Avif,
        }
    }
}

impl fmt::Display for TargetEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mime())
    }
}
