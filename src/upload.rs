//! Media host upload contract.
//!
//! The normalizer hands its bytes to an uploader that talks to the media
//! host directly; this module produces everything that uploader needs
//! without doing any network I/O itself:
//!
//! - a signed parameter set ([`create_signature`]), computed server-side so
//!   the API secret never reaches the client
//! - the multipart form for the upload endpoint ([`prepare_upload`])
//! - transformation URLs for delivering stored images ([`delivery_url`])
//!
//! ## Signing
//!
//! Parameters are sorted by key, joined as `key=value` pairs with `&`, the
//! API secret is appended, and the result is hashed and hex-encoded. The
//! digest is SHA-1, the host's default. Accounts switched to SHA-256 set
//! `upload.signature_algorithm = "sha256"`; the form then carries a
//! `signature_algorithm` field, which the host reads but never signs.

use crate::config::UploadConfig;
use crate::media::TargetEncoding;
use crate::normalizer::NormalizedImage;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Digest used for upload signatures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureAlgorithm {
    #[default]
    Sha1,
    Sha256,
}

impl SignatureAlgorithm {
    pub fn name(self) -> &'static str {
        match self {
            Self::Sha1 => "sha1",
            Self::Sha256 => "sha256",
        }
    }

    fn hex_digest(self, input: &[u8]) -> String {
        match self {
            Self::Sha1 => format!("{:x}", Sha1::digest(input)),
            Self::Sha256 => format!("{:x}", Sha256::digest(input)),
        }
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum UploadError {
    #[error("Missing upload credential: {0}")]
    MissingCredential(&'static str),
    #[error("Payload of {size} bytes exceeds the {limit} byte budget")]
    PayloadTooLarge { size: usize, limit: usize },
}

/// Credentials for the media host account.
#[derive(Clone, PartialEq, Eq)]
pub struct UploadCredentials {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub signature_algorithm: SignatureAlgorithm,
}

impl UploadCredentials {
    /// Take credentials from `[upload]`; every one of them must be set.
    pub fn from_config(config: &UploadConfig) -> Result<Self, UploadError> {
        fn required(value: &Option<String>, name: &'static str) -> Result<String, UploadError> {
            value
                .clone()
                .filter(|v| !v.is_empty())
                .ok_or(UploadError::MissingCredential(name))
        }
        Ok(Self {
            cloud_name: required(&config.cloud_name, "cloud_name")?,
            api_key: required(&config.api_key, "api_key")?,
            api_secret: required(&config.api_secret, "api_secret")?,
            signature_algorithm: config.signature_algorithm,
        })
    }
}

impl std::fmt::Debug for UploadCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadCredentials")
            .field("cloud_name", &self.cloud_name)
            .field("api_key", &self.api_key)
            .field("api_secret", &"<redacted>")
            .field("signature_algorithm", &self.signature_algorithm)
            .finish()
    }
}

/// Hex digest of the sorted `key=value&...` string followed by `secret`.
pub fn sign_params(
    params: &BTreeMap<&str, String>,
    secret: &str,
    algorithm: SignatureAlgorithm,
) -> String {
    let joined = params
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&");
    algorithm.hex_digest(format!("{joined}{secret}").as_bytes())
}

/// What the client needs to post a signed upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadSignature {
    pub signature: String,
    pub timestamp: u64,
    pub api_key: String,
    pub cloud_name: String,
    pub folder: String,
    pub signature_algorithm: SignatureAlgorithm,
}

/// Sign an upload into `folder` at `timestamp` (Unix seconds).
pub fn create_signature(
    credentials: &UploadCredentials,
    folder: &str,
    timestamp: u64,
) -> UploadSignature {
    let params = BTreeMap::from([
        ("folder", folder.to_string()),
        ("timestamp", timestamp.to_string()),
    ]);
    let algorithm = credentials.signature_algorithm;
    let signature = sign_params(&params, &credentials.api_secret, algorithm);
    debug!(
        folder,
        timestamp,
        algorithm = algorithm.name(),
        "Upload signature created"
    );
    UploadSignature {
        signature,
        timestamp,
        api_key: credentials.api_key.clone(),
        cloud_name: credentials.cloud_name.clone(),
        folder: folder.to_string(),
        signature_algorithm: algorithm,
    }
}

/// Current Unix time in seconds.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn upload_url(cloud_name: &str) -> String {
    format!("https://api.cloudinary.com/v1_1/{cloud_name}/image/upload")
}

/// Upload-side handling of images that missed the byte budget.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadPolicy {
    pub reject_oversized: bool,
    /// Budget the image was normalized against.
    pub max_bytes: usize,
}

/// A multipart form ready to post to [`UploadForm::url`].
#[derive(Debug, Clone)]
pub struct UploadForm {
    pub url: String,
    /// Text fields in posting order.
    pub fields: Vec<(&'static str, String)>,
    pub file_name: String,
    pub content_type: &'static str,
    pub file: Arc<[u8]>,
}

impl UploadForm {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| *k == name)
            .map(|(_, v)| v.as_str())
    }
}

/// Build the upload form for a normalized image.
///
/// The file name keeps the stem of `file_name` and takes the extension of
/// the output encoding.
pub fn prepare_upload(
    image: &NormalizedImage,
    signature: &UploadSignature,
    file_name: &str,
    policy: UploadPolicy,
) -> Result<UploadForm, UploadError> {
    if policy.reject_oversized && !image.within_budget {
        return Err(UploadError::PayloadTooLarge {
            size: image.len(),
            limit: policy.max_bytes,
        });
    }

    let stem = Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "image".to_string());

    let mut fields = vec![
        ("signature", signature.signature.clone()),
        ("timestamp", signature.timestamp.to_string()),
        ("api_key", signature.api_key.clone()),
        ("folder", signature.folder.clone()),
    ];
    // SHA-1 is the host default and needs no field
    if signature.signature_algorithm != SignatureAlgorithm::Sha1 {
        fields.push((
            "signature_algorithm",
            signature.signature_algorithm.name().to_string(),
        ));
    }

    Ok(UploadForm {
        url: upload_url(&signature.cloud_name),
        fields,
        file_name: format!("{stem}.{}", image.encoding.extension()),
        content_type: image.encoding.mime(),
        file: Arc::clone(&image.bytes),
    })
}

/// Transformation options for a delivery URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: u32,
    /// `auto` lets the host negotiate the format per client.
    pub format: String,
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            width: None,
            height: None,
            quality: 80,
            format: "auto".to_string(),
        }
    }
}

/// The host's `f_` format token for an encoding. JPEG is `jpg` there.
pub fn delivery_format(encoding: TargetEncoding) -> &'static str {
    match encoding {
        TargetEncoding::Jpeg => "jpg",
        TargetEncoding::Avif => "avif",
    }
}

impl DeliveryOptions {
    /// Pin delivery to one encoding instead of `f_auto`.
    pub fn with_format(encoding: TargetEncoding) -> Self {
        Self {
            format: delivery_format(encoding).to_string(),
            ..Self::default()
        }
    }
}

pub fn delivery_url(cloud_name: &str, public_id: &str, options: &DeliveryOptions) -> String {
    let mut transformation = format!("f_{},q_{}", options.format, options.quality);
    if let Some(w) = options.width {
        transformation.push_str(&format!(",w_{w}"));
    }
    if let Some(h) = options.height {
        transformation.push_str(&format!(",h_{h}"));
    }
    format!("https://res.cloudinary.com/{cloud_name}/image/upload/{transformation}/{public_id}")
}
