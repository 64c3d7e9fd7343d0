//! Normalizer configuration.
//!
//! Handles loading, validating, and merging `pinstar.toml`. Stock defaults
//! are the base layer; a user file overrides only the keys it names, and a
//! handful of environment variables override upload credentials last so
//! secrets never have to live in the file.
//!
//! ## Config File Location
//!
//! `pinstar.toml` in the working directory, or any path passed with
//! `--config`. A missing default file means "all defaults"; a missing
//! explicit file is an error.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [limits]
//! max_width = 1920          # Pixel bound for width
//! max_height = 1920         # Pixel bound for height
//! max_bytes = 1048576       # Target payload ceiling (1 MiB)
//!
//! [quality]
//! initial = 0.9             # First encode quality (0.0-1.0)
//! step = 0.1                # Decrement per retry
//! floor = 0.5               # Lowest quality tried
//!
//! [input]
//! accepted_types = ["image/jpeg", "image/png", "image/webp", "image/gif", "image/avif"]
//!
//! [output]
//! encoding = "jpeg"         # "jpeg" or "avif", must be an accepted type
//!
//! [upload]
//! folder = "pins"
//! reject_oversized = false  # Refuse images that missed the byte budget
//! signature_algorithm = "sha1"  # "sha1" or "sha256", per media host account
//! # cloud_name, api_key, api_secret: prefer CLOUDINARY_* env vars
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::{Limits, NormalizeSettings, Quality, QualitySchedule};
use crate::media::{AcceptedTypes, TargetEncoding};
use crate::upload::SignatureAlgorithm;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "pinstar.toml";

/// Environment variables that override `[upload]` credentials.
pub const ENV_CLOUD_NAME: &str = "CLOUDINARY_CLOUD_NAME";
pub const ENV_API_KEY: &str = "CLOUDINARY_API_KEY";
pub const ENV_API_SECRET: &str = "CLOUDINARY_API_SECRET";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Configuration loaded from `pinstar.toml`.
///
/// All fields have defaults matching the upload flow's constants. User config
/// files need only specify the values they want to override.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Pixel bounds and byte budget.
    pub limits: LimitsConfig,
    /// Quality descent of the encode loop.
    pub quality: QualityConfig,
    /// Which declared input types are decoded at all.
    pub input: InputConfig,
    /// The single output encoding.
    pub output: OutputConfig,
    /// Media host credentials and upload policy.
    pub upload: UploadConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LimitsConfig {
    pub max_width: u32,
    pub max_height: u32,
    pub max_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        let limits = Limits::default();
        Self {
            max_width: limits.max_width,
            max_height: limits.max_height,
            max_bytes: limits.max_bytes,
        }
    }
}

/// Quality values on the 0.0–1.0 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub initial: f64,
    pub step: f64,
    pub floor: f64,
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            initial: 0.9,
            step: 0.1,
            floor: 0.5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InputConfig {
    /// Declared MIME types that are decoded; anything else is rejected.
    pub accepted_types: Vec<String>,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            accepted_types: AcceptedTypes::default()
                .iter()
                .map(|t| t.mime().to_string())
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub encoding: TargetEncoding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UploadConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cloud_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_secret: Option<String>,
    /// Destination folder on the media host.
    pub folder: String,
    /// Refuse to prepare an upload for an image that missed the byte budget.
    pub reject_oversized: bool,
    /// Digest the media host account expects for signed uploads.
    pub signature_algorithm: SignatureAlgorithm,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            cloud_name: None,
            api_key: None,
            api_secret: None,
            folder: "pins".to_string(),
            reject_oversized: false,
            signature_algorithm: SignatureAlgorithm::Sha1,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel normalization workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

fn is_fraction(v: f64) -> bool {
    v > 0.0 && v <= 1.0
}

impl Config {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.limits.max_width == 0 || self.limits.max_height == 0 {
            return Err(ConfigError::Validation(
                "limits.max_width and limits.max_height must be non-zero".into(),
            ));
        }
        if self.limits.max_bytes == 0 {
            return Err(ConfigError::Validation(
                "limits.max_bytes must be non-zero".into(),
            ));
        }
        let q = &self.quality;
        if !is_fraction(q.initial) || !is_fraction(q.floor) || !is_fraction(q.step) {
            return Err(ConfigError::Validation(
                "quality.initial, quality.step and quality.floor must be in (0, 1]".into(),
            ));
        }
        if self.quality_schedule().is_none() {
            return Err(ConfigError::Validation(
                "quality.floor must not exceed quality.initial, and quality.step must be at least 0.01"
                    .into(),
            ));
        }
        let accepted = AcceptedTypes::from_mime_list(&self.input.accepted_types).map_err(|t| {
            ConfigError::Validation(format!("input.accepted_types: unknown type {t:?}"))
        })?;
        if accepted.is_empty() {
            return Err(ConfigError::Validation(
                "input.accepted_types must not be empty".into(),
            ));
        }
        let target = self.output.encoding;
        if !accepted.contains(target.media_type()) {
            return Err(ConfigError::Validation(format!(
                "output.encoding {:?} requires {:?} in input.accepted_types",
                target.extension(),
                target.mime()
            )));
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    fn quality_schedule(&self) -> Option<QualitySchedule> {
        let step = (self.quality.step * 100.0).round();
        if !(1.0..=100.0).contains(&step) {
            return None;
        }
        QualitySchedule::new(
            Quality::from_fraction(self.quality.initial),
            step as u8,
            Quality::from_fraction(self.quality.floor),
        )
    }

    /// Settings for the normalizer. Call on a validated config.
    pub fn normalize_settings(&self) -> Result<NormalizeSettings, ConfigError> {
        let accepted = AcceptedTypes::from_mime_list(&self.input.accepted_types).map_err(|t| {
            ConfigError::Validation(format!("input.accepted_types: unknown type {t:?}"))
        })?;
        let schedule = self
            .quality_schedule()
            .ok_or_else(|| ConfigError::Validation("invalid quality schedule".into()))?;
        let limits = Limits::new(
            self.limits.max_width,
            self.limits.max_height,
            self.limits.max_bytes,
        )
        .ok_or_else(|| ConfigError::Validation("limits must be non-zero".into()))?;
        Ok(NormalizeSettings {
            limits,
            schedule,
            accepted,
            target: self.output.encoding,
        })
    }

    /// Override upload credentials from the environment.
    ///
    /// `lookup` is `std::env::var(..).ok()` in production; tests pass a map.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let upload = &mut self.upload;
        for (var, slot) in [
            (ENV_CLOUD_NAME, &mut upload.cloud_name),
            (ENV_API_KEY, &mut upload.api_key),
            (ENV_API_SECRET, &mut upload.api_secret),
        ] {
            if let Some(value) = lookup(var).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> toml::Value {
    toml::Value::try_from(Config::default()).expect("default config must serialize")
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<Config, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: Config = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `path`, or from [`DEFAULT_CONFIG_FILE`] when `None`.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// and validates the result. Environment overrides are not applied here.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let overlay = match path {
        Some(explicit) => Some(load_raw_config(explicit)?.ok_or_else(|| {
            ConfigError::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("config file not found: {}", explicit.display()),
            ))
        })?),
        None => load_raw_config(Path::new(DEFAULT_CONFIG_FILE))?,
    };
    resolve_config(stock_defaults_value(), overlay)
}

/// Returns a fully-commented stock `pinstar.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Pinstar Media Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Limits
# ---------------------------------------------------------------------------
[limits]
# Images larger than these bounds are downscaled, preserving aspect ratio.
# Smaller images are never upscaled.
max_width = 1920
max_height = 1920

# Target payload ceiling in bytes. Quality is lowered until the encoded
# image fits; if even the floor quality is too large, the floor result is
# kept anyway (see upload.reject_oversized).
max_bytes = 1048576

# ---------------------------------------------------------------------------
# Quality descent (0.0 = worst, 1.0 = best)
# ---------------------------------------------------------------------------
[quality]
initial = 0.9
step = 0.1
floor = 0.5

# ---------------------------------------------------------------------------
# Input
# ---------------------------------------------------------------------------
[input]
# Declared media types that are accepted. Anything else is rejected before
# decoding. "image/jpg" is accepted as an alias of "image/jpeg".
accepted_types = ["image/jpeg", "image/png", "image/webp", "image/gif", "image/avif"]

# ---------------------------------------------------------------------------
# Output
# ---------------------------------------------------------------------------
[output]
# Every image is re-encoded to this format: "jpeg" or "avif".
# The matching input type must be in input.accepted_types, so a normalized
# image can always be normalized again.
encoding = "jpeg"

# ---------------------------------------------------------------------------
# Upload
# ---------------------------------------------------------------------------
[upload]
# Destination folder on the media host.
folder = "pins"

# Refuse to prepare uploads for images that missed the byte budget.
reject_oversized = false

# Digest for upload signatures: "sha1" (the host default) or "sha256" for
# accounts configured for SHA-256 signing.
signature_algorithm = "sha1"

# Credentials. Prefer the CLOUDINARY_CLOUD_NAME, CLOUDINARY_API_KEY and
# CLOUDINARY_API_SECRET environment variables over writing them here.
# cloud_name = "demo"
# api_key = "123456789012345"
# api_secret = "..."

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel normalization workers for batch runs.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}
