//! Batch normalization of files on disk.
//!
//! Each input path is normalized independently and written to the output
//! directory as `<stem>.<ext>`, where `<ext>` follows the target encoding.
//! A file that cannot be read, has an unsupported type, or fails to decode
//! is recorded as failed; the rest of the batch carries on. Failing to write
//! to the output directory aborts the run.
//!
//! ## Output Structure
//!
//! ```text
//! out/
//! ├── manifest.json      # Every input in order, with outcome and diagnostics
//! ├── beach.jpg
//! └── sunset.jpg
//! ```
//!
//! ## Parallel Processing
//!
//! Files are processed in parallel using [rayon](https://docs.rs/rayon); the
//! pool size is set by the binary from `processing.max_processes`. Progress
//! is reported per file over an optional channel so the caller can print
//! while the pool is still working.

use crate::imaging::{
    self, Dimensions, EncodeAttempt, ImageCodec, NormalizeSettings, Quality, RasterCodec,
    SourceImage,
};
use crate::media::{MediaType, TargetEncoding};
use rayon::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;
use tracing::warn;

/// Declared type for files whose extension names no known image type.
pub const UNKNOWN_TYPE: &str = "application/octet-stream";

pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Progress report for one input file.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessEvent {
    Normalized {
        /// 1-based position in the input list.
        index: usize,
        source_path: String,
        output_path: String,
        source_dimensions: Dimensions,
        dimensions: Dimensions,
        quality: Quality,
        size: usize,
        attempts: usize,
        within_budget: bool,
    },
    Failed {
        index: usize,
        source_path: String,
        error: String,
    },
}

/// Written to `manifest.json` after a batch run.
#[derive(Debug, Clone, Serialize)]
pub struct OutputManifest {
    pub encoding: TargetEncoding,
    pub max_bytes: usize,
    pub entries: Vec<ManifestEntry>,
}

impl OutputManifest {
    pub fn normalized_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| matches!(e.outcome, EntryOutcome::Normalized { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.entries.len() - self.normalized_count()
    }

    /// Normalized entries that missed the byte budget.
    pub fn over_budget_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|e| {
                matches!(
                    e.outcome,
                    EntryOutcome::Normalized {
                        within_budget: false,
                        ..
                    }
                )
            })
            .count()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub source_path: String,
    pub declared_type: String,
    #[serde(flatten)]
    pub outcome: EntryOutcome,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum EntryOutcome {
    Normalized {
        /// Output file name, relative to the output directory.
        output: String,
        source_dimensions: Dimensions,
        dimensions: Dimensions,
        quality: Quality,
        size: usize,
        attempts: Vec<EncodeAttempt>,
        within_budget: bool,
    },
    Failed {
        error: String,
    },
}

/// Declared media type for a path, from its extension.
pub fn declared_type_for(path: &Path) -> &'static str {
    MediaType::from_path(path)
        .map(MediaType::mime)
        .unwrap_or(UNKNOWN_TYPE)
}

/// Assign each input a unique `<stem>.<ext>` output name, in input order.
///
/// Repeated stems get a numeric suffix: `a.jpg`, `a-2.jpg`, `a-3.jpg`.
fn output_names(inputs: &[PathBuf], encoding: TargetEncoding) -> Vec<String> {
    let mut used = HashSet::new();
    inputs
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| "image".to_string());
            let mut name = format!("{stem}.{}", encoding.extension());
            let mut n = 2;
            while !used.insert(name.clone()) {
                name = format!("{stem}-{n}.{}", encoding.extension());
                n += 1;
            }
            name
        })
        .collect()
}

pub fn process(
    inputs: &[PathBuf],
    output_dir: &Path,
    settings: &NormalizeSettings,
    events: Option<Sender<ProcessEvent>>,
) -> Result<OutputManifest, ProcessError> {
    process_with_codec(&ImageCodec::new(), inputs, output_dir, settings, events)
}

/// Process files using a specific codec (allows testing with mock).
pub fn process_with_codec(
    codec: &impl RasterCodec,
    inputs: &[PathBuf],
    output_dir: &Path,
    settings: &NormalizeSettings,
    events: Option<Sender<ProcessEvent>>,
) -> Result<OutputManifest, ProcessError> {
    std::fs::create_dir_all(output_dir)?;
    let names = output_names(inputs, settings.target);

    let entries = inputs
        .par_iter()
        .zip(names.par_iter())
        .enumerate()
        .map_with(events, |tx, (i, (path, name))| {
            let (entry, event) = process_one(codec, i + 1, path, output_dir, name, settings)?;
            if let Some(tx) = tx {
                // The receiver going away only stops progress output.
                tx.send(event).ok();
            }
            Ok(entry)
        })
        .collect::<Result<Vec<_>, ProcessError>>()?;

    let manifest = OutputManifest {
        encoding: settings.target,
        max_bytes: settings.limits.max_bytes,
        entries,
    };
    let json = serde_json::to_string_pretty(&manifest)?;
    std::fs::write(output_dir.join(MANIFEST_FILE), json)?;
    Ok(manifest)
}

fn process_one(
    codec: &impl RasterCodec,
    index: usize,
    path: &Path,
    output_dir: &Path,
    output_name: &str,
    settings: &NormalizeSettings,
) -> Result<(ManifestEntry, ProcessEvent), ProcessError> {
    let source_path = path.display().to_string();
    let declared_type = declared_type_for(path);

    let encoded = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| {
            imaging::normalize(codec, &SourceImage::new(bytes, declared_type), settings)
                .map_err(|e| e.to_string())
        });

    let encoded = match encoded {
        Ok(encoded) => encoded,
        Err(error) => {
            warn!(path = %source_path, %error, "Skipping file");
            let entry = ManifestEntry {
                source_path: source_path.clone(),
                declared_type: declared_type.to_string(),
                outcome: EntryOutcome::Failed {
                    error: error.clone(),
                },
            };
            let event = ProcessEvent::Failed {
                index,
                source_path,
                error,
            };
            return Ok((entry, event));
        }
    };

    let output_path = output_dir.join(output_name);
    std::fs::write(&output_path, &encoded.bytes)?;

    let dimensions = Dimensions::new(encoded.width, encoded.height);
    let event = ProcessEvent::Normalized {
        index,
        source_path: source_path.clone(),
        output_path: output_path.display().to_string(),
        source_dimensions: encoded.source_dimensions,
        dimensions,
        quality: encoded.quality,
        size: encoded.bytes.len(),
        attempts: encoded.attempts.len(),
        within_budget: encoded.within_budget,
    };
    let entry = ManifestEntry {
        source_path,
        declared_type: declared_type.to_string(),
        outcome: EntryOutcome::Normalized {
            output: output_name.to_string(),
            source_dimensions: encoded.source_dimensions,
            dimensions,
            quality: encoded.quality,
            size: encoded.bytes.len(),
            attempts: encoded.attempts,
            within_budget: encoded.within_budget,
        },
    };
    Ok((entry, event))
}
