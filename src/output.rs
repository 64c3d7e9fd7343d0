//! CLI output formatting.
//!
//! Every file is shown by its positional index and file name, with the
//! details indented underneath. Paths are context, not identity.
//!
//! # Output Format
//!
//! ## Normalize
//!
//! ```text
//! 001 beach.png
//!     Source: photos/beach.png
//!     4000x2000 → 1920x960
//!     Quality: 0.90 (1 attempt)
//!     Size: 412.5 KB
//!     Output: out/beach.jpg
//! 002 notes.txt
//!     Error: unsupported image type: "application/octet-stream"
//!
//! Normalized 1 of 2 files, 1 failed
//! ```
//!
//! ## Check
//!
//! ```text
//! 001 beach.png: image/png 4000x2000
//! 002 notes.txt: unsupported image type: "application/octet-stream"
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>` or
//! `String`) for testability. Format functions are pure; `main` prints.

use crate::imaging::Dimensions;
use crate::media::MediaType;
use crate::process::{OutputManifest, ProcessEvent};
use std::path::Path;

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

fn format_dimensions(d: Dimensions) -> String {
    format!("{}x{}", d.width, d.height)
}

/// Human-readable size with 1024-based units.
///
/// ```
/// use pinstar_media::output::format_file_size;
/// assert_eq!(format_file_size(0), "0 Bytes");
/// assert_eq!(format_file_size(1536), "1.5 KB");
/// ```
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["Bytes", "KB", "MB", "GB"];
    if bytes == 0 {
        return "0 Bytes".to_string();
    }
    let mut unit = 0;
    let mut scale = 1u64;
    while unit < UNITS.len() - 1 && bytes >= scale * 1024 {
        scale *= 1024;
        unit += 1;
    }
    let value = (bytes as f64 / scale as f64 * 100.0).round() / 100.0;
    let number = format!("{value:.2}");
    let number = number.trim_end_matches('0').trim_end_matches('.');
    format!("{} {}", number, UNITS[unit])
}

// ============================================================================
// Normalize
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Normalized {
            index,
            source_path,
            output_path,
            source_dimensions,
            dimensions,
            quality,
            size,
            attempts,
            within_budget,
        } => {
            let dims = if source_dimensions == dimensions {
                format!("{} (unchanged)", format_dimensions(*dimensions))
            } else {
                format!(
                    "{} \u{2192} {}",
                    format_dimensions(*source_dimensions),
                    format_dimensions(*dimensions)
                )
            };
            let plural = if *attempts == 1 { "" } else { "s" };
            let budget = if *within_budget { "" } else { " (over budget)" };
            vec![
                format!("{} {}", format_index(*index), file_name(source_path)),
                format!("    Source: {}", source_path),
                format!("    {}", dims),
                format!("    Quality: {} ({} attempt{})", quality, attempts, plural),
                format!("    Size: {}{}", format_file_size(*size as u64), budget),
                format!("    Output: {}", output_path),
            ]
        }
        ProcessEvent::Failed {
            index,
            source_path,
            error,
        } => vec![
            format!("{} {}", format_index(*index), file_name(source_path)),
            format!("    Error: {}", error),
        ],
    }
}

/// One-line summary of a batch run.
pub fn format_summary(manifest: &OutputManifest) -> String {
    let total = manifest.entries.len();
    let mut line = format!(
        "Normalized {} of {} file{}",
        manifest.normalized_count(),
        total,
        if total == 1 { "" } else { "s" }
    );
    let failed = manifest.failed_count();
    if failed > 0 {
        line.push_str(&format!(", {} failed", failed));
    }
    let over = manifest.over_budget_count();
    if over > 0 {
        line.push_str(&format!(
            ", {} over the {} budget",
            over,
            format_file_size(manifest.max_bytes as u64)
        ));
    }
    line
}

// ============================================================================
// Check
// ============================================================================

/// Format the result of checking one file.
pub fn format_check_line(
    index: usize,
    path: &Path,
    media_type: Option<MediaType>,
    result: &Result<Dimensions, String>,
) -> String {
    let name = file_name(&path.display().to_string());
    match (result, media_type) {
        (Ok(dims), Some(t)) => format!(
            "{} {}: {} {}",
            format_index(index),
            name,
            t,
            format_dimensions(*dims)
        ),
        (Ok(dims), None) => format!(
            "{} {}: {}",
            format_index(index),
            name,
            format_dimensions(*dims)
        ),
        (Err(e), _) => format!("{} {}: {}", format_index(index), name, e),
    }
}
