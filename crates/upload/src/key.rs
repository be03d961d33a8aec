//! Object key and content type derivation.

use std::path::Path;

use chrono::{DateTime, Utc};
use ossup_transfer::normalize_prefix;

use crate::error::UploadError;

/// Builds the key `source` is written under.
///
/// The file name gets a `<unix-seconds>_` prefix unless
/// `keep_original_name` is set; `prefix` is normalized to end with `/`.
pub fn object_key(
    source: &Path,
    prefix: Option<&str>,
    keep_original_name: bool,
    now: DateTime<Utc>,
) -> Result<String, UploadError> {
    if keep_original_name {
        return destination(source, prefix);
    }
    let name = file_name(source)?;
    let prefix = prefix.map(normalize_prefix).unwrap_or_default();
    Ok(format!("{prefix}{}_{name}", now.timestamp()))
}

/// Prefix plus bare file name. Unlike [`object_key`] this never changes
/// between runs, so resume checkpoints are located by it.
pub fn destination(source: &Path, prefix: Option<&str>) -> Result<String, UploadError> {
    let name = file_name(source)?;
    let prefix = prefix.map(normalize_prefix).unwrap_or_default();
    Ok(format!("{prefix}{name}"))
}

fn file_name(source: &Path) -> Result<&str, UploadError> {
    source
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| {
            UploadError::Validation(format!(
                "source path has no usable file name: {}",
                source.display()
            ))
        })
}

/// Guesses a MIME type from the file extension.
pub fn detect_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase());

    match ext.as_deref() {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("svg") => "image/svg+xml",
        Some("ico") => "image/x-icon",
        Some("pdf") => "application/pdf",
        Some("json") => "application/json",
        Some("xml") => "application/xml",
        Some("zip") => "application/zip",
        Some("gz") => "application/gzip",
        Some("doc") => "application/msword",
        Some("docx") => {
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        }
        Some("xls") => "application/vnd.ms-excel",
        Some("xlsx") => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        Some("txt" | "log") => "text/plain",
        Some("md") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("css") => "text/css",
        Some("js") => "text/javascript",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        _ => "application/octet-stream",
    }
}
