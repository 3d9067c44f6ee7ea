//! Graph file validation before upload.

use std::fs;
use std::path::Path;

/// Image formats the platform accepts as inline attachments.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Outcome of validating a single file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileValidation {
    pub valid: bool,
    pub reason: Option<String>,
}

impl FileValidation {
    fn ok() -> Self {
        Self { valid: true, reason: None }
    }

    fn rejected(reason: impl Into<String>) -> Self {
        Self {
            valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Check that a file exists, is non-empty, fits the upload size limit, and
/// has a supported image extension.
pub fn validate_graph_file(path: &Path, max_bytes: u64) -> FileValidation {
    let metadata = match fs::metadata(path) {
        Ok(m) => m,
        Err(_) => return FileValidation::rejected(format!("file not found: {}", path.display())),
    };

    if !metadata.is_file() {
        return FileValidation::rejected(format!("not a regular file: {}", path.display()));
    }
    if metadata.len() == 0 {
        return FileValidation::rejected(format!("file is empty: {}", path.display()));
    }
    if metadata.len() > max_bytes {
        return FileValidation::rejected(format!(
            "file exceeds {} byte upload limit ({} bytes): {}",
            max_bytes,
            metadata.len(),
            path.display()
        ));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match ext {
        Some(ext) if SUPPORTED_EXTENSIONS.contains(&ext.as_str()) => FileValidation::ok(),
        Some(ext) => FileValidation::rejected(format!("unsupported format: .{ext}")),
        None => FileValidation::rejected(format!("missing file extension: {}", path.display())),
    }
}
