//! MIME type lookup by filename extension.

use std::path::Path;

/// Returns the MIME type for a file path, falling back to
/// `application/octet-stream` for unknown extensions.
pub fn by_path(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .to_string()
}
