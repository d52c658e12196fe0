use crate::error::ValidationError;
use serde::Serialize;
use std::path::Path;

/// Exact MIME allow-list for uploads.
pub const ALLOWED_FORMATS: &[&str] = &[
    "application/pdf",
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    "image/png",
    "image/jpeg",
];

/// Single upload ceiling for every entry point.
pub const MAX_UPLOAD_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Serialize)]
pub struct ValidationResult {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<Result<(), ValidationError>> for ValidationResult {
    fn from(r: Result<(), ValidationError>) -> Self {
        match r {
            Ok(()) => ValidationResult {
                valid: true,
                error: None,
            },
            Err(e) => ValidationResult {
                valid: false,
                error: Some(e.to_string()),
            },
        }
    }
}

/// Check a candidate upload's declared type and size. Format is checked first.
pub fn validate_upload(mime_type: &str, size: u64) -> Result<(), ValidationError> {
    if !ALLOWED_FORMATS.contains(&mime_type) {
        return Err(ValidationError::UnsupportedFormat(mime_type.to_string()));
    }
    if size > MAX_UPLOAD_BYTES {
        return Err(ValidationError::TooLarge {
            size,
            limit: MAX_UPLOAD_BYTES,
        });
    }
    Ok(())
}

/// MIME type for a file picked from disk, from its extension.
pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "txt" => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIB: u64 = 1024 * 1024;

    #[test]
    fn rejects_oversized_pdf() {
        let err = validate_upload("application/pdf", 60 * MIB).unwrap_err();
        assert!(matches!(err, ValidationError::TooLarge { .. }));
        assert_eq!(err.to_string(), "File size exceeds 50MB limit");
    }

    #[test]
    fn rejects_plain_text() {
        let err = validate_upload("text/plain", MIB).unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedFormat("text/plain".into()));
        assert_eq!(err.to_string(), "File format not supported");
    }

    #[test]
    fn accepts_small_png_and_exact_limit() {
        assert!(validate_upload("image/png", 2 * MIB).is_ok());
        assert!(validate_upload("application/pdf", MAX_UPLOAD_BYTES).is_ok());
        assert!(validate_upload("application/pdf", MAX_UPLOAD_BYTES + 1).is_err());
    }

    #[test]
    fn allow_list_is_exact() {
        assert!(validate_upload("image/gif", 10).is_err());
        assert!(validate_upload("image/png; charset=binary", 10).is_err());
    }

    #[test]
    fn mime_from_extension() {
        assert_eq!(mime_for_path(Path::new("scan.JPG")), "image/jpeg");
        assert_eq!(mime_for_path(Path::new("notes.txt")), "text/plain");
        assert_eq!(mime_for_path(Path::new("blob")), "application/octet-stream");
    }
}
