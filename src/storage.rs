//! Photo/PDF persistence. Files land under the configured upload directory
//! with a uuid filename and are served back under `/uploads`. The database
//! insert that follows a successful save is not rolled up with it: a saved
//! file whose record insert fails is simply orphaned.

use std::path::Path;

use uuid::Uuid;

use crate::config::Config;
use crate::errors::AppError;

const ALLOWED: [(&str, &str); 5] = [
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("webp", "image/webp"),
    ("pdf", "application/pdf"),
];

/// Validate an upload before it touches disk. Returns the canonical
/// extension for the stored filename.
pub fn validate_upload(
    file_name: &str,
    content_type: Option<&str>,
    size: usize,
    max_bytes: usize,
) -> Result<&'static str, String> {
    if size == 0 {
        return Err("Uploaded file is empty".to_string());
    }
    if size > max_bytes {
        return Err(format!(
            "File too large: {} bytes (maximum {})",
            size, max_bytes
        ));
    }

    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    let matched = ALLOWED.iter().find(|(allowed_ext, _)| *allowed_ext == ext);
    let (canonical_ext, expected_mime) = match matched {
        Some(entry) => *entry,
        None => {
            return Err(format!(
                "Unsupported file type {:?}: allowed are jpg, png, webp, pdf",
                ext
            ))
        }
    };

    if let Some(ct) = content_type {
        if ct != expected_mime {
            return Err(format!(
                "Content type {} does not match file extension .{}",
                ct, ext
            ));
        }
    }

    Ok(canonical_ext)
}

/// Persist an uploaded file and return its public URL.
pub async fn save_upload(
    config: &Config,
    file_name: &str,
    content_type: Option<&str>,
    data: &[u8],
) -> Result<String, AppError> {
    let ext = validate_upload(file_name, content_type, data.len(), config.max_upload_bytes)
        .map_err(AppError::Validation)?;

    tokio::fs::create_dir_all(&config.upload_dir)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to create upload dir: {e}")))?;

    let stored_name = format!("{}.{}", Uuid::new_v4(), ext);
    let path = config.upload_dir.join(&stored_name);
    tokio::fs::write(&path, data)
        .await
        .map_err(|e| AppError::Storage(format!("Failed to write {}: {e}", path.display())))?;

    Ok(format!("{}/uploads/{}", config.public_base_url, stored_name))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 10 * 1024 * 1024;

    #[test]
    fn accepts_whitelisted_extensions() {
        assert_eq!(validate_upload("shelf.jpg", None, 100, MAX), Ok("jpg"));
        assert_eq!(validate_upload("shelf.JPEG", None, 100, MAX), Ok("jpeg"));
        assert_eq!(validate_upload("doc.pdf", None, 100, MAX), Ok("pdf"));
        assert_eq!(validate_upload("photo.webp", None, 100, MAX), Ok("webp"));
    }

    #[test]
    fn rejects_unknown_extensions() {
        assert!(validate_upload("run.exe", None, 100, MAX).is_err());
        assert!(validate_upload("noext", None, 100, MAX).is_err());
        assert!(validate_upload("archive.tar.gz", None, 100, MAX).is_err());
    }

    #[test]
    fn rejects_oversized_and_empty_files() {
        assert!(validate_upload("shelf.jpg", None, MAX + 1, MAX).is_err());
        assert!(validate_upload("shelf.jpg", None, 0, MAX).is_err());
        assert!(validate_upload("shelf.jpg", None, MAX, MAX).is_ok());
    }

    #[test]
    fn content_type_must_match_extension_when_present() {
        assert!(validate_upload("shelf.jpg", Some("image/jpeg"), 100, MAX).is_ok());
        assert!(validate_upload("shelf.jpg", Some("image/png"), 100, MAX).is_err());
        assert!(validate_upload("doc.pdf", Some("application/pdf"), 100, MAX).is_ok());
        // No content type provided falls back to extension alone.
        assert!(validate_upload("shelf.png", None, 100, MAX).is_ok());
    }
}
