//! Uploaded images (doctor avatars, reward and platform logos).
//!
//! Files are stored flat in the configured directory as `<uuid>.<ext>`; the
//! type is taken from magic bytes, never from the client's filename.

use std::path::{Path, PathBuf};

use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("No file provided")]
    Empty,

    #[error("File too large, maximum is {max_bytes} bytes")]
    TooLarge { max_bytes: usize },

    #[error("Unsupported image type")]
    UnsupportedType,

    #[error("Invalid image name")]
    InvalidName,

    #[error("Image storage error: {0}")]
    Io(#[from] std::io::Error),
}

/// Image kinds accepted for upload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Webp,
    Gif,
}

impl ImageKind {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }
}

/// Detect the image kind from magic bytes.
pub fn detect_image_kind(bytes: &[u8]) -> Option<ImageKind> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some(ImageKind::Png);
    }
    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some(ImageKind::Jpeg);
    }
    if bytes.len() >= 12 && bytes[..4] == *b"RIFF" && bytes[8..12] == *b"WEBP" {
        return Some(ImageKind::Webp);
    }
    if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        return Some(ImageKind::Gif);
    }
    None
}

/// Validate and write an upload. Returns the stored file name.
pub async fn store_image(dir: &Path, bytes: &[u8], max_bytes: usize) -> Result<String, ImageError> {
    if bytes.is_empty() {
        return Err(ImageError::Empty);
    }
    if bytes.len() > max_bytes {
        return Err(ImageError::TooLarge { max_bytes });
    }
    let kind = detect_image_kind(bytes).ok_or(ImageError::UnsupportedType)?;

    tokio::fs::create_dir_all(dir).await?;
    let filename = format!("{}.{}", Uuid::new_v4(), kind.extension());
    tokio::fs::write(dir.join(&filename), bytes).await?;
    tracing::info!(%filename, size = bytes.len(), "Image stored");
    Ok(filename)
}

/// A bare file name: no separators, no parent references, no hidden files.
fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && !name.contains(['/', '\\', '\0'])
        && Path::new(name).file_name().is_some_and(|f| f == name)
}

/// Path of a stored image, if `name` is safe and the file exists.
pub fn resolve_image(dir: &Path, name: &str) -> Result<Option<PathBuf>, ImageError> {
    if !is_safe_name(name) {
        return Err(ImageError::InvalidName);
    }
    let path = dir.join(name);
    Ok(path.is_file().then_some(path))
}

/// Content type for a stored image.
pub fn content_type(path: &Path) -> String {
    mime_guess::from_path(path).first_or_octet_stream().to_string()
}

/// Public URL for a stored file name.
pub fn image_url(public_url: &str, filename: &str) -> String {
    format!("{}/api/images/{filename}", public_url.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 13];

    #[test]
    fn detects_by_magic_bytes() {
        assert_eq!(detect_image_kind(PNG), Some(ImageKind::Png));
        assert_eq!(detect_image_kind(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(detect_image_kind(b"RIFF\x00\x00\x00\x00WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(detect_image_kind(b"GIF89a...."), Some(ImageKind::Gif));
        assert_eq!(detect_image_kind(b"%PDF-1.7"), None);
        assert_eq!(detect_image_kind(&[]), None);
    }

    #[tokio::test]
    async fn stores_with_generated_name() {
        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("images");
        let name = store_image(&images, PNG, 1024).await.unwrap();
        assert!(name.ends_with(".png"));
        assert_eq!(name.len(), 36 + 4);

        let path = resolve_image(&images, &name).unwrap().unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), PNG);
        assert_eq!(content_type(&path), "image/png");
    }

    #[tokio::test]
    async fn rejects_empty_large_and_unknown() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(store_image(dir.path(), &[], 10).await, Err(ImageError::Empty)));
        assert!(matches!(
            store_image(dir.path(), PNG, 4).await,
            Err(ImageError::TooLarge { max_bytes: 4 })
        ));
        assert!(matches!(
            store_image(dir.path(), b"plain text", 1024).await,
            Err(ImageError::UnsupportedType)
        ));
    }

    #[test]
    fn resolve_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["../secret", "..", "a/b.png", "a\\b.png", ".hidden", ""] {
            assert!(matches!(resolve_image(dir.path(), name), Err(ImageError::InvalidName)), "{name}");
        }
        assert!(resolve_image(dir.path(), "missing.png").unwrap().is_none());
    }

    #[test]
    fn url_joins_public_base() {
        assert_eq!(image_url("https://clinic.example/", "a.png"), "https://clinic.example/api/images/a.png");
        assert_eq!(image_url("", "a.png"), "/api/images/a.png");
    }
}
