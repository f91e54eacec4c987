//! Image hosting for profile photos and post images.

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::db::models::ImageRef;

/// Largest accepted upload.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

#[derive(Debug, thiserror::Error)]
pub enum ImageError {
    #[error("image storage failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid image id: {0}")]
    InvalidId(String),
}

#[async_trait]
pub trait ImageHost: Send + Sync {
    /// Store `bytes` and return where clients can fetch them.
    async fn upload(&self, bytes: Vec<u8>, extension: &str) -> Result<ImageRef, ImageError>;

    /// Remove a previously uploaded image. Unknown ids are ignored.
    async fn remove(&self, public_id: &str) -> Result<(), ImageError>;
}

/// Pick a file extension for an upload from its file name or content type.
/// Returns `None` for anything that is not a supported image.
pub fn image_extension(file_name: Option<&str>, content_type: Option<&str>) -> Option<String> {
    let from_name = file_name
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());
    let from_type = content_type
        .and_then(mime_guess::get_mime_extensions_str)
        .and_then(|exts| exts.iter().find(|ext| IMAGE_EXTENSIONS.contains(*ext)))
        .map(|ext| ext.to_string());

    from_name
        .filter(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .or(from_type)
}

/// Stores images in a local directory served under `public_url`.
pub struct LocalImageHost {
    dir: PathBuf,
    public_url: String,
}

impl LocalImageHost {
    pub fn new(dir: PathBuf, public_url: impl Into<String>) -> Self {
        Self {
            dir,
            public_url: public_url.into(),
        }
    }

    fn path_for(&self, public_id: &str) -> Result<PathBuf, ImageError> {
        let valid = !public_id.is_empty()
            && public_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
            && !public_id.starts_with('.');
        if !valid {
            return Err(ImageError::InvalidId(public_id.to_string()));
        }
        Ok(self.dir.join(public_id))
    }
}

#[async_trait]
impl ImageHost for LocalImageHost {
    async fn upload(&self, bytes: Vec<u8>, extension: &str) -> Result<ImageRef, ImageError> {
        let public_id = format!("{}.{}", uuid::Uuid::now_v7(), extension);
        let path = self.path_for(&public_id)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        tokio::fs::write(&path, bytes).await?;
        tracing::debug!("Stored image {}", path.display());

        Ok(ImageRef {
            url: format!("{}/{}", self.public_url.trim_end_matches('/'), public_id),
            public_id: Some(public_id),
        })
    }

    async fn remove(&self, public_id: &str) -> Result<(), ImageError> {
        let path = self.path_for(public_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_from_name_or_type() {
        assert_eq!(image_extension(Some("cat.PNG"), None).as_deref(), Some("png"));
        assert_eq!(
            image_extension(Some("blob"), Some("image/png")).as_deref(),
            Some("png")
        );
        assert_eq!(image_extension(Some("notes.txt"), Some("text/plain")), None);
        assert_eq!(image_extension(None, None), None);
    }

    #[tokio::test]
    async fn upload_then_remove() {
        let tmp = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(tmp.path().join("uploads"), "/uploads/");

        let image = host.upload(b"fake-png".to_vec(), "png").await.unwrap();
        let public_id = image.public_id.clone().unwrap();
        assert_eq!(image.url, format!("/uploads/{public_id}"));

        let stored = tmp.path().join("uploads").join(&public_id);
        assert_eq!(std::fs::read(&stored).unwrap(), b"fake-png");

        host.remove(&public_id).await.unwrap();
        assert!(!stored.exists());
        host.remove(&public_id).await.unwrap();
    }

    #[tokio::test]
    async fn remove_rejects_path_traversal() {
        let tmp = tempfile::tempdir().unwrap();
        let host = LocalImageHost::new(tmp.path().to_path_buf(), "/uploads");
        assert!(matches!(
            host.remove("../etc/passwd").await,
            Err(ImageError::InvalidId(_))
        ));
    }
}
