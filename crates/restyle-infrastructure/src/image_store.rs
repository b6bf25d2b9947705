//! Local storage for generated image bytes.

use restyle_core::error::{RestyleError, Result};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Persists synthesized images to a local directory and hands back stable
/// file references the presentation layer can resolve as image sources.
pub struct LocalImageStore {
    base_dir: PathBuf,
}

impl LocalImageStore {
    /// Creates a store rooted at the given directory, creating it if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(|err| {
            RestyleError::io(format!(
                "failed to create image directory {}: {err}",
                base_dir.display()
            ))
        })?;
        Ok(Self { base_dir })
    }

    /// Creates a store at the default location (`~/.restyle/images`).
    pub fn default_location() -> Result<Self> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| RestyleError::config("failed to get home directory"))?;
        Self::new(home_dir.join(".restyle").join("images"))
    }

    /// Writes image bytes and returns the resulting file path as a string.
    pub async fn persist(&self, bytes: &[u8], mime_type: &str) -> Result<String> {
        let file_name = format!(
            "generated_{}_{}.{}",
            chrono::Utc::now().timestamp_millis(),
            &Uuid::new_v4().simple().to_string()[..8],
            extension_for(mime_type)
        );
        let path = self.base_dir.join(file_name);
        tokio::fs::write(&path, bytes).await.map_err(|err| {
            RestyleError::io(format!(
                "failed to save generated image {}: {err}",
                path.display()
            ))
        })?;
        Ok(path.to_string_lossy().into_owned())
    }
}

fn extension_for(mime_type: &str) -> &'static str {
    match mime_type {
        "image/png" => "png",
        "image/webp" => "webp",
        _ => "jpg",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn persists_bytes_under_the_base_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path()).unwrap();

        let uri = store.persist(b"not really a png", "image/png").await.unwrap();
        assert!(uri.ends_with(".png"));
        let written = std::fs::read(&uri).unwrap();
        assert_eq!(written, b"not really a png");
    }

    #[tokio::test]
    async fn unknown_mime_types_default_to_jpg() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalImageStore::new(dir.path()).unwrap();

        let uri = store.persist(b"bytes", "image/heic").await.unwrap();
        assert!(uri.ends_with(".jpg"));
    }
}
