//! Filesystem-backed storage for uploaded diagram bytes. Stands in for
//! an object store: the spec calls the concrete blob backend out of
//! scope and names the filesystem as an acceptable choice.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::ImageRef;
use crate::utils::ApiError;

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn save(&self, id: Uuid, image_ref: &ImageRef, bytes: &[u8]) -> Result<(), ApiError>;
    async fn load(&self, id: Uuid, image_ref: &ImageRef) -> Result<Vec<u8>, ApiError>;
    async fn delete(&self, id: Uuid, image_ref: &ImageRef) -> Result<(), ApiError>;
}

pub struct FilesystemImageStore {
    root: std::path::PathBuf,
}

impl FilesystemImageStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn path_for(&self, id: Uuid, image_ref: &ImageRef) -> std::path::PathBuf {
        self.root.join(image_ref.file_name(id))
    }
}

#[async_trait]
impl ImageStore for FilesystemImageStore {
    async fn save(&self, id: Uuid, image_ref: &ImageRef, bytes: &[u8]) -> Result<(), ApiError> {
        tokio::fs::create_dir_all(&self.root).await?;
        tokio::fs::write(self.path_for(id, image_ref), bytes).await?;
        Ok(())
    }

    async fn load(&self, id: Uuid, image_ref: &ImageRef) -> Result<Vec<u8>, ApiError> {
        tokio::fs::read(self.path_for(id, image_ref))
            .await
            .map_err(|e| ApiError::not_found(format!("image for {id}: {e}")))
    }

    async fn delete(&self, id: Uuid, image_ref: &ImageRef) -> Result<(), ApiError> {
        match tokio::fs::remove_file(self.path_for(id, image_ref)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ApiError::from(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes_through_the_filesystem() {
        let dir = tempdir();
        let store = FilesystemImageStore::new(dir.clone());
        let id = Uuid::new_v4();
        let image_ref = ImageRef { ext: "png".into(), mime: "image/png".into() };

        store.save(id, &image_ref, b"fake-png-bytes").await.unwrap();
        let loaded = store.load(id, &image_ref).await.unwrap();
        assert_eq!(loaded, b"fake-png-bytes");

        store.delete(id, &image_ref).await.unwrap();
        assert!(store.load(id, &image_ref).await.is_err());

        std::fs::remove_dir_all(dir).ok();
    }

    #[tokio::test]
    async fn delete_of_already_missing_file_is_a_noop() {
        let dir = tempdir();
        let store = FilesystemImageStore::new(dir.clone());
        let image_ref = ImageRef { ext: "png".into(), mime: "image/png".into() };
        assert!(store.delete(Uuid::new_v4(), &image_ref).await.is_ok());
        std::fs::remove_dir_all(dir).ok();
    }

    fn tempdir() -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("tms-image-store-test-{}", Uuid::new_v4()));
        dir
    }
}
