//! Job lifecycle manager: the `AnalysisService` that the intake HTTP
//! surface calls into. Wraps the repository, image store, and work
//! queue behind the operations the spec names (`create`, `list`,
//! `get`, `get_image`, `get_logs`, `delete`).

use std::sync::Arc;

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::models::{Analysis, AnalysisStatus, ImageRef};
use crate::services::image_store::ImageStore;
use crate::services::queue::{AnalysisJob, WorkQueue};
use crate::services::repository::{AnalysisFilter, AnalysisRepository};
use crate::utils::ApiError;

/// Raw query parameters for [`AnalysisService::list`], before they are
/// turned into an [`AnalysisFilter`].
#[derive(Debug, Clone, Default)]
pub struct AnalysisListQuery {
    pub code: Option<String>,
    pub status: Option<String>,
    pub created_at_from: Option<NaiveDate>,
    pub created_at_to: Option<NaiveDate>,
    pub page: u32,
    pub size: u32,
}

pub struct AnalysisService {
    repository: Arc<dyn AnalysisRepository>,
    image_store: Arc<dyn ImageStore>,
    queue: Arc<dyn WorkQueue>,
    storage: StorageConfig,
}

impl AnalysisService {
    pub fn new(
        repository: Arc<dyn AnalysisRepository>,
        image_store: Arc<dyn ImageStore>,
        queue: Arc<dyn WorkQueue>,
        storage: StorageConfig,
    ) -> Self {
        Self { repository, image_store, queue, storage }
    }

    /// Validates, persists, and enqueues one uploaded image.
    pub async fn create(&self, image_bytes: &[u8]) -> Result<Analysis, ApiError> {
        if image_bytes.is_empty() {
            return Err(ApiError::validation_error("uploaded file is empty"));
        }

        let max_bytes = self.storage.max_upload_bytes() as usize;
        if image_bytes.len() > max_bytes {
            return Err(ApiError::FileTooLarge { size: image_bytes.len(), limit: max_bytes });
        }

        let image_ref = sniff_image(image_bytes, &self.storage.allowed_image_types)?;

        let analysis = self.repository.insert_open(image_ref.clone()).await?;
        self.image_store.save(analysis.id, &image_ref, image_bytes).await?;
        self.queue.enqueue(AnalysisJob { analysis_id: analysis.id }).await?;

        Ok(analysis)
    }

    pub async fn list(&self, query: AnalysisListQuery) -> Result<(Vec<Analysis>, u64), ApiError> {
        let status = match query.status {
            Some(s) => Some(
                s.parse::<AnalysisStatus>()
                    .map_err(|e| ApiError::validation_error(format!("invalid status: {e}")))?,
            ),
            None => None,
        };
        let filter = AnalysisFilter {
            code: query.code,
            status,
            created_at_from: query.created_at_from,
            created_at_to: query.created_at_to,
        };
        let page = query.page.max(1);
        let size = query.size.clamp(1, 200);
        self.repository.list(&filter, page, size).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Analysis, ApiError> {
        self.repository.get(id).await
    }

    pub async fn get_image(&self, id: Uuid) -> Result<(Vec<u8>, String), ApiError> {
        let analysis = self.repository.get(id).await?;
        let bytes = self.image_store.load(id, &analysis.image_ref).await?;
        Ok((bytes, analysis.image_ref.mime))
    }

    pub async fn get_logs(&self, id: Uuid) -> Result<String, ApiError> {
        let analysis = self.repository.get(id).await?;
        Ok(analysis.processing_logs.unwrap_or_default())
    }

    /// Deletes the record and its stored image. Safe against a worker
    /// in-flight on the same record: the worker re-reads before each
    /// write and will find the record gone on its next attempt.
    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let analysis = self.repository.get(id).await?;
        self.repository.delete(id).await?;
        self.image_store.delete(id, &analysis.image_ref).await?;
        Ok(())
    }
}

/// Detects the MIME type of `bytes` from magic numbers and rejects it
/// unless it is in `allowed`. Returns the [`ImageRef`] used to name the
/// stored file.
pub(crate) fn sniff_image(bytes: &[u8], allowed: &[String]) -> Result<ImageRef, ApiError> {
    let format = image::guess_format(bytes)
        .map_err(|_| ApiError::InvalidFileType("unrecognized image format".to_string()))?;

    let (ext, mime) = match format {
        image::ImageFormat::Png => ("png", "image/png"),
        image::ImageFormat::Jpeg => ("jpeg", "image/jpeg"),
        image::ImageFormat::WebP => ("webp", "image/webp"),
        image::ImageFormat::Gif => ("gif", "image/gif"),
        other => {
            return Err(ApiError::InvalidFileType(format!("{other:?}")));
        }
    };

    if !allowed.iter().any(|a| a == mime) {
        return Err(ApiError::InvalidFileType(mime.to_string()));
    }

    Ok(ImageRef { ext: ext.to_string(), mime: mime.to_string() })
}
