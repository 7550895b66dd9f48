pub mod analysis_service;
pub mod cache;
pub mod image_store;
pub mod llm;
pub mod pipeline;
pub mod queue;
pub mod repository;
pub mod worker;

pub use analysis_service::{AnalysisListQuery, AnalysisService};
pub use cache::{CacheBackend, InMemoryCacheBackend, NoopCacheBackend};
pub use image_store::{FilesystemImageStore, ImageStore};
pub use pipeline::ThreatModelPipeline;
pub use queue::{AnalysisJob, WorkQueue};
pub use repository::{AnalysisRepository, SqliteAnalysisRepository};
