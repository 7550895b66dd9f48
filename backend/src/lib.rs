//! Threat modeling service: ingests architecture-diagram images and
//! returns a structured threat model (components, connections, STRIDE
//! threats with DREAD scores, and an aggregate risk score/level).

pub mod config;
pub mod handlers;
pub mod models;
pub mod services;
pub mod utils;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::Config;
use crate::services::cache::{CacheBackend, InMemoryCacheBackend, NoopCacheBackend};
use crate::services::image_store::FilesystemImageStore;
use crate::services::llm::{FallbackRunner, build_providers};
use crate::services::pipeline::{HeuristicGuardrail, ThreatModelPipeline};
use crate::services::queue::MpscWorkQueue;
use crate::services::repository::SqliteAnalysisRepository;
use crate::services::worker::Worker;
use crate::services::{AnalysisService, WorkQueue};

/// Shared state reachable from every handler.
pub struct AppState {
    pub config: Config,
    pub analysis_service: Arc<AnalysisService>,
    pub pipeline: Arc<ThreatModelPipeline>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::analyses::create_analysis,
        handlers::analyses::list_analyses,
        handlers::analyses::get_analysis,
        handlers::analyses::get_analysis_image,
        handlers::analyses::get_analysis_logs,
        handlers::analyses::delete_analysis,
        handlers::analyzer::analyze,
    ),
    components(schemas(
        models::Analysis,
        models::AnalysisStatus,
        models::ImageRef,
        models::AnalysisResult,
        models::Component,
        models::Connection,
        models::Threat,
        models::DreadDetails,
        models::RiskLevel,
        handlers::analyses::AnalysisListResponse,
        handlers::analyses::LogsResponse,
    )),
    tags((name = "threat-modeling", description = "Diagram intake and threat-model analysis"))
)]
pub struct ApiDoc;

/// Builds the pipeline object shared by the worker and the direct
/// analyzer endpoint.
fn build_pipeline(config: &Config) -> ThreatModelPipeline {
    let providers = build_providers(&config.llm);
    let cache: Arc<dyn CacheBackend> = if config.cache.backend == "none" {
        Arc::new(NoopCacheBackend)
    } else {
        Arc::new(InMemoryCacheBackend::new())
    };
    let runner = FallbackRunner::new(
        providers,
        cache,
        config.cache.ttl_secs,
        std::time::Duration::from_secs(config.llm.vision_timeout_secs),
        std::time::Duration::from_secs(config.llm.text_timeout_secs),
    );
    let guardrail = Arc::new(HeuristicGuardrail::new(&config.pipeline));
    ThreatModelPipeline::new(runner, guardrail, config.llm.providers.first().map(|p| p.name.clone()).unwrap_or_else(|| "unconfigured".to_string()))
}

/// Assembles the router, the `AppState`, and spawns the configured
/// number of worker loops draining the in-process queue. Returns the
/// router ready to be served.
pub async fn build_app(config: Config, pool: sqlx::SqlitePool) -> anyhow::Result<Router> {
    sqlx::migrate!("./migrations").run(&pool).await?;

    let repository = Arc::new(SqliteAnalysisRepository::new(pool));
    let image_store = Arc::new(FilesystemImageStore::new(config.storage.upload_dir.clone()));
    let (queue, receiver) = MpscWorkQueue::channel(1024);
    let queue: Arc<dyn WorkQueue> = Arc::new(queue);

    let analysis_service =
        Arc::new(AnalysisService::new(repository.clone(), image_store.clone(), queue, config.storage.clone()));
    let pipeline = Arc::new(build_pipeline(&config));

    let worker = Arc::new(Worker::new(
        repository,
        image_store,
        pipeline.clone(),
        std::time::Duration::from_secs(config.pipeline.job_timeout_secs),
    ));
    let receiver = Arc::new(Mutex::new(receiver));
    for _ in 0..config.server.worker_count {
        let worker = worker.clone();
        let receiver = receiver.clone();
        tokio::spawn(async move { worker.run(receiver).await });
    }

    let max_upload_bytes = config.storage.max_upload_bytes();
    let cors = build_cors_layer(&config.cors.allowed_origins);

    let state = Arc::new(AppState { config, analysis_service, pipeline });

    let app = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .nest("/api/v1", handlers::router())
        .with_state(state)
        .layer(DefaultBodyLimit::max(max_upload_bytes as usize))
        .layer(cors)
        .layer(TraceLayer::new_for_http());

    Ok(app)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
    } else {
        let parsed: Vec<_> =
            origins.iter().filter_map(|o| o.parse::<axum::http::HeaderValue>().ok()).collect();
        CorsLayer::new().allow_origin(parsed).allow_methods(Any).allow_headers(Any)
    }
}

