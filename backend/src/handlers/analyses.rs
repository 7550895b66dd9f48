//! The intake HTTP surface: upload, list/filter/paginate, detail,
//! image, logs, delete.

use std::sync::Arc;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::Json;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::AppState;
use crate::models::Analysis;
use crate::services::analysis_service::AnalysisListQuery;
use crate::utils::{ApiError, ApiResult};

#[derive(Debug, Deserialize, ToSchema)]
pub struct ListQueryParams {
    pub code: Option<String>,
    pub status: Option<String>,
    pub created_at_from: Option<NaiveDate>,
    pub created_at_to: Option<NaiveDate>,
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_size")]
    pub size: u32,
}

fn default_page() -> u32 {
    1
}

fn default_size() -> u32 {
    20
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnalysisListResponse {
    pub items: Vec<Analysis>,
    pub total: u64,
    pub page: u32,
    pub size: u32,
    pub pages: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogsResponse {
    pub logs: String,
}

/// Upload a diagram image and enqueue it for analysis.
#[utoipa::path(
    post,
    path = "/api/v1/analyses",
    responses(
        (status = 201, description = "Analysis created", body = Analysis),
        (status = 400, description = "Empty upload or unsupported content type"),
        (status = 413, description = "Upload exceeds the configured size limit"),
    ),
)]
pub async fn create_analysis(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<impl IntoResponse> {
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::validation_error(format!("malformed multipart body: {e}"))
    })? {
        if field.name() == Some("file") {
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::validation_error(format!("failed to read upload: {e}")))?
                    .to_vec(),
            );
        }
    }

    let bytes = bytes.ok_or_else(|| ApiError::validation_error("missing 'file' field"))?;
    let analysis = state.analysis_service.create(&bytes).await?;

    Ok((StatusCode::CREATED, Json(analysis)))
}

/// List analyses, optionally filtered and paginated.
#[utoipa::path(
    get,
    path = "/api/v1/analyses",
    responses((status = 200, description = "Page of analyses", body = AnalysisListResponse)),
)]
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let page = params.page.max(1);
    let size = params.size.max(1);

    let query = AnalysisListQuery {
        code: params.code,
        status: params.status,
        created_at_from: params.created_at_from,
        created_at_to: params.created_at_to,
        page,
        size,
    };

    let (items, total) = state.analysis_service.list(query).await?;
    let pages = total.div_ceil(size as u64).max(1);

    Ok(Json(AnalysisListResponse { items, total, page, size, pages }))
}

/// Fetch one analysis record in full, including its result if done.
#[utoipa::path(
    get,
    path = "/api/v1/analyses/{id}",
    responses(
        (status = 200, description = "The analysis record", body = Analysis),
        (status = 404, description = "No analysis with this id"),
    ),
)]
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let analysis = state.analysis_service.get(id).await?;
    Ok(Json(analysis))
}

/// Stream back the raw uploaded image with its detected MIME type.
#[utoipa::path(
    get,
    path = "/api/v1/analyses/{id}/image",
    responses(
        (status = 200, description = "Raw image bytes"),
        (status = 404, description = "No analysis with this id"),
    ),
)]
pub async fn get_analysis_image(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let (bytes, mime) = state.analysis_service.get_image(id).await?;
    Ok(([(header::CONTENT_TYPE, mime)], bytes))
}

/// Fetch the append-only processing log for an analysis.
#[utoipa::path(
    get,
    path = "/api/v1/analyses/{id}/logs",
    responses(
        (status = 200, description = "Processing log text", body = LogsResponse),
        (status = 404, description = "No analysis with this id"),
    ),
)]
pub async fn get_analysis_logs(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    let logs = state.analysis_service.get_logs(id).await?;
    Ok(Json(LogsResponse { logs }))
}

/// Delete an analysis record and its stored image.
#[utoipa::path(
    delete,
    path = "/api/v1/analyses/{id}",
    responses(
        (status = 204, description = "Deleted"),
        (status = 404, description = "No analysis with this id"),
    ),
)]
pub async fn delete_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<impl IntoResponse> {
    state.analysis_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

