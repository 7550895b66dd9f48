//! The synchronous analyzer surface: given an uploaded image, runs the
//! full three-stage pipeline in-process and returns the result
//! directly, with no job record involved.

use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, response::Response};

use crate::AppState;
use crate::models::AnalysisResult;
use crate::services::analysis_service::sniff_image;
use crate::utils::ApiError;

/// Run the threat-model pipeline against an uploaded diagram and
/// return the result immediately.
#[utoipa::path(
    post,
    path = "/api/v1/threat-model/analyze",
    responses(
        (status = 200, description = "Analysis result", body = AnalysisResult),
        (status = 400, description = "Empty or malformed upload"),
        (status = 415, description = "Unsupported image content type"),
        (status = 422, description = "Upload is not a plausible architecture diagram"),
        (status = 502, description = "Every configured LLM provider failed"),
    ),
)]
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, AnalyzerError> {
    let mut bytes: Option<Vec<u8>> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AnalyzerError(ApiError::validation_error(format!("malformed multipart body: {e}"))))?
    {
        if field.name() == Some("file") {
            bytes = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| AnalyzerError(ApiError::validation_error(format!("failed to read upload: {e}"))))?
                    .to_vec(),
            );
        }
    }

    let bytes = bytes.ok_or_else(|| AnalyzerError(ApiError::validation_error("missing 'file' field")))?;
    if bytes.is_empty() {
        return Err(AnalyzerError(ApiError::validation_error("uploaded file is empty")));
    }

    sniff_image(&bytes, &state.config.storage.allowed_image_types).map_err(AnalyzerError)?;

    let result: AnalysisResult =
        state.pipeline.run(&bytes, |_stage, _elapsed| {}).await.map_err(AnalyzerError)?;

    Ok(Json(result))
}

/// Wraps [`ApiError`] so this handler can answer `415`/`422` where the
/// intake surface's blanket `IntoResponse` impl would answer `400`.
pub struct AnalyzerError(ApiError);

impl IntoResponse for AnalyzerError {
    fn into_response(self) -> Response {
        match &self.0 {
            ApiError::InvalidFileType(_) => (StatusCode::UNSUPPORTED_MEDIA_TYPE, self.0.to_string()).into_response(),
            ApiError::GuardrailRejected(_) => (StatusCode::UNPROCESSABLE_ENTITY, self.0.to_string()).into_response(),
            _ => self.0.into_response(),
        }
    }
}
