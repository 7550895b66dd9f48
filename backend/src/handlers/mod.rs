pub mod analyses;
pub mod analyzer;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use crate::AppState;

/// The `/api/v1` router: the intake surface (`/analyses...`) plus the
/// synchronous analyzer surface (`/threat-model/analyze`).
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyses", post(analyses::create_analysis).get(analyses::list_analyses))
        .route(
            "/analyses/{id}",
            get(analyses::get_analysis).delete(analyses::delete_analysis),
        )
        .route("/analyses/{id}/image", get(analyses::get_analysis_image))
        .route("/analyses/{id}/logs", get(analyses::get_analysis_logs))
        .route("/threat-model/analyze", post(analyzer::analyze))
}
