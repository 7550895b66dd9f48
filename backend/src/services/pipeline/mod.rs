//! Orchestrates the three-stage threat-model run: diagram extraction,
//! STRIDE threat identification, then DREAD scoring.

pub mod diagram;
pub mod dread;
pub mod guardrail;
pub mod normalize;
pub mod stride;

pub use guardrail::{DiagramGuardrail, HeuristicGuardrail};

use std::sync::Arc;
use std::time::Instant;

use tracing::info;

use crate::models::{AnalysisResult, RiskLevel};
use crate::services::llm::{AllProvidersFailed, FallbackRunner};
use crate::utils::ApiError;

pub struct ThreatModelPipeline {
    runner: FallbackRunner,
    guardrail: Arc<dyn DiagramGuardrail>,
    model_label: String,
}

impl ThreatModelPipeline {
    pub fn new(
        runner: FallbackRunner,
        guardrail: Arc<dyn DiagramGuardrail>,
        model_label: impl Into<String>,
    ) -> Self {
        Self { runner, guardrail, model_label: model_label.into() }
    }

    /// Runs the full pipeline against `image_bytes`, returning the
    /// normalized [`AnalysisResult`] on success.
    ///
    /// `on_stage(name, elapsed_secs)` fires once per completed stage.
    /// The pipeline itself is stateless and does not know about job
    /// records; the worker uses this hook to append a processing-log
    /// line per stage without the pipeline reaching into the
    /// repository.
    pub async fn run(
        &self,
        image_bytes: &[u8],
        mut on_stage: impl FnMut(&str, f64),
    ) -> Result<AnalysisResult, ApiError> {
        let overall_start = Instant::now();

        self.guardrail
            .check(image_bytes)
            .await
            .map_err(ApiError::GuardrailRejected)?;

        let stage_start = Instant::now();
        let (components, connections) = diagram::run(&self.runner, image_bytes)
            .await
            .map_err(provider_failure)?;
        let elapsed = stage_start.elapsed().as_secs_f64();
        info!(
            elapsed_secs = elapsed,
            components = components.len(),
            connections = connections.len(),
            "diagram stage complete"
        );
        on_stage("diagram", elapsed);

        let stage_start = Instant::now();
        let threats = stride::run(&self.runner, &components, &connections)
            .await
            .map_err(provider_failure)?;
        let elapsed = stage_start.elapsed().as_secs_f64();
        info!(elapsed_secs = elapsed, threats = threats.len(), "stride stage complete");
        on_stage("stride", elapsed);

        let stage_start = Instant::now();
        let threats = dread::run(&self.runner, threats).await.map_err(provider_failure)?;
        let elapsed = stage_start.elapsed().as_secs_f64();
        info!(elapsed_secs = elapsed, "dread stage complete");
        on_stage("dread", elapsed);

        let risk_score = normalize::calculate_risk_score(&threats);
        let risk_level = RiskLevel::from_score(risk_score);

        info!(
            total_elapsed_secs = overall_start.elapsed().as_secs_f64(),
            risk_score, ?risk_level, "analysis pipeline complete"
        );

        Ok(AnalysisResult {
            model_used: self.model_label.clone(),
            components,
            connections,
            threats,
            risk_score,
            risk_level,
            processing_time_secs: Some(overall_start.elapsed().as_secs_f64()),
        })
    }
}

fn provider_failure(failure: AllProvidersFailed) -> ApiError {
    ApiError::AllProvidersFailed(failure.to_string())
}
