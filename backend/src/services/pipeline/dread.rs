//! Stage 3: text call that scores each stage-2 threat on the five DREAD
//! dimensions.

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::warn;

use crate::models::{DreadDetails, Threat};
use crate::services::llm::{AllProvidersFailed, FallbackRunner};
use crate::utils::json_extract::parse_json_response;

pub const SYSTEM_PROMPT: &str = "You are a security architect scoring threats with the \
DREAD model. For each threat below, score Damage, Reproducibility, \
Exploitability, Affected Users, and Discoverability on a 0-10 scale. Respond \
with a single JSON object: {\"scores\": [{\"damage\": num, \"reproducibility\": \
num, \"exploitability\": num, \"affected_users\": num, \"discoverability\": \
num}]} with one entry per threat, in the same order they were given. Respond \
with JSON only.";

#[derive(Deserialize)]
struct RawScore {
    damage: Option<f64>,
    reproducibility: Option<f64>,
    exploitability: Option<f64>,
    affected_users: Option<f64>,
    discoverability: Option<f64>,
}

/// Scores every threat, enriching each with a [`DreadDetails`] and
/// derived `dread_score`. A threat with no matching score entry (the
/// model returned fewer scores than threats) keeps `dread = None`
/// rather than being dropped.
pub async fn run(
    runner: &FallbackRunner,
    threats: Vec<Threat>,
) -> Result<Vec<Threat>, AllProvidersFailed> {
    if threats.is_empty() {
        return Ok(threats);
    }

    let summary: Vec<Value> = threats
        .iter()
        .map(|t| {
            json!({
                "threat_type": t.threat_type,
                "description": t.description,
                "component_id": t.component_id,
            })
        })
        .collect();

    let messages = vec![
        ("system".to_string(), SYSTEM_PROMPT.to_string()),
        ("user".to_string(), json!({"threats": summary}).to_string()),
    ];

    let raw_text = runner.run_text("dread", &messages, None).await?;
    let parsed: Value = parse_json_response(&raw_text).unwrap_or(Value::Null);
    let scores: Vec<RawScore> = parsed["scores"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match serde_json::from_value(item.clone()) {
                    Ok(score) => Some(score),
                    Err(e) => {
                        warn!(error = %e, "dropping malformed DREAD score");
                        None
                    }
                })
                .collect()
        })
        .unwrap_or_default();

    if scores.len() != threats.len() {
        warn!(
            expected = threats.len(),
            received = scores.len(),
            "DREAD stage returned a different number of scores than threats submitted"
        );
    }

    let mut scored = Vec::with_capacity(threats.len());
    for (i, mut threat) in threats.into_iter().enumerate() {
        if let Some(score) = scores.get(i) {
            let dread = DreadDetails::new(
                score.damage.unwrap_or(0.0),
                score.reproducibility.unwrap_or(0.0),
                score.exploitability.unwrap_or(0.0),
                score.affected_users.unwrap_or(0.0),
                score.discoverability.unwrap_or(0.0),
            );
            threat.dread_score = Some(dread.score());
            threat.dread = Some(dread);
        }
        scored.push(threat);
    }

    scored.sort_by(|a, b| {
        b.dread_score.unwrap_or(0.0).partial_cmp(&a.dread_score.unwrap_or(0.0)).unwrap()
    });

    Ok(scored)
}
