//! Stage 2: text call that classifies STRIDE threats against the
//! components and connections extracted in stage 1.

use serde_json::{Value, json};

use crate::models::{Component, Connection, Threat};
use crate::services::llm::{AllProvidersFailed, FallbackRunner};
use crate::services::pipeline::normalize;
use crate::utils::json_extract::parse_json_response;

pub const SYSTEM_PROMPT: &str = "You are a security architect applying the STRIDE \
threat model (Spoofing, Tampering, Repudiation, Information Disclosure, Denial \
of Service, Elevation of Privilege) to an architecture. Given the components \
and connections below, list every plausible threat. Respond with a single \
JSON object: {\"threats\": [{\"threat_type\": str, \"description\": str, \
\"component_id\": str, \"mitigation\": str}]}. Respond with JSON only.";

pub async fn run(
    runner: &FallbackRunner,
    components: &[Component],
    connections: &[Connection],
) -> Result<Vec<Threat>, AllProvidersFailed> {
    let context = json!({"components": components, "connections": connections}).to_string();

    let messages = vec![
        ("system".to_string(), SYSTEM_PROMPT.to_string()),
        ("user".to_string(), context),
    ];

    let raw_text = runner.run_text("stride", &messages, None).await?;

    let parsed: Value = parse_json_response(&raw_text).unwrap_or(Value::Null);
    Ok(normalize::parse_threats(&parsed["threats"]))
}
