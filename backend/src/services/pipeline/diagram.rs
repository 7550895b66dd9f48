//! Stage 1: vision call that turns the uploaded image into a components
//! + connections graph.

use serde_json::Value;

use crate::models::{Component, Connection};
use crate::services::llm::{AllProvidersFailed, FallbackRunner};
use crate::services::pipeline::normalize;
use crate::utils::json_extract::parse_json_response;

pub const SYSTEM_PROMPT: &str = "You are a security architect. Given an architecture \
diagram image, identify every component (service, datastore, queue, external \
actor) and every connection between components. Assign each component a short \
stable id (slug of its name) and reference that id from every connection's \
from/to. Respond with a single JSON object: {\"components\": [{\"id\": str, \
\"name\": str, \"type\": str, \"description\": str}], \"connections\": \
[{\"from\": str, \"to\": str, \"protocol\": str, \"description\": str, \
\"encrypted\": bool}]}. Respond with JSON only.";

/// Rejects a response with neither a non-empty `components` nor a
/// non-empty `connections` array, so a provider returning an empty or
/// error-shaped JSON object is treated as a failure and the next
/// provider is tried instead of caching a useless result.
fn has_components_or_connections(text: &str) -> bool {
    let Some(parsed) = parse_json_response(text) else { return false };
    let has_components = parsed["components"].as_array().is_some_and(|a| !a.is_empty());
    let has_connections = parsed["connections"].as_array().is_some_and(|a| !a.is_empty());
    has_components || has_connections
}

pub async fn run(
    runner: &FallbackRunner,
    image_bytes: &[u8],
) -> Result<(Vec<Component>, Vec<Connection>), AllProvidersFailed> {
    let validator: &(dyn Fn(&str) -> bool + Sync) = &has_components_or_connections;
    let raw_text =
        runner.run_vision("diagram", SYSTEM_PROMPT, image_bytes, Some(validator)).await?;

    let parsed: Value = parse_json_response(&raw_text).unwrap_or(Value::Null);
    let components = normalize::parse_components(&parsed["components"]);
    let connections = normalize::parse_connections(&parsed["connections"]);

    Ok((components, connections))
}
