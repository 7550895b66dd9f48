//! Turns the raw JSON an LLM stage returns into the typed, deduplicated
//! shapes stored on an [`crate::models::AnalysisResult`].
//!
//! Every per-item conversion is best-effort: a malformed entry is logged
//! and dropped rather than failing the whole analysis, matching how the
//! rest of the pipeline treats partially-bad LLM output as expected
//! noise, not a hard error.

use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::models::{Component, Connection, DreadDetails, Threat};
use crate::utils::text::{collapse_whitespace, title_case};

pub fn parse_components(raw: &Value) -> Vec<Component> {
    let Some(items) = raw.as_array() else { return Vec::new() };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RawComponent>(item.clone()) {
            Ok(c) => Some(Component {
                id: c.id.unwrap_or_else(|| c.name.clone()),
                name: c.name,
                component_type: c.component_type.unwrap_or_default(),
                description: c.description.unwrap_or_default(),
            }),
            Err(e) => {
                warn!(error = %e, "dropping malformed component");
                None
            }
        })
        .collect()
}

/// The wire field is literally named `from`, a Rust keyword; the raw
/// struct below absorbs the rename so the public [`Connection`] type
/// never has to carry it.
#[derive(Deserialize)]
struct RawConnection {
    #[serde(rename = "from")]
    from_id: Option<String>,
    #[serde(rename = "to")]
    to_id: Option<String>,
    protocol: Option<String>,
    description: Option<String>,
    encrypted: Option<bool>,
}

#[derive(Deserialize)]
struct RawComponent {
    id: Option<String>,
    name: String,
    #[serde(rename = "type")]
    component_type: Option<String>,
    description: Option<String>,
}

pub fn parse_connections(raw: &Value) -> Vec<Connection> {
    let Some(items) = raw.as_array() else { return Vec::new() };

    items
        .iter()
        .filter_map(|item| match serde_json::from_value::<RawConnection>(item.clone()) {
            Ok(c) => Some(Connection {
                from_id: c.from_id.unwrap_or_else(|| "unknown".to_string()),
                to_id: c.to_id.unwrap_or_else(|| "unknown".to_string()),
                protocol: c.protocol.unwrap_or_default(),
                description: c.description.unwrap_or_default(),
                encrypted: c.encrypted,
            }),
            Err(e) => {
                warn!(error = %e, "dropping malformed connection");
                None
            }
        })
        .collect()
}

#[derive(Deserialize)]
struct RawThreat {
    threat_type: Option<String>,
    description: Option<String>,
    #[serde(alias = "affected_component")]
    component_id: Option<String>,
    mitigation: Option<String>,
    dread: Option<RawDread>,
}

#[derive(Deserialize)]
struct RawDread {
    damage: Option<f64>,
    reproducibility: Option<f64>,
    exploitability: Option<f64>,
    affected_users: Option<f64>,
    discoverability: Option<f64>,
}

/// First-seen-wins dedup key: title-cased, trimmed threat type paired
/// with the whitespace-collapsed, lowercased, 500-char-truncated
/// description.
fn dedup_key(threat_type: &str, description: &str) -> (String, String) {
    let threat_type = title_case(threat_type.trim());
    let desc = collapse_whitespace(&description.to_lowercase());
    let desc: String = desc.chars().take(500).collect();
    (threat_type, desc)
}

pub fn parse_threats(raw: &Value) -> Vec<Threat> {
    let Some(items) = raw.as_array() else { return Vec::new() };

    let mut seen: HashSet<(String, String)> = HashSet::new();
    let mut threats = Vec::new();
    let total = items.len();

    for item in items {
        let raw_threat: RawThreat = match serde_json::from_value(item.clone()) {
            Ok(t) => t,
            Err(e) => {
                warn!(error = %e, "dropping malformed threat");
                continue;
            }
        };

        let threat_type = raw_threat.threat_type.unwrap_or_else(|| "Unknown".to_string());
        let description = raw_threat.description.unwrap_or_default();
        let key = dedup_key(&threat_type, &description);

        if !seen.insert(key) {
            continue;
        }

        let dread = raw_threat.dread.map(|d| {
            DreadDetails::new(
                d.damage.unwrap_or(0.0),
                d.reproducibility.unwrap_or(0.0),
                d.exploitability.unwrap_or(0.0),
                d.affected_users.unwrap_or(0.0),
                d.discoverability.unwrap_or(0.0),
            )
        });
        let dread_score = dread.map(|d| d.score());

        threats.push(Threat {
            threat_type: title_case(threat_type.trim()),
            description,
            component_id: raw_threat.component_id.unwrap_or_default(),
            mitigation: raw_threat.mitigation.unwrap_or_default(),
            dread,
            dread_score,
        });
    }

    if threats.len() != total {
        tracing::info!("Deduplicated threats: {} -> {}", total, threats.len());
    }

    threats.sort_by(|a, b| {
        b.dread_score.unwrap_or(0.0).partial_cmp(&a.dread_score.unwrap_or(0.0)).unwrap()
    });

    threats
}

/// Arithmetic mean of every threat's DREAD score, clamped to `[0, 10]`
/// and rounded to 2 decimals; `0.0` if there are no threats.
pub fn calculate_risk_score(threats: &[Threat]) -> f64 {
    if threats.is_empty() {
        return 0.0;
    }
    let sum: f64 = threats.iter().map(|t| t.dread_score.unwrap_or(0.0)).sum();
    let mean = (sum / threats.len() as f64).clamp(0.0, 10.0);
    (mean * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn drops_malformed_components_and_keeps_valid_ones() {
        let raw = json!([
            {"name": "API Gateway", "type": "service"},
            {"description": "missing name"},
        ]);
        let components = parse_components(&raw);
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].name, "API Gateway");
    }

    #[test]
    fn renames_from_to_from_id() {
        let raw = json!([{"from": "web", "to": "db", "protocol": "TCP"}]);
        let connections = parse_connections(&raw);
        assert_eq!(connections[0].from_id, "web");
        assert_eq!(connections[0].to_id, "db");
    }

    #[test]
    fn defaults_missing_connection_endpoints_to_unknown() {
        let raw = json!([{"protocol": "TCP"}]);
        let connections = parse_connections(&raw);
        assert_eq!(connections[0].from_id, "unknown");
        assert_eq!(connections[0].to_id, "unknown");
    }

    #[test]
    fn deduplicates_threats_by_normalized_type_and_description() {
        let raw = json!([
            {"threat_type": "spoofing", "description": "  Attacker   spoofs   identity  "},
            {"threat_type": "Spoofing", "description": "attacker spoofs identity"},
            {"threat_type": "tampering", "description": "data is tampered"},
        ]);
        let threats = parse_threats(&raw);
        assert_eq!(threats.len(), 2);
    }

    #[test]
    fn sorts_by_dread_score_descending() {
        let raw = json!([
            {"threat_type": "a", "description": "low", "dread": {
                "damage": 1.0, "reproducibility": 1.0, "exploitability": 1.0,
                "affected_users": 1.0, "discoverability": 1.0
            }},
            {"threat_type": "b", "description": "high", "dread": {
                "damage": 9.0, "reproducibility": 9.0, "exploitability": 9.0,
                "affected_users": 9.0, "discoverability": 9.0
            }},
        ]);
        let threats = parse_threats(&raw);
        assert_eq!(threats[0].threat_type, "B");
    }

    #[test]
    fn risk_score_is_zero_for_no_threats() {
        assert_eq!(calculate_risk_score(&[]), 0.0);
    }

    #[test]
    fn risk_score_is_rounded_to_two_decimals() {
        let threat = |score: f64| Threat {
            threat_type: "Spoofing".to_string(),
            description: String::new(),
            component_id: String::new(),
            mitigation: String::new(),
            dread: None,
            dread_score: Some(score),
        };
        let threats = vec![threat(5.0), threat(4.0), threat(4.0)];
        assert_eq!(calculate_risk_score(&threats), 4.33);
    }

    #[test]
    fn risk_score_is_clamped_to_ten() {
        let threat = Threat {
            threat_type: "Spoofing".to_string(),
            description: String::new(),
            component_id: String::new(),
            mitigation: String::new(),
            dread: None,
            dread_score: Some(15.0),
        };
        assert_eq!(calculate_risk_score(&[threat]), 10.0);
    }

    #[test]
    fn dedup_key_does_not_panic_on_a_multibyte_boundary() {
        // Each "é" is 2 bytes in UTF-8; byte index 500 would land mid-character.
        let description = "é".repeat(400);
        let key = dedup_key("Spoofing", &description);
        assert_eq!(key.1.chars().count(), 400);
    }

    #[test]
    fn dread_sub_scores_are_clamped_to_the_zero_to_ten_range() {
        let raw = json!([{
            "threat_type": "a",
            "description": "d",
            "dread": {
                "damage": 15.0, "reproducibility": -5.0, "exploitability": 5.0,
                "affected_users": 5.0, "discoverability": 5.0
            }
        }]);
        let threats = parse_threats(&raw);
        let dread = threats[0].dread.unwrap();
        assert_eq!(dread.damage, 10.0);
        assert_eq!(dread.reproducibility, 0.0);
    }
}
