//! The parsed, normalized output of a full threat-model run.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A component extracted from the architecture diagram.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Component {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub component_type: String,
    #[serde(default)]
    pub description: String,
}

/// A connection between two [`Component`]s.
///
/// `from`/`to` are the field names the LLM emits, but `from` is a Rust
/// keyword, so the wire shape is handled by a private raw struct
/// (`utils::json_extract::RawConnection`) and only the renamed, public
/// field lands here.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Connection {
    pub from_id: String,
    pub to_id: String,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub description: String,
    pub encrypted: Option<bool>,
}

/// The five DREAD dimensions, each on a 0-10 scale.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct DreadDetails {
    pub damage: f64,
    pub reproducibility: f64,
    pub exploitability: f64,
    pub affected_users: f64,
    pub discoverability: f64,
}

impl DreadDetails {
    /// Builds a `DreadDetails`, clamping every dimension to `[0, 10]` so a
    /// model ignoring the requested scale can't push the aggregate score
    /// out of range.
    pub fn new(
        damage: f64,
        reproducibility: f64,
        exploitability: f64,
        affected_users: f64,
        discoverability: f64,
    ) -> Self {
        Self {
            damage: damage.clamp(0.0, 10.0),
            reproducibility: reproducibility.clamp(0.0, 10.0),
            exploitability: exploitability.clamp(0.0, 10.0),
            affected_users: affected_users.clamp(0.0, 10.0),
            discoverability: discoverability.clamp(0.0, 10.0),
        }
    }

    /// Arithmetic mean of the five dimensions.
    pub fn score(&self) -> f64 {
        (self.damage
            + self.reproducibility
            + self.exploitability
            + self.affected_users
            + self.discoverability)
            / 5.0
    }
}

/// One identified threat, after STRIDE classification and DREAD scoring.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Threat {
    pub threat_type: String,
    pub description: String,
    #[serde(default)]
    pub component_id: String,
    #[serde(default)]
    pub mitigation: String,
    #[serde(rename = "dread_details")]
    pub dread: Option<DreadDetails>,
    pub dread_score: Option<f64>,
}

/// Overall severity band, derived from `risk_score`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// Strict `<` thresholds: `<3` LOW, `<6` MEDIUM, `<8` HIGH, else CRITICAL.
    pub fn from_score(score: f64) -> Self {
        if score < 3.0 {
            Self::Low
        } else if score < 6.0 {
            Self::Medium
        } else if score < 8.0 {
            Self::High
        } else {
            Self::Critical
        }
    }
}

/// The full, normalized analysis result stored on a [`super::Analysis`]
/// once it reaches `DONE`.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    pub model_used: String,
    pub components: Vec<Component>,
    pub connections: Vec<Connection>,
    pub threats: Vec<Threat>,
    pub risk_score: f64,
    pub risk_level: RiskLevel,
    pub processing_time_secs: Option<f64>,
}

impl AnalysisResult {
    pub fn threat_count(&self) -> usize {
        self.threats.len()
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }
}
