//! The durable `Analysis` job record and its state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::result::AnalysisResult;

/// Handle to the stored image bytes for one analysis.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ImageRef {
    /// File extension without the dot: `png`, `jpeg`, `webp`, or `gif`.
    pub ext: String,
    /// Detected MIME type, e.g. `image/png`.
    pub mime: String,
}

impl ImageRef {
    pub fn file_name(&self, analysis_id: Uuid) -> String {
        format!("{analysis_id}.{}", self.ext)
    }
}

/// Lifecycle state of an [`Analysis`]. `DONE` and `FAILED` are terminal.
///
/// Kept as a flat string column (`OPEN`/`RUNNING`/`DONE`/`FAILED`) at the
/// persistence boundary; the `result`/`error_message` payload that belongs
/// to the terminal states lives in separate nullable columns rather than
/// inside this enum, so a row can be read with a single `SELECT *`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AnalysisStatus {
    Open,
    Running,
    Done,
    Failed,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "OPEN",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for AnalysisStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AnalysisStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(Self::Open),
            "RUNNING" => Ok(Self::Running),
            "DONE" => Ok(Self::Done),
            "FAILED" => Ok(Self::Failed),
            other => Err(format!("unknown analysis status: {other}")),
        }
    }
}

/// One uploaded diagram and its progress through the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct Analysis {
    pub id: Uuid,
    /// Shape `TMA-\d{8}`, unique across all records.
    pub code: String,
    pub image_ref: ImageRef,
    pub status: AnalysisStatus,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result: Option<AnalysisResult>,
    pub error_message: Option<String>,
    pub processing_logs: Option<String>,
}

impl Analysis {
    pub fn threat_count(&self) -> Option<usize> {
        self.result.as_ref().map(|r| r.threats.len())
    }

    pub fn component_count(&self) -> Option<usize> {
        self.result.as_ref().map(|r| r.components.len())
    }
}

/// Row shape as stored by [`crate::services::repository::SqliteAnalysisRepository`].
///
/// `sqlx::FromRow` is derived on this flat shape rather than on [`Analysis`]
/// directly because `status`, `image_ref`, and `result` all need a parsing
/// step the derive macro cannot express.
#[derive(Debug, sqlx::FromRow)]
pub struct AnalysisRow {
    pub id: String,
    pub code: String,
    pub image_ext: String,
    pub image_mime: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub result_json: Option<String>,
    pub error_message: Option<String>,
    pub processing_logs: Option<String>,
}

impl AnalysisRow {
    pub fn into_analysis(self) -> Result<Analysis, anyhow::Error> {
        let status: AnalysisStatus = self
            .status
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        let result = match self.result_json {
            Some(text) => Some(serde_json::from_str::<AnalysisResult>(&text)?),
            None => None,
        };
        Ok(Analysis {
            id: Uuid::parse_str(&self.id)?,
            code: self.code,
            image_ref: ImageRef { ext: self.image_ext, mime: self.image_mime },
            status,
            created_at: self.created_at,
            started_at: self.started_at,
            finished_at: self.finished_at,
            result,
            error_message: self.error_message,
            processing_logs: self.processing_logs,
        })
    }
}
