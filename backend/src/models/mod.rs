pub mod analysis;
pub mod result;

pub use analysis::{Analysis, AnalysisRow, AnalysisStatus, ImageRef};
pub use result::{
    AnalysisResult, Component, Connection, DreadDetails, RiskLevel, Threat,
};
