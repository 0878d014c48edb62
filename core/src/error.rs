use crate::types::Year;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    // ── Input errors ───────────────────────────────────────────
    #[error("No matching sourcing data for intervention filter (intervention '{intervention_id}')")]
    NoMatchingSourcingData { intervention_id: String },

    #[error("Unknown grouping dimension '{name}'")]
    UnknownGroupingDimension { name: String },

    #[error("Intervention '{intervention_id}' is missing required field '{field}'")]
    MissingInterventionField {
        intervention_id: String,
        field: &'static str,
    },

    #[error("Invalid year range: {start_year}..={end_year}")]
    InvalidYearRange { start_year: Year, end_year: Year },

    #[error("Intervention '{intervention_id}' has invalid percentage {percentage}")]
    InvalidPercentage {
        intervention_id: String,
        percentage: f64,
    },

    #[error("Cannot flatten tables with different comparison modes into one report")]
    MixedReportModes,

    // ── Computation errors (defects) ───────────────────────────
    #[error(
        "Conservation violated by intervention '{intervention_id}' in {year}: \
         expected {expected}, got {actual}"
    )]
    ConservationViolated {
        intervention_id: String,
        year: Year,
        expected: f64,
        actual: f64,
    },

    #[error("Row '{row}' has {actual} year values, expected {expected}")]
    IncompleteRow {
        row: String,
        expected: usize,
        actual: usize,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Coarse classification used by callers to map errors onto their own surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Input,
    Computation,
    Internal,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoMatchingSourcingData { .. }
            | Self::UnknownGroupingDimension { .. }
            | Self::MissingInterventionField { .. }
            | Self::InvalidYearRange { .. }
            | Self::InvalidPercentage { .. }
            | Self::MixedReportModes => ErrorKind::Input,
            Self::ConservationViolated { .. } | Self::IncompleteRow { .. } => {
                ErrorKind::Computation
            }
            Self::Serialization(_) | Self::Other(_) => ErrorKind::Internal,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
