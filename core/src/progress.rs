//! Progress stream: coarse-grained stage notifications.
//!
//! RULE: Only the orchestration layer emits. Aggregation, comparison
//! and flattening are pure and never see a sink.

use crate::types::EntityId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::mpsc::Sender;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressStage {
    Validating,
    Importing,
    Geocoding,
    CalculatingImpact,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSide {
    Actual,
    Scenario,
    BaseScenario,
    ComparedScenario,
}

/// Every event the engine emits while working.
/// Variants are appended, never removed or reordered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    StageStarted {
        stage: ProgressStage,
        at: DateTime<Utc>,
    },
    InterventionApplied {
        intervention_id: String,
        intervention_type: String,
        canceled: usize,
        replacing: usize,
    },
    LocationWarning {
        intervention_id: String,
        location_id: EntityId,
        message: String,
    },
    TablesBuilt {
        side: TableSide,
        tables: usize,
    },
    Completed {
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    pub fn stage(stage: ProgressStage) -> Self {
        Self::StageStarted { stage, at: Utc::now() }
    }

    pub fn completed() -> Self {
        Self::Completed { at: Utc::now() }
    }
}

pub trait ProgressSink {
    fn emit(&mut self, event: EngineEvent);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn emit(&mut self, _event: EngineEvent) {}
}

impl ProgressSink for Vec<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        self.push(event);
    }
}

impl ProgressSink for Sender<EngineEvent> {
    fn emit(&mut self, event: EngineEvent) {
        // Receiver gone; nobody is listening.
        if self.send(event).is_err() {
            log::debug!("progress receiver dropped");
        }
    }
}

/// Stage names in emission order, for UIs and assertions.
pub fn stages(events: &[EngineEvent]) -> Vec<ProgressStage> {
    events
        .iter()
        .filter_map(|e| match e {
            EngineEvent::StageStarted { stage, .. } => Some(*stage),
            _ => None,
        })
        .collect()
}
