//! Scenario impact engine: intervention application over purchase data,
//! and year-indexed impact aggregation and comparison.

pub mod aggregation;
pub mod cache;
pub mod comparison;
pub mod config;
pub mod engine;
pub mod error;
pub mod geocoding;
pub mod indicator;
pub mod intervention;
pub mod intervention_strategy;
pub mod progress;
pub mod ranking;
pub mod record_merger;
pub mod report;
pub mod scenario;
pub mod sourcing;
pub mod types;

pub use engine::{ImpactEngine, ImpactInput, ImpactTableRequest};
pub use error::{EngineError, EngineResult};
