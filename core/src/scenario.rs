//! Intervention application: baseline + scenario → scenario snapshot.
//!
//! RULE: The baseline slice is never mutated. Each computation builds
//! its own location set; identical inputs yield identical snapshots.
//! RULE: Interventions apply in order, each over the active view left
//! by the previous ones. Canceled locations are never matched again.

use crate::{
    error::{EngineError, EngineResult},
    geocoding::{GeocodedLocation, Geocoder},
    intervention::{Intervention, Scenario},
    intervention_strategy::{apply_strategy, derived_location_id},
    progress::{EngineEvent, ProgressSink, ProgressStage},
    sourcing::{last_baseline_year, InterventionRole, LocationWarning, PurchaseLocation},
    types::Year,
};
use serde::{Deserialize, Serialize};

/// The merged view of one scenario: untouched baseline, canceled
/// originals kept for audit, and the replacing locations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioSnapshot {
    pub scenario_id:      String,
    pub locations:        Vec<PurchaseLocation>,
    pub warnings:         Vec<LocationWarning>,
    /// Latest year of baseline data the snapshot was built from.
    pub last_actual_year: Option<Year>,
}

impl ScenarioSnapshot {
    /// Locations counted on the scenario side.
    pub fn active(&self) -> impl Iterator<Item = &PurchaseLocation> {
        self.locations.iter().filter(|l| l.is_active())
    }

    pub fn canceled(&self) -> impl Iterator<Item = &PurchaseLocation> {
        self.locations
            .iter()
            .filter(|l| l.intervention_role == InterventionRole::Canceled)
    }

    pub fn replacing(&self) -> impl Iterator<Item = &PurchaseLocation> {
        self.locations
            .iter()
            .filter(|l| l.intervention_role == InterventionRole::Replacing)
    }

    pub fn produced_by<'a>(&'a self, intervention_id: &'a str) -> impl Iterator<Item = &'a PurchaseLocation> {
        self.locations
            .iter()
            .filter(move |l| l.intervention_id.as_deref() == Some(intervention_id))
    }
}

pub fn validate_scenario(scenario: &Scenario) -> EngineResult<()> {
    scenario.interventions.iter().try_for_each(Intervention::validate)
}

/// Resolves every new location introduced by the scenario, one entry
/// per intervention (`None` when it introduces no new place).
pub fn geocode_scenario(scenario: &Scenario, geocoder: &dyn Geocoder) -> Vec<Option<GeocodedLocation>> {
    scenario
        .interventions
        .iter()
        .map(|iv| {
            let resolved = geocoder.geocode(iv.new_location.as_ref()?);
            if let Some(warning) = &resolved.warning {
                log::warn!("intervention {}: {warning}", iv.id);
            }
            Some(resolved)
        })
        .collect()
}

/// Applies every intervention of `scenario` in order. `geocoded` is the
/// output of `geocode_scenario` for the same scenario.
pub fn apply_interventions(
    baseline: &[PurchaseLocation],
    scenario: &Scenario,
    geocoded: &[Option<GeocodedLocation>],
    tolerance: f64,
    progress: &mut dyn ProgressSink,
) -> EngineResult<ScenarioSnapshot> {
    let mut locations = baseline.to_vec();
    let mut warnings = Vec::new();

    for (idx, intervention) in scenario.interventions.iter().enumerate() {
        let geo = geocoded.get(idx).and_then(Option::as_ref);
        let applied = apply_intervention(&locations, intervention, geo, tolerance)?;

        for location in applied.replacing.iter() {
            if let Some(warning) = &location.warning {
                progress.emit(EngineEvent::LocationWarning {
                    intervention_id: warning.intervention_id.clone(),
                    location_id:     location.id.clone(),
                    message:         warning.message.clone(),
                });
                warnings.push(warning.clone());
            }
        }
        progress.emit(EngineEvent::InterventionApplied {
            intervention_id:   intervention.id.clone(),
            intervention_type: intervention.intervention_type.label().to_string(),
            canceled:          applied.canceled,
            replacing:         applied.replacing.len(),
        });
        log::info!(
            "scenario {}: applied intervention {} ({} canceled, {} replacing)",
            scenario.id,
            intervention.id,
            applied.canceled,
            applied.replacing.len()
        );

        locations = applied.locations;
    }

    Ok(ScenarioSnapshot {
        scenario_id: scenario.id.clone(),
        locations,
        warnings,
        last_actual_year: last_baseline_year(baseline),
    })
}

/// Validate, geocode and apply in one call, emitting the scenario stages.
pub fn apply_scenario(
    baseline: &[PurchaseLocation],
    scenario: &Scenario,
    geocoder: &dyn Geocoder,
    tolerance: f64,
    progress: &mut dyn ProgressSink,
) -> EngineResult<ScenarioSnapshot> {
    progress.emit(EngineEvent::stage(ProgressStage::Validating));
    validate_scenario(scenario)?;

    progress.emit(EngineEvent::stage(ProgressStage::Importing));
    log::debug!("scenario {}: {} baseline locations", scenario.id, baseline.len());

    progress.emit(EngineEvent::stage(ProgressStage::Geocoding));
    let geocoded = geocode_scenario(scenario, geocoder);

    apply_interventions(baseline, scenario, &geocoded, tolerance, progress)
}

struct AppliedIntervention {
    locations: Vec<PurchaseLocation>,
    replacing: Vec<PurchaseLocation>,
    canceled:  usize,
}

fn apply_intervention(
    current: &[PurchaseLocation],
    intervention: &Intervention,
    geocoded: Option<&GeocodedLocation>,
    tolerance: f64,
) -> EngineResult<AppliedIntervention> {
    let affected: Vec<usize> = current
        .iter()
        .enumerate()
        .filter(|(_, l)| l.is_active() && intervention.filter.matches(l))
        .map(|(idx, _)| idx)
        .collect();
    if affected.is_empty() {
        return Err(EngineError::NoMatchingSourcingData {
            intervention_id: intervention.id.clone(),
        });
    }

    let share = intervention.share();
    let moved: Vec<PurchaseLocation> = affected.iter().map(|&i| current[i].scaled(share)).collect();
    let replacing = apply_strategy(intervention, &moved, geocoded, tolerance)?;

    let mut locations = current.to_vec();
    let mut canceled_copies = Vec::new();
    let full = share >= 1.0;

    for (&idx, moved_share) in affected.iter().zip(moved) {
        if full {
            let original = &mut locations[idx];
            original.intervention_role = InterventionRole::Canceled;
            original.intervention_id = Some(intervention.id.clone());
            continue;
        }
        let original_id = locations[idx].id.clone();
        canceled_copies.push(PurchaseLocation {
            id: derived_location_id(&[&intervention.id, "canceled", &original_id]),
            intervention_role: InterventionRole::Canceled,
            intervention_id: Some(intervention.id.clone()),
            replaces: Some(original_id),
            ..moved_share
        });
        locations[idx] = locations[idx].scaled(1.0 - share);
    }

    locations.extend(canceled_copies);
    locations.extend(replacing.iter().cloned());

    Ok(AppliedIntervention {
        locations,
        replacing,
        canceled: affected.len(),
    })
}
