//! Intervention strategies: one pure function per intervention type.
//!
//! Input is the moved share of every affected location (already scaled
//! by the intervention percentage). Output is the replacing set, tagged
//! `Replacing`. Material and supplier/location switches must conserve
//! volume year by year; that is checked here before anything leaves.

use crate::{
    error::{EngineError, EngineResult},
    geocoding::GeocodedLocation,
    intervention::{Intervention, InterventionType},
    record_merger::{merge_all, merge_records, yearly_totals},
    sourcing::{InterventionRole, LocationWarning, PurchaseLocation},
};
use std::collections::HashMap;
use uuid::Uuid;

/// Deterministic location id, so the same scenario always rebuilds
/// the same locations.
pub(crate) fn derived_location_id(parts: &[&str]) -> String {
    Uuid::new_v5(&Uuid::NAMESPACE_OID, parts.join("/").as_bytes()).to_string()
}

/// Dispatch on the intervention type.
pub fn apply_strategy(
    intervention: &Intervention,
    affected: &[PurchaseLocation],
    geocoded: Option<&GeocodedLocation>,
    tolerance: f64,
) -> EngineResult<Vec<PurchaseLocation>> {
    if affected.is_empty() {
        return Err(EngineError::NoMatchingSourcingData {
            intervention_id: intervention.id.clone(),
        });
    }

    let replacing = match intervention.intervention_type {
        InterventionType::NewMaterial => new_material(intervention, affected, geocoded)?,
        InterventionType::NewSupplierOrLocation => {
            new_supplier_or_location(intervention, affected, geocoded)
        }
        InterventionType::ChangeEfficiency => change_production_efficiency(intervention, affected)?,
    };

    if intervention.intervention_type != InterventionType::ChangeEfficiency {
        check_conservation(intervention, affected, &replacing, tolerance)?;
    }

    log::debug!(
        "intervention {} ({}): {} affected -> {} replacing",
        intervention.id,
        intervention.intervention_type.label(),
        affected.len(),
        replacing.len()
    );
    Ok(replacing)
}

/// Collapses every affected location into a single replacing location
/// whose volume per year is the sum across all of them.
pub fn new_material(
    intervention: &Intervention,
    affected: &[PurchaseLocation],
    geocoded: Option<&GeocodedLocation>,
) -> EngineResult<Vec<PurchaseLocation>> {
    let new_material_id = intervention.new_material_id.clone().ok_or_else(|| {
        EngineError::MissingInterventionField {
            intervention_id: intervention.id.clone(),
            field: "newMaterialId",
        }
    })?;
    let Some(template) = affected.first() else {
        return Ok(Vec::new());
    };

    let records = merge_all(affected.iter().map(|loc| loc.records.as_slice()));

    let mut location = replacing_from(
        intervention,
        template,
        derived_location_id(&[&intervention.id, "replacing", &new_material_id]),
    );
    location.material_id = new_material_id;
    location.supplier_id = intervention.new_supplier_id.clone();
    location.producer_id = intervention.new_producer_id.clone();
    location.records = records;
    relocate(&mut location, intervention, geocoded);

    Ok(vec![location])
}

/// Re-routes each affected location to the new supplier/location while
/// keeping its (material, business unit) identity. Locations sharing
/// that pair merge into one replacing location.
pub fn new_supplier_or_location(
    intervention: &Intervention,
    affected: &[PurchaseLocation],
    geocoded: Option<&GeocodedLocation>,
) -> Vec<PurchaseLocation> {
    let mut replacing: Vec<PurchaseLocation> = Vec::new();
    let mut by_pair: HashMap<(String, String), usize> = HashMap::new();

    for loc in affected {
        let pair = (loc.material_id.clone(), loc.business_unit_id.clone());
        if let Some(&idx) = by_pair.get(&pair) {
            let merged = merge_records(&replacing[idx].records, &loc.records);
            replacing[idx].records = merged;
            continue;
        }

        let mut location = replacing_from(
            intervention,
            loc,
            derived_location_id(&[
                &intervention.id,
                "replacing",
                &loc.material_id,
                &loc.business_unit_id,
            ]),
        );
        location.supplier_id = intervention.new_supplier_id.clone();
        location.producer_id = intervention.new_producer_id.clone();
        relocate(&mut location, intervention, geocoded);

        by_pair.insert(pair, replacing.len());
        replacing.push(location);
    }

    replacing
}

/// One replacing location per affected location, identity unchanged,
/// volumes scaled by the efficiency factor inside the effective window.
pub fn change_production_efficiency(
    intervention: &Intervention,
    affected: &[PurchaseLocation],
) -> EngineResult<Vec<PurchaseLocation>> {
    let factor = intervention.efficiency_factor.ok_or_else(|| {
        EngineError::MissingInterventionField {
            intervention_id: intervention.id.clone(),
            field: "efficiencyFactor",
        }
    })?;

    Ok(affected
        .iter()
        .map(|loc| {
            let mut location = replacing_from(
                intervention,
                loc,
                derived_location_id(&[&intervention.id, "replacing", &loc.id]),
            );
            location.replaces = Some(loc.id.clone());
            for record in &mut location.records {
                if intervention.is_effective_in(record.year) {
                    record.volume *= factor;
                }
            }
            location
        })
        .collect())
}

fn replacing_from(intervention: &Intervention, template: &PurchaseLocation, id: String) -> PurchaseLocation {
    PurchaseLocation {
        id,
        intervention_role: InterventionRole::Replacing,
        intervention_id: Some(intervention.id.clone()),
        replaces: None,
        warning: None,
        ..template.clone()
    }
}

/// Moves a replacing location to the intervention's new place, if any.
fn relocate(location: &mut PurchaseLocation, intervention: &Intervention, geocoded: Option<&GeocodedLocation>) {
    let Some(new_location) = &intervention.new_location else {
        return;
    };
    location.location_type = new_location.location_type;
    let resolved = geocoded.cloned().unwrap_or_default();
    location.admin_region_id = resolved.admin_region_id;
    location.geo_region_id = resolved.geo_region_id;
    location.warning = resolved.warning.map(|message| LocationWarning {
        intervention_id: intervention.id.clone(),
        message,
    });
}

fn check_conservation(
    intervention: &Intervention,
    affected: &[PurchaseLocation],
    replacing: &[PurchaseLocation],
    tolerance: f64,
) -> EngineResult<()> {
    let expected = yearly_totals(affected.iter().map(|l| l.records.as_slice()));
    let actual = yearly_totals(replacing.iter().map(|l| l.records.as_slice()));

    for (&year, &expected_volume) in &expected {
        let actual_volume = actual.get(&year).copied().unwrap_or(0.0);
        // Relative to the year's volume; summation order differs per side.
        if (expected_volume - actual_volume).abs() > tolerance * expected_volume.abs().max(1.0) {
            return Err(EngineError::ConservationViolated {
                intervention_id: intervention.id.clone(),
                year,
                expected: expected_volume,
                actual: actual_volume,
            });
        }
    }
    Ok(())
}
