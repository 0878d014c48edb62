//! Interventions, their filters, and the scenarios that own them.
//!
//! Interventions arrive already validated (existence of referenced
//! entities, coordinate ranges, enum values). The engine only checks
//! what it needs to compute: required fields per type and percentage.

use crate::{
    error::{EngineError, EngineResult},
    sourcing::{LocationType, PurchaseLocation},
    types::{EntityId, Year},
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InterventionType {
    NewMaterial,
    NewSupplierOrLocation,
    ChangeEfficiency,
}

impl InterventionType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NewMaterial           => "Switch to a new material",
            Self::NewSupplierOrLocation => "Source from new supplier or location",
            Self::ChangeEfficiency      => "Change production efficiency",
        }
    }
}

/// Selects purchase locations. Every populated list must contain the
/// location's value; unpopulated lists match anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub material_ids:      Option<Vec<EntityId>>,
    /// Matches either the t1 supplier or the producer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub supplier_ids:      Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub producer_ids:      Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub business_unit_ids: Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_region_ids:  Option<Vec<EntityId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location_types:    Option<Vec<LocationType>>,
}

impl LocationFilter {
    pub fn materials<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        Self {
            material_ids: Some(ids.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn with_business_units<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        self.business_unit_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn with_suppliers<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<EntityId>,
    {
        self.supplier_ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn matches(&self, location: &PurchaseLocation) -> bool {
        fn contains(list: &Option<Vec<EntityId>>, value: &str) -> bool {
            list.as_ref().map_or(true, |ids| ids.iter().any(|id| id == value))
        }
        fn contains_opt(list: &Option<Vec<EntityId>>, value: Option<&String>) -> bool {
            match (list, value) {
                (None, _)              => true,
                (Some(_), None)        => false,
                (Some(ids), Some(val)) => ids.iter().any(|id| id == val),
            }
        }

        let supplier_ok = match &self.supplier_ids {
            None => true,
            Some(ids) => [&location.supplier_id, &location.producer_id]
                .into_iter()
                .flatten()
                .any(|s| ids.contains(s)),
        };

        contains(&self.material_ids, &location.material_id)
            && supplier_ok
            && contains_opt(&self.producer_ids, location.producer_id.as_ref())
            && contains(&self.business_unit_ids, &location.business_unit_id)
            && contains_opt(&self.admin_region_ids, location.admin_region_id.as_ref())
            && self
                .location_types
                .as_ref()
                .map_or(true, |types| types.contains(&location.location_type))
    }
}

/// A new sourcing place introduced by an intervention, before geocoding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLocation {
    #[serde(rename = "type")]
    pub location_type: LocationType,
    pub country:       String,
    #[serde(default)]
    pub address:       Option<String>,
    #[serde(default)]
    pub lat:           Option<f64>,
    #[serde(default)]
    pub lng:           Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intervention {
    pub id:                String,
    #[serde(rename = "type")]
    pub intervention_type: InterventionType,
    pub start_year:        Year,
    #[serde(default)]
    pub end_year:          Option<Year>,
    /// Share (0, 100] of each affected location's volume that is moved.
    #[serde(default = "full_percentage")]
    pub percentage:        f64,
    #[serde(default)]
    pub filter:            LocationFilter,
    #[serde(default)]
    pub new_material_id:   Option<EntityId>,
    #[serde(default)]
    pub new_supplier_id:   Option<EntityId>,
    #[serde(default)]
    pub new_producer_id:   Option<EntityId>,
    #[serde(default)]
    pub new_location:      Option<NewLocation>,
    #[serde(default)]
    pub efficiency_factor: Option<f64>,
}

fn full_percentage() -> f64 {
    100.0
}

impl Intervention {
    pub fn new(id: impl Into<String>, intervention_type: InterventionType, start_year: Year) -> Self {
        Self {
            id: id.into(),
            intervention_type,
            start_year,
            end_year: None,
            percentage: full_percentage(),
            filter: LocationFilter::default(),
            new_material_id: None,
            new_supplier_id: None,
            new_producer_id: None,
            new_location: None,
            efficiency_factor: None,
        }
    }

    pub fn with_filter(mut self, filter: LocationFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_percentage(mut self, percentage: f64) -> Self {
        self.percentage = percentage;
        self
    }

    /// Moved share as a fraction in (0, 1].
    pub fn share(&self) -> f64 {
        self.percentage / 100.0
    }

    /// Whether `year` falls inside the intervention's effective window.
    pub fn is_effective_in(&self, year: Year) -> bool {
        year >= self.start_year && self.end_year.map_or(true, |end| year <= end)
    }

    /// Checks the fields this engine needs for the intervention's type.
    pub fn validate(&self) -> EngineResult<()> {
        if !(self.percentage > 0.0 && self.percentage <= 100.0) {
            return Err(EngineError::InvalidPercentage {
                intervention_id: self.id.clone(),
                percentage: self.percentage,
            });
        }
        let missing = |field: &'static str| EngineError::MissingInterventionField {
            intervention_id: self.id.clone(),
            field,
        };
        match self.intervention_type {
            InterventionType::NewMaterial if self.new_material_id.is_none() => {
                Err(missing("newMaterialId"))
            }
            InterventionType::NewSupplierOrLocation
                if self.new_supplier_id.is_none()
                    && self.new_producer_id.is_none()
                    && self.new_location.is_none() =>
            {
                Err(missing("newSupplierId"))
            }
            InterventionType::ChangeEfficiency if self.efficiency_factor.is_none() => {
                Err(missing("efficiencyFactor"))
            }
            _ => Ok(()),
        }
    }
}

/// An ordered set of interventions evaluated against a baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    pub id:            String,
    #[serde(default)]
    pub title:         Option<String>,
    pub interventions: Vec<Intervention>,
}

impl Scenario {
    pub fn new(id: impl Into<String>, interventions: Vec<Intervention>) -> Self {
        Self {
            id: id.into(),
            title: None,
            interventions,
        }
    }

    /// Hash of the serialized intervention set, used as a cache key component.
    pub fn intervention_set_hash(&self) -> EngineResult<u64> {
        crate::cache::content_hash(&self.interventions)
    }
}
