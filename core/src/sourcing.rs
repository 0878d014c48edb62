//! Purchase data model: locations and their yearly purchase records.
//!
//! A PurchaseLocation is one distinct path a material takes to market.
//! Baseline locations come from data import; replacing and canceled
//! locations are produced by interventions. Once built for a scenario
//! snapshot a location is never mutated; a new computation rebuilds.

use crate::{
    record_merger::merge_records,
    types::{Amount, EntityId, Year},
};
use serde::{Deserialize, Serialize};

/// One year of purchased volume for a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PurchaseRecord {
    pub year:   Year,
    pub volume: Amount,
}

impl PurchaseRecord {
    pub fn new(year: Year, volume: Amount) -> Self {
        Self { year, volume }
    }
}

/// Reference from an indicator record back to the purchase record it
/// belongs to. (location, year) is unique by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseRecordRef {
    pub location_id: EntityId,
    pub year:        Year,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterventionRole {
    Baseline,
    Replacing,
    Canceled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LocationType {
    PointOfProduction,
    ProductionAggregationPoint,
    AdministrativeRegionOfProduction,
    CountryOfProduction,
    CountryOfDelivery,
    Unknown,
}

impl LocationType {
    pub fn label(&self) -> &'static str {
        match self {
            Self::PointOfProduction                => "point-of-production",
            Self::ProductionAggregationPoint       => "production-aggregation-point",
            Self::AdministrativeRegionOfProduction => "administrative-region-of-production",
            Self::CountryOfProduction              => "country-of-production",
            Self::CountryOfDelivery                => "country-of-delivery",
            Self::Unknown                          => "unknown",
        }
    }
}

/// A location could not be geocoded precisely. Travels with the row,
/// never aborts the computation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationWarning {
    pub intervention_id: String,
    pub message:         String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseLocation {
    pub id:                EntityId,
    pub material_id:       EntityId,
    #[serde(default)]
    pub supplier_id:       Option<EntityId>,
    #[serde(default)]
    pub producer_id:       Option<EntityId>,
    pub business_unit_id:  EntityId,
    #[serde(default)]
    pub admin_region_id:   Option<EntityId>,
    #[serde(default)]
    pub geo_region_id:     Option<EntityId>,
    pub location_type:     LocationType,
    #[serde(default = "default_role")]
    pub intervention_role: InterventionRole,
    /// Intervention that produced or canceled this location.
    #[serde(default)]
    pub intervention_id:   Option<String>,
    /// For canceled copies: the location whose share they carry.
    #[serde(default)]
    pub replaces:          Option<EntityId>,
    #[serde(default)]
    pub warning:           Option<LocationWarning>,
    pub records:           Vec<PurchaseRecord>,
}

fn default_role() -> InterventionRole {
    InterventionRole::Baseline
}

impl PurchaseLocation {
    /// A baseline location with no records yet.
    pub fn baseline(
        id: impl Into<EntityId>,
        material_id: impl Into<EntityId>,
        business_unit_id: impl Into<EntityId>,
        location_type: LocationType,
    ) -> Self {
        Self {
            id:                id.into(),
            material_id:       material_id.into(),
            supplier_id:       None,
            producer_id:       None,
            business_unit_id:  business_unit_id.into(),
            admin_region_id:   None,
            geo_region_id:     None,
            location_type,
            intervention_role: InterventionRole::Baseline,
            intervention_id:   None,
            replaces:          None,
            warning:           None,
            records:           Vec::new(),
        }
    }

    pub fn with_supplier(mut self, supplier_id: impl Into<EntityId>) -> Self {
        self.supplier_id = Some(supplier_id.into());
        self
    }

    pub fn with_producer(mut self, producer_id: impl Into<EntityId>) -> Self {
        self.producer_id = Some(producer_id.into());
        self
    }

    pub fn with_admin_region(mut self, admin_region_id: impl Into<EntityId>) -> Self {
        self.admin_region_id = Some(admin_region_id.into());
        self
    }

    pub fn with_records<I>(mut self, records: I) -> Self
    where
        I: IntoIterator<Item = (Year, Amount)>,
    {
        let records: Vec<PurchaseRecord> = records
            .into_iter()
            .map(|(year, volume)| PurchaseRecord::new(year, volume))
            .collect();
        // Sorted, one record per year; duplicate years are summed.
        self.records = merge_records(&records, &[]);
        self
    }

    pub fn volume_for(&self, year: Year) -> Amount {
        self.records
            .iter()
            .filter(|r| r.year == year)
            .map(|r| r.volume)
            .sum()
    }

    pub fn last_year(&self) -> Option<Year> {
        self.records.iter().map(|r| r.year).max()
    }

    pub fn is_active(&self) -> bool {
        self.intervention_role != InterventionRole::Canceled
    }

    pub fn record_ref(&self, year: Year) -> PurchaseRecordRef {
        PurchaseRecordRef {
            location_id: self.id.clone(),
            year,
        }
    }

    /// Copy of this location with every volume multiplied by `factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        let mut copy = self.clone();
        for record in &mut copy.records {
            record.volume *= factor;
        }
        copy
    }
}

/// Latest year with any purchase data among baseline locations.
pub fn last_baseline_year(locations: &[PurchaseLocation]) -> Option<Year> {
    locations
        .iter()
        .filter(|l| l.intervention_role == InterventionRole::Baseline)
        .filter_map(PurchaseLocation::last_year)
        .max()
}
