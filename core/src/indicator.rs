//! Indicator values and the flat row stream fed to aggregation.
//!
//! The engine never derives coefficients. Values arrive through an
//! `IndicatorSource`: either an index of pre-computed indicator records
//! or any collaborator able to price a (location, year, volume).

use crate::{
    error::{EngineError, EngineResult},
    intervention::LocationFilter,
    sourcing::{InterventionRole, PurchaseLocation, PurchaseRecordRef},
    types::{Amount, EntityId, Year, YearRange},
};
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fmt, str::FromStr};

/// Environmental impact metric shown as one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub id:         String,
    pub short_name: String,
    pub unit:       String,
}

impl Indicator {
    pub fn new(id: impl Into<String>, short_name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            id:         id.into(),
            short_name: short_name.into(),
            unit:       unit.into(),
        }
    }

    /// "Water use (m3)"
    pub fn label(&self) -> String {
        format!("{} ({})", self.short_name, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndicatorRecord {
    pub purchase_record_ref: PurchaseRecordRef,
    pub indicator_id:        String,
    pub value:               Amount,
}

pub trait IndicatorSource: Send + Sync {
    /// Indicator value for `volume` purchased at `location` in `year`.
    /// `None` when the collaborator has nothing for this record.
    fn indicator_value(
        &self,
        location: &PurchaseLocation,
        year: Year,
        volume: Amount,
        indicator_id: &str,
    ) -> Option<Amount>;
}

impl<F> IndicatorSource for F
where
    F: Fn(&PurchaseLocation, Year, Amount, &str) -> Option<Amount> + Send + Sync,
{
    fn indicator_value(
        &self,
        location: &PurchaseLocation,
        year: Year,
        volume: Amount,
        indicator_id: &str,
    ) -> Option<Amount> {
        self(location, year, volume, indicator_id)
    }
}

/// Pre-computed indicator records indexed by (purchase record, indicator).
/// Only covers locations the records were computed for.
#[derive(Debug, Clone, Default)]
pub struct IndicatorRecordIndex {
    values: HashMap<(PurchaseRecordRef, String), Amount>,
}

impl IndicatorRecordIndex {
    pub fn new(records: impl IntoIterator<Item = IndicatorRecord>) -> Self {
        let values = records
            .into_iter()
            .map(|r| ((r.purchase_record_ref, r.indicator_id), r.value))
            .collect();
        Self { values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl IndicatorSource for IndicatorRecordIndex {
    fn indicator_value(
        &self,
        location: &PurchaseLocation,
        year: Year,
        _volume: Amount,
        indicator_id: &str,
    ) -> Option<Amount> {
        self.values
            .get(&(location.record_ref(year), indicator_id.to_string()))
            .copied()
    }
}

// ── Grouping ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GroupingDimension {
    #[serde(rename = "material")]
    Material,
    #[serde(rename = "business-unit")]
    BusinessUnit,
    #[serde(rename = "region")]
    Region,
    #[serde(rename = "t1Supplier")]
    T1Supplier,
    #[serde(rename = "producer")]
    Producer,
    #[serde(rename = "location-type")]
    LocationType,
}

impl GroupingDimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Material     => "material",
            Self::BusinessUnit => "business-unit",
            Self::Region       => "region",
            Self::T1Supplier   => "t1Supplier",
            Self::Producer     => "producer",
            Self::LocationType => "location-type",
        }
    }

    /// Group key of `location` on this dimension, if it has one.
    pub fn key_of(&self, location: &PurchaseLocation) -> Option<EntityId> {
        match self {
            Self::Material     => Some(location.material_id.clone()),
            Self::BusinessUnit => Some(location.business_unit_id.clone()),
            Self::Region       => location.admin_region_id.clone(),
            Self::T1Supplier   => location.supplier_id.clone(),
            Self::Producer     => location.producer_id.clone(),
            Self::LocationType => Some(location.location_type.label().to_string()),
        }
    }
}

impl fmt::Display for GroupingDimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GroupingDimension {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "material"      => Ok(Self::Material),
            "business-unit" => Ok(Self::BusinessUnit),
            "region"        => Ok(Self::Region),
            "t1Supplier"    => Ok(Self::T1Supplier),
            "producer"      => Ok(Self::Producer),
            "location-type" => Ok(Self::LocationType),
            other => Err(EngineError::UnknownGroupingDimension {
                name: other.to_string(),
            }),
        }
    }
}

pub fn parse_group_by<S: AsRef<str>>(names: &[S]) -> EngineResult<Vec<GroupingDimension>> {
    names.iter().map(|n| n.as_ref().parse()).collect()
}

/// Display names for entity ids. Unknown ids display as themselves.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityNames(HashMap<EntityId, String>);

impl EntityNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, id: impl Into<EntityId>, name: impl Into<String>) -> Self {
        self.0.insert(id.into(), name.into());
        self
    }

    pub fn name_of<'a>(&'a self, id: &'a str) -> &'a str {
        self.0.get(id).map_or(id, String::as_str)
    }
}

// ── Flat rows ─────────────────────────────────────────────────────────────

/// One (year, indicator, group path) contribution of one location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatIndicatorRow {
    pub year:           Year,
    pub indicator_id:   String,
    pub group_key_path: Vec<EntityId>,
    pub name_path:      Vec<String>,
    pub volume:         Amount,
    pub impact_value:   Amount,
}

/// Everything `flatten_locations` needs besides the locations.
pub struct FlattenContext<'a> {
    pub indicators:       &'a [Indicator],
    pub group_by:         &'a [GroupingDimension],
    pub years:            YearRange,
    pub filter:           &'a LocationFilter,
    pub source:           &'a dyn IndicatorSource,
    pub names:            &'a EntityNames,
    pub unassigned_label: &'a str,
}

/// Turns active locations into flat indicator rows for the requested
/// years. Canceled locations never contribute.
pub fn flatten_locations(locations: &[PurchaseLocation], ctx: &FlattenContext<'_>) -> Vec<FlatIndicatorRow> {
    let mut rows = Vec::new();

    for location in locations
        .iter()
        .filter(|l| l.intervention_role != InterventionRole::Canceled)
        .filter(|l| ctx.filter.matches(l))
    {
        let (group_key_path, name_path): (Vec<EntityId>, Vec<String>) = ctx
            .group_by
            .iter()
            .map(|dim| match dim.key_of(location) {
                Some(key) => {
                    let name = ctx.names.name_of(&key).to_string();
                    (key, name)
                }
                None => (ctx.unassigned_label.to_string(), ctx.unassigned_label.to_string()),
            })
            .unzip();

        for record in location.records.iter().filter(|r| ctx.years.contains(r.year)) {
            for indicator in ctx.indicators {
                let value =
                    ctx.source.indicator_value(location, record.year, record.volume, &indicator.id);
                let Some(value) = value else {
                    log::debug!(
                        "no {} value for location {} in {}",
                        indicator.id,
                        location.id,
                        record.year
                    );
                    continue;
                };
                rows.push(FlatIndicatorRow {
                    year:           record.year,
                    indicator_id:   indicator.id.clone(),
                    group_key_path: group_key_path.clone(),
                    name_path:      name_path.clone(),
                    volume:         record.volume,
                    impact_value:   value,
                });
            }
        }
    }

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sourcing::LocationType;

    #[test]
    fn unknown_dimension_is_an_input_error() {
        let err = parse_group_by(&["material", "colour"]).unwrap_err();
        assert!(matches!(err, EngineError::UnknownGroupingDimension { ref name } if name == "colour"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Input);
    }

    #[test]
    fn missing_attribute_groups_under_unassigned() {
        let loc = PurchaseLocation::baseline("L1", "M1", "B1", LocationType::CountryOfProduction)
            .with_records([(2020, 10.0)]);
        let indicators = [Indicator::new("water", "Water use", "m3")];
        let source = |_: &PurchaseLocation, _: Year, volume: Amount, _: &str| Some(volume * 2.0);
        let ctx = FlattenContext {
            indicators:       &indicators,
            group_by:         &[GroupingDimension::Material, GroupingDimension::Producer],
            years:            YearRange::new(2020, 2020),
            filter:           &LocationFilter::default(),
            source:           &source,
            names:            &EntityNames::new().with("M1", "Cotton"),
            unassigned_label: "Unassigned",
        };

        let rows = flatten_locations(&[loc], &ctx);

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].group_key_path, vec!["M1", "Unassigned"]);
        assert_eq!(rows[0].name_path, vec!["Cotton", "Unassigned"]);
        assert_eq!(rows[0].impact_value, 20.0);
    }

    #[test]
    fn record_index_looks_up_by_location_and_year() {
        let loc = PurchaseLocation::baseline("L1", "M1", "B1", LocationType::Unknown);
        let index = IndicatorRecordIndex::new([IndicatorRecord {
            purchase_record_ref: loc.record_ref(2021),
            indicator_id:        "water".into(),
            value:               3.5,
        }]);
        assert_eq!(index.indicator_value(&loc, 2021, 1.0, "water"), Some(3.5));
        assert_eq!(index.indicator_value(&loc, 2020, 1.0, "water"), None);
    }
}
