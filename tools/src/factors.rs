//! Impact factor table: the indicator collaborator used by the runner.
//! value = purchased volume × factor(indicator, material, region).

use scenario_impact_core::{
    indicator::IndicatorSource,
    sourcing::PurchaseLocation,
    types::{Amount, Year},
};
use serde::Deserialize;
use std::collections::HashMap;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactFactor {
    pub indicator_id:    String,
    pub material_id:     String,
    /// Region-specific factor; `None` is the material-wide default.
    #[serde(default)]
    pub admin_region_id: Option<String>,
    pub factor:          f64,
}

type FactorKey = (String, String, Option<String>);

#[derive(Debug, Default)]
pub struct FactorTable {
    factors: HashMap<FactorKey, f64>,
}

impl FactorTable {
    pub fn new(factors: Vec<ImpactFactor>) -> Self {
        let factors = factors
            .into_iter()
            .map(|f| ((f.indicator_id, f.material_id, f.admin_region_id), f.factor))
            .collect();
        Self { factors }
    }
}

impl IndicatorSource for FactorTable {
    fn indicator_value(
        &self,
        location: &PurchaseLocation,
        _year: Year,
        volume: Amount,
        indicator_id: &str,
    ) -> Option<Amount> {
        let regional = (
            indicator_id.to_string(),
            location.material_id.clone(),
            location.admin_region_id.clone(),
        );
        let material_wide = (indicator_id.to_string(), location.material_id.clone(), None);
        self.factors
            .get(&regional)
            .or_else(|| self.factors.get(&material_wide))
            .map(|factor| factor * volume)
    }
}
