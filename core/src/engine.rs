//! The impact engine: request orchestration over the pure components.
//!
//! EXECUTION ORDER (per request):
//!   1. Validating         request shape, grouping dimensions, interventions
//!   2. Importing          baseline snapshot taken for every side
//!   3. Geocoding          new locations introduced by interventions
//!   4. CalculatingImpact  apply scenarios, flatten, aggregate, compare
//!
//! RULES:
//!   - Only this layer emits progress. Components below it are pure.
//!   - The last baseline year drives `is_projected` on every side.
//!   - InputError and ComputationError abort the request; nothing is cached.
//!   - Cache keys cover the flattened rows, so entity names and indicator
//!     values from the caller are never served stale.

use crate::{
    aggregation::{aggregate, AggregationRequest, ComparisonMode, ImpactTable, SortKey},
    cache::{content_hash, AggregationCache, CacheKey},
    comparison::compare,
    config::{EngineConfig, SortOrder},
    error::{EngineError, EngineResult},
    geocoding::Geocoder,
    indicator::{
        flatten_locations, parse_group_by, EntityNames, FlattenContext, GroupingDimension, Indicator,
        IndicatorSource,
    },
    intervention::{LocationFilter, Scenario},
    progress::{EngineEvent, ProgressSink, ProgressStage, TableSide},
    ranking::{rank, RankedImpactTable},
    scenario::{apply_interventions, geocode_scenario, validate_scenario, ScenarioSnapshot},
    sourcing::{last_baseline_year, PurchaseLocation},
    types::{Year, YearRange},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortSpec {
    pub year:  Year,
    #[serde(default)]
    pub order: Option<SortOrder>,
}

/// What the caller asks to see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTableRequest {
    pub indicators:           Vec<Indicator>,
    /// Ordered dimension names, outermost first.
    pub group_by:             Vec<String>,
    pub years:                YearRange,
    #[serde(default)]
    pub filter:               LocationFilter,
    #[serde(default)]
    pub sort:                 Option<SortSpec>,
    #[serde(default)]
    pub max_ranking_entities: Option<usize>,
}

/// Collaborator-supplied inputs shared by every request.
#[derive(Clone, Copy)]
pub struct ImpactInput<'a> {
    pub baseline:   &'a [PurchaseLocation],
    pub indicators: &'a dyn IndicatorSource,
    pub geocoder:   &'a dyn Geocoder,
    pub names:      &'a EntityNames,
}

struct ResolvedRequest<'r> {
    request:  &'r ImpactTableRequest,
    group_by: Vec<GroupingDimension>,
    sort:     Option<SortKey>,
}

pub struct ImpactEngine {
    config: EngineConfig,
    cache:  AggregationCache,
}

impl ImpactEngine {
    pub fn new(config: EngineConfig) -> Self {
        let cache = AggregationCache::new(config.cache_capacity);
        Self { config, cache }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cached_entries(&self) -> usize {
        self.cache.len()
    }

    /// Materialises one scenario against the baseline.
    pub fn apply_scenario(
        &self,
        input: &ImpactInput<'_>,
        scenario: &Scenario,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<ScenarioSnapshot> {
        progress.emit(EngineEvent::stage(ProgressStage::Validating));
        validate_scenario(scenario)?;
        progress.emit(EngineEvent::stage(ProgressStage::Importing));
        progress.emit(EngineEvent::stage(ProgressStage::Geocoding));
        let geocoded = geocode_scenario(scenario, input.geocoder);
        progress.emit(EngineEvent::stage(ProgressStage::CalculatingImpact));
        let snapshot = apply_interventions(
            input.baseline,
            scenario,
            &geocoded,
            self.config.conservation_tolerance,
            progress,
        )?;
        progress.emit(EngineEvent::completed());
        Ok(snapshot)
    }

    /// Baseline-only tables.
    pub fn impact_table(
        &self,
        input: &ImpactInput<'_>,
        request: &ImpactTableRequest,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<Vec<ImpactTable>> {
        progress.emit(EngineEvent::stage(ProgressStage::Validating));
        let resolved = self.resolve(request)?;
        progress.emit(EngineEvent::stage(ProgressStage::Importing));
        let last_actual_year = last_baseline_year(input.baseline);

        progress.emit(EngineEvent::stage(ProgressStage::CalculatingImpact));
        let tables = self.tables_for(input, input.baseline, None, &resolved, last_actual_year)?;
        progress.emit(EngineEvent::TablesBuilt {
            side:   TableSide::Actual,
            tables: tables.len(),
        });
        progress.emit(EngineEvent::completed());
        Ok(Vec::clone(&tables))
    }

    /// Baseline on the base side, `scenario` on the compared side.
    pub fn actual_vs_scenario(
        &self,
        input: &ImpactInput<'_>,
        scenario: &Scenario,
        request: &ImpactTableRequest,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<Vec<ImpactTable>> {
        progress.emit(EngineEvent::stage(ProgressStage::Validating));
        let resolved = self.resolve(request)?;
        validate_scenario(scenario)?;

        progress.emit(EngineEvent::stage(ProgressStage::Importing));
        let last_actual_year = last_baseline_year(input.baseline);

        progress.emit(EngineEvent::stage(ProgressStage::Geocoding));
        let geocoded = geocode_scenario(scenario, input.geocoder);

        progress.emit(EngineEvent::stage(ProgressStage::CalculatingImpact));
        let snapshot = apply_interventions(
            input.baseline,
            scenario,
            &geocoded,
            self.config.conservation_tolerance,
            progress,
        )?;

        let actual = self.tables_for(input, input.baseline, None, &resolved, last_actual_year)?;
        progress.emit(EngineEvent::TablesBuilt {
            side:   TableSide::Actual,
            tables: actual.len(),
        });
        let scenario_tables = self.tables_for(
            input,
            &snapshot.locations,
            Some(scenario),
            &resolved,
            last_actual_year,
        )?;
        progress.emit(EngineEvent::TablesBuilt {
            side:   TableSide::Scenario,
            tables: scenario_tables.len(),
        });

        let compared = compare(&actual, &scenario_tables, ComparisonMode::ActualVsScenario, resolved.sort);
        log::info!("actual vs scenario {}: {} tables", scenario.id, compared.len());
        progress.emit(EngineEvent::completed());
        Ok(compared)
    }

    /// Two scenarios, neither treated as ground truth.
    pub fn scenario_vs_scenario(
        &self,
        input: &ImpactInput<'_>,
        base: &Scenario,
        compared: &Scenario,
        request: &ImpactTableRequest,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<Vec<ImpactTable>> {
        progress.emit(EngineEvent::stage(ProgressStage::Validating));
        let resolved = self.resolve(request)?;
        validate_scenario(base)?;
        validate_scenario(compared)?;

        progress.emit(EngineEvent::stage(ProgressStage::Importing));
        let last_actual_year = last_baseline_year(input.baseline);

        progress.emit(EngineEvent::stage(ProgressStage::Geocoding));
        let base_geocoded = geocode_scenario(base, input.geocoder);
        let compared_geocoded = geocode_scenario(compared, input.geocoder);

        progress.emit(EngineEvent::stage(ProgressStage::CalculatingImpact));
        let tolerance = self.config.conservation_tolerance;
        let base_snapshot = apply_interventions(input.baseline, base, &base_geocoded, tolerance, progress)?;
        let compared_snapshot =
            apply_interventions(input.baseline, compared, &compared_geocoded, tolerance, progress)?;

        let base_tables =
            self.tables_for(input, &base_snapshot.locations, Some(base), &resolved, last_actual_year)?;
        progress.emit(EngineEvent::TablesBuilt {
            side:   TableSide::BaseScenario,
            tables: base_tables.len(),
        });
        let compared_tables = self.tables_for(
            input,
            &compared_snapshot.locations,
            Some(compared),
            &resolved,
            last_actual_year,
        )?;
        progress.emit(EngineEvent::TablesBuilt {
            side:   TableSide::ComparedScenario,
            tables: compared_tables.len(),
        });

        let out = compare(&base_tables, &compared_tables, ComparisonMode::ScenarioVsScenario, resolved.sort);
        log::info!("scenario {} vs scenario {}: {} tables", base.id, compared.id, out.len());
        progress.emit(EngineEvent::completed());
        Ok(out)
    }

    /// Baseline tables capped to the top entities, the rest folded into `others`.
    pub fn ranked_impact_table(
        &self,
        input: &ImpactInput<'_>,
        request: &ImpactTableRequest,
        progress: &mut dyn ProgressSink,
    ) -> EngineResult<Vec<RankedImpactTable>> {
        let tables = self.impact_table(input, request, progress)?;
        let max_entities = request
            .max_ranking_entities
            .unwrap_or(self.config.max_ranking_entities);
        let sort = self
            .sort_key(request)
            .unwrap_or(SortKey {
                year:  request.years.start_year,
                order: self.config.default_sort_order,
            });

        Ok(tables
            .into_iter()
            .map(|table| rank(table, max_entities, sort))
            .collect())
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn sort_key(&self, request: &ImpactTableRequest) -> Option<SortKey> {
        request.sort.map(|s| SortKey {
            year:  s.year,
            order: s.order.unwrap_or(self.config.default_sort_order),
        })
    }

    fn resolve<'r>(&self, request: &'r ImpactTableRequest) -> EngineResult<ResolvedRequest<'r>> {
        if !request.years.is_valid() {
            return Err(EngineError::InvalidYearRange {
                start_year: request.years.start_year,
                end_year:   request.years.end_year,
            });
        }
        let group_by = parse_group_by(&request.group_by)?;
        Ok(ResolvedRequest {
            request,
            group_by,
            sort: self.sort_key(request),
        })
    }

    /// Flatten + aggregate one side. Aggregation goes through the cache when enabled.
    fn tables_for(
        &self,
        input: &ImpactInput<'_>,
        locations: &[PurchaseLocation],
        scenario: Option<&Scenario>,
        resolved: &ResolvedRequest<'_>,
        last_actual_year: Option<Year>,
    ) -> EngineResult<Arc<Vec<ImpactTable>>> {
        let request = resolved.request;
        let ctx = FlattenContext {
            indicators:       &request.indicators,
            group_by:         &resolved.group_by,
            years:            request.years,
            filter:           &request.filter,
            source:           input.indicators,
            names:            input.names,
            unassigned_label: &self.config.unassigned_label,
        };
        let rows = flatten_locations(locations, &ctx);
        let compute = || {
            aggregate(
                &rows,
                &AggregationRequest {
                    indicators: &request.indicators,
                    group_by: &resolved.group_by,
                    years: request.years,
                    last_actual_year,
                    sort: resolved.sort,
                },
            )
        };

        if !self.config.cache_enabled {
            return Ok(Arc::new(compute()?));
        }

        let key = CacheKey {
            baseline_version:      content_hash(input.baseline)?,
            intervention_set_hash: scenario.map(Scenario::intervention_set_hash).transpose()?,
            group_by:              resolved.group_by.clone(),
            years:                 request.years,
            request_hash:          content_hash(&(&request.indicators, &request.filter, &resolved.sort))?,
            rows_hash:             content_hash(&rows)?,
        };
        self.cache.get_or_try_insert_with(key, compute)
    }
}
