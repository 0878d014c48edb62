//! Impact aggregation: flat indicator rows → per-indicator row trees.
//!
//! RULE: Every row carries exactly one value per requested year, in
//! ascending order. Missing data is a 0, never a gap.
//! RULE: `is_projected` depends only on the last baseline year, so both
//! sides of a comparison agree on it.

use crate::{
    config::SortOrder,
    error::{EngineError, EngineResult},
    indicator::{FlatIndicatorRow, GroupingDimension, Indicator},
    types::{Amount, EntityId, Year, YearRange},
};
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ComparisonMode {
    ActualVsScenario,
    ScenarioVsScenario,
}

/// Second-side columns of a compared value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueComparison {
    pub compared_value:        Amount,
    pub absolute_difference:   Amount,
    /// `None` when the base value is zero.
    pub percentage_difference: Option<f64>,
}

impl ValueComparison {
    pub fn between(base: Amount, compared: Amount) -> Self {
        let absolute_difference = compared - base;
        Self {
            compared_value: compared,
            absolute_difference,
            percentage_difference: (base != 0.0).then(|| absolute_difference / base),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTableRowValue {
    pub year:         Year,
    pub value:        Amount,
    pub is_projected: bool,
    #[serde(flatten, default, skip_serializing_if = "Option::is_none")]
    pub comparison:   Option<ValueComparison>,
}

impl ImpactTableRowValue {
    pub fn plain(year: Year, value: Amount, is_projected: bool) -> Self {
        Self {
            year,
            value,
            is_projected,
            comparison: None,
        }
    }

    /// Value used for ordering: the difference on compared rows.
    pub fn sort_value(&self) -> Amount {
        self.comparison
            .map_or(self.value, |c| c.absolute_difference)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTableRow {
    /// Group key at this level; the path of keys from the root identifies the row.
    pub key:      EntityId,
    pub name:     String,
    pub values:   Vec<ImpactTableRowValue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ImpactTableRow>,
}

impl ImpactTableRow {
    pub fn value_for(&self, year: Year) -> Option<&ImpactTableRowValue> {
        self.values.iter().find(|v| v.year == year)
    }

    pub fn child(&self, key: &str) -> Option<&ImpactTableRow> {
        self.children.iter().find(|c| c.key == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactTable {
    pub indicator:        Indicator,
    pub group_by:         Vec<GroupingDimension>,
    pub rows:             Vec<ImpactTableRow>,
    pub year_sum:         Vec<ImpactTableRowValue>,
    pub purchased_volume: Vec<ImpactTableRowValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode:             Option<ComparisonMode>,
}

impl ImpactTable {
    pub fn row(&self, key: &str) -> Option<&ImpactTableRow> {
        self.rows.iter().find(|r| r.key == key)
    }

    pub fn years(&self) -> impl Iterator<Item = Year> + '_ {
        self.year_sum.iter().map(|v| v.year)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub year:  Year,
    pub order: SortOrder,
}

/// Shape of one aggregation pass.
#[derive(Debug, Clone)]
pub struct AggregationRequest<'a> {
    pub indicators:       &'a [Indicator],
    pub group_by:         &'a [GroupingDimension],
    pub years:            YearRange,
    pub last_actual_year: Option<Year>,
    pub sort:             Option<SortKey>,
}

impl AggregationRequest<'_> {
    pub fn is_projected(&self, year: Year) -> bool {
        self.last_actual_year.map_or(false, |last| year > last)
    }
}

/// One table per requested indicator, in request order. Indicators
/// with no rows still get a table with zero totals.
pub fn aggregate(rows: &[FlatIndicatorRow], request: &AggregationRequest<'_>) -> EngineResult<Vec<ImpactTable>> {
    if !request.years.is_valid() {
        return Err(EngineError::InvalidYearRange {
            start_year: request.years.start_year,
            end_year:   request.years.end_year,
        });
    }

    let mut by_indicator: HashMap<&str, Vec<&FlatIndicatorRow>> = HashMap::new();
    for row in rows.iter().filter(|r| request.years.contains(r.year)) {
        by_indicator.entry(row.indicator_id.as_str()).or_default().push(row);
    }

    let mut tables = Vec::with_capacity(request.indicators.len());
    for indicator in request.indicators {
        let indicator_rows = by_indicator.remove(indicator.id.as_str()).unwrap_or_default();
        let tree = build_level(&indicator_rows, 0, request);

        let year_sum = request
            .years
            .years()
            .map(|year| {
                let total = tree.iter().map(|r| value_at(&r.values, year)).sum();
                ImpactTableRowValue::plain(year, total, request.is_projected(year))
            })
            .collect();
        let purchased_volume = request
            .years
            .years()
            .map(|year| {
                let volume = indicator_rows
                    .iter()
                    .filter(|r| r.year == year)
                    .map(|r| r.volume)
                    .sum();
                ImpactTableRowValue::plain(year, volume, request.is_projected(year))
            })
            .collect();

        let table = ImpactTable {
            indicator: indicator.clone(),
            group_by: request.group_by.to_vec(),
            rows: tree,
            year_sum,
            purchased_volume,
            mode: None,
        };
        check_complete(&table, request.years.len())?;
        log::debug!(
            "aggregated {} rows into {} top-level groups for {}",
            indicator_rows.len(),
            table.rows.len(),
            indicator.id
        );
        tables.push(table);
    }

    Ok(tables)
}

/// Groups `rows` on path element `depth`, recursing until the path ends.
fn build_level(rows: &[&FlatIndicatorRow], depth: usize, request: &AggregationRequest<'_>) -> Vec<ImpactTableRow> {
    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Vec<&FlatIndicatorRow>> = HashMap::new();
    for &row in rows {
        let Some(key) = row.group_key_path.get(depth) else {
            continue;
        };
        groups
            .entry(key.as_str())
            .or_insert_with(|| {
                order.push(key.as_str());
                Vec::new()
            })
            .push(row);
    }

    let first_year = request.years.start_year;
    let mut level: Vec<(ImpactTableRow, Amount)> = order
        .into_iter()
        .filter_map(|key| groups.remove(key).map(|members| (key, members)))
        .map(|(key, members)| {
            let values = request
                .years
                .years()
                .map(|year| {
                    let value = members.iter().filter(|r| r.year == year).map(|r| r.impact_value).sum();
                    ImpactTableRowValue::plain(year, value, request.is_projected(year))
                })
                .collect();
            let first_year_volume: Amount = members
                .iter()
                .filter(|r| r.year == first_year)
                .map(|r| r.volume)
                .sum();
            let row = ImpactTableRow {
                key:      key.to_string(),
                name:     members[0].name_path.get(depth).cloned().unwrap_or_else(|| key.to_string()),
                values,
                children: build_level(&members, depth + 1, request),
            };
            (row, first_year_volume)
        })
        .collect();

    match request.sort {
        Some(sort) => {
            let mut rows: Vec<ImpactTableRow> = level.into_iter().map(|(row, _)| row).collect();
            sort_rows(&mut rows, sort);
            rows
        }
        None => {
            level.sort_by(|(a, va), (b, vb)| {
                vb.partial_cmp(va)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| a.name.cmp(&b.name))
            });
            level.into_iter().map(|(row, _)| row).collect()
        }
    }
}

/// Orders siblings by their value (or difference, on compared rows) at
/// `sort.year`, recursively. Ties break on name, ascending.
pub fn sort_rows(rows: &mut [ImpactTableRow], sort: SortKey) {
    rows.sort_by(|a, b| {
        let va = a.value_for(sort.year).map_or(0.0, ImpactTableRowValue::sort_value);
        let vb = b.value_for(sort.year).map_or(0.0, ImpactTableRowValue::sort_value);
        let by_value = match sort.order {
            SortOrder::Asc  => va.partial_cmp(&vb),
            SortOrder::Desc => vb.partial_cmp(&va),
        };
        by_value
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.name.cmp(&b.name))
    });
    for row in rows.iter_mut() {
        sort_rows(&mut row.children, sort);
    }
}

pub(crate) fn value_at(values: &[ImpactTableRowValue], year: Year) -> Amount {
    values.iter().find(|v| v.year == year).map_or(0.0, |v| v.value)
}

/// Fails when any row lacks a value for some requested year.
pub fn check_complete(table: &ImpactTable, expected: usize) -> EngineResult<()> {
    fn walk(rows: &[ImpactTableRow], expected: usize) -> EngineResult<()> {
        for row in rows {
            if row.values.len() != expected {
                return Err(EngineError::IncompleteRow {
                    row: row.key.clone(),
                    expected,
                    actual: row.values.len(),
                });
            }
            walk(&row.children, expected)?;
        }
        Ok(())
    }

    if table.year_sum.len() != expected {
        return Err(EngineError::IncompleteRow {
            row: format!("{} year sum", table.indicator.id),
            expected,
            actual: table.year_sum.len(),
        });
    }
    walk(&table.rows, expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(year: Year, path: &[&str], volume: Amount, value: Amount) -> FlatIndicatorRow {
        FlatIndicatorRow {
            year,
            indicator_id:   "water".into(),
            group_key_path: path.iter().map(|s| s.to_string()).collect(),
            name_path:      path.iter().map(|s| s.to_string()).collect(),
            volume,
            impact_value:   value,
        }
    }

    fn request<'a>(indicators: &'a [Indicator], group_by: &'a [GroupingDimension]) -> AggregationRequest<'a> {
        AggregationRequest {
            indicators,
            group_by,
            years: YearRange::new(2020, 2022),
            last_actual_year: Some(2021),
            sort: None,
        }
    }

    #[test]
    fn nested_groups_sum_into_parents() {
        let indicators = [Indicator::new("water", "Water", "m3")];
        let dims = [GroupingDimension::Material, GroupingDimension::T1Supplier];
        let rows = vec![
            flat(2020, &["M1", "S1"], 10.0, 1.0),
            flat(2020, &["M1", "S2"], 20.0, 2.0),
            flat(2021, &["M2", "S1"], 5.0, 4.0),
        ];

        let tables = aggregate(&rows, &request(&indicators, &dims)).unwrap();
        let m1 = tables[0].row("M1").unwrap();

        assert_eq!(value_at(&m1.values, 2020), 3.0);
        assert_eq!(m1.children.len(), 2);
        assert_eq!(value_at(&tables[0].year_sum, 2021), 4.0);
        assert_eq!(value_at(&tables[0].purchased_volume, 2020), 30.0);
        assert!(tables[0].year_sum[2].is_projected);
        assert!(!tables[0].year_sum[1].is_projected);
    }

    #[test]
    fn siblings_order_by_first_year_volume_then_name() {
        let indicators = [Indicator::new("water", "Water", "m3")];
        let dims = [GroupingDimension::Material];
        let rows = vec![
            flat(2020, &["B"], 5.0, 100.0),
            flat(2020, &["C"], 50.0, 1.0),
            flat(2020, &["A"], 5.0, 7.0),
        ];

        let tables = aggregate(&rows, &request(&indicators, &dims)).unwrap();
        let keys: Vec<&str> = tables[0].rows.iter().map(|r| r.key.as_str()).collect();

        assert_eq!(keys, vec!["C", "A", "B"]);
    }

    #[test]
    fn explicit_sort_key_orders_by_value() {
        let indicators = [Indicator::new("water", "Water", "m3")];
        let dims = [GroupingDimension::Material];
        let rows = vec![flat(2021, &["A"], 1.0, 3.0), flat(2021, &["B"], 9.0, 1.0)];
        let mut req = request(&indicators, &dims);
        req.sort = Some(SortKey { year: 2021, order: SortOrder::Asc });

        let tables = aggregate(&rows, &req).unwrap();

        assert_eq!(tables[0].rows[0].key, "B");
    }

    #[test]
    fn inverted_year_range_is_rejected() {
        let indicators = [Indicator::new("water", "Water", "m3")];
        let mut req = request(&indicators, &[]);
        req.years = YearRange::new(2023, 2020);
        assert!(matches!(aggregate(&[], &req), Err(EngineError::InvalidYearRange { .. })));
    }

    #[test]
    fn oversized_year_range_is_rejected() {
        let indicators = [Indicator::new("water", "Water", "m3")];
        let mut req = request(&indicators, &[]);
        req.years = YearRange::new(i32::MIN, i32::MAX);
        assert!(matches!(aggregate(&[], &req), Err(EngineError::InvalidYearRange { .. })));
    }
}
