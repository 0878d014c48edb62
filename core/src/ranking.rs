//! Ranked impact tables: top N entities plus an "others" block.

use crate::{
    aggregation::{sort_rows, ImpactTable, ImpactTableRow, ImpactTableRowValue, SortKey, ValueComparison},
    config::SortOrder,
    types::{Amount, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedOthers {
    pub aggregated_values:             Vec<ImpactTableRowValue>,
    pub number_of_aggregated_entities: usize,
    pub sort:                          SortOrder,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedImpactTable {
    #[serde(flatten)]
    pub table:  ImpactTable,
    pub others: AggregatedOthers,
}

/// Sorts top-level rows by `sort` and keeps the first `max_entities`.
/// The rest are summed year by year into `others`.
pub fn rank(mut table: ImpactTable, max_entities: usize, sort: SortKey) -> RankedImpactTable {
    sort_rows(&mut table.rows, sort);

    let rest: Vec<ImpactTableRow> = if table.rows.len() > max_entities {
        table.rows.split_off(max_entities)
    } else {
        Vec::new()
    };

    let others = AggregatedOthers {
        aggregated_values:             sum_rows(&rest),
        number_of_aggregated_entities: rest.len(),
        sort:                          sort.order,
    };
    log::debug!(
        "ranked {}: kept {}, folded {} into others",
        table.indicator.id,
        table.rows.len(),
        others.number_of_aggregated_entities
    );

    RankedImpactTable { table, others }
}

/// Per-year totals of `rows`. Compared rows keep their comparison,
/// recomputed from the summed sides.
fn sum_rows(rows: &[ImpactTableRow]) -> Vec<ImpactTableRowValue> {
    let mut totals: BTreeMap<Year, (Amount, Option<Amount>, bool)> = BTreeMap::new();
    for value in rows.iter().flat_map(|r| r.values.iter()) {
        let entry = totals.entry(value.year).or_insert((0.0, None, false));
        entry.0 += value.value;
        if let Some(cmp) = value.comparison {
            entry.1 = Some(entry.1.unwrap_or(0.0) + cmp.compared_value);
        }
        entry.2 |= value.is_projected;
    }

    totals
        .into_iter()
        .map(|(year, (value, compared, is_projected))| ImpactTableRowValue {
            year,
            value,
            is_projected,
            comparison: compared.map(|c| ValueComparison::between(value, c)),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::Indicator;

    fn table(values: &[(&str, f64)]) -> ImpactTable {
        ImpactTable {
            indicator:        Indicator::new("water", "Water", "m3"),
            group_by:         vec![],
            rows:             values
                .iter()
                .map(|&(key, v)| ImpactTableRow {
                    key:      key.into(),
                    name:     key.into(),
                    values:   vec![ImpactTableRowValue::plain(2020, v, false)],
                    children: vec![],
                })
                .collect(),
            year_sum:         vec![],
            purchased_volume: vec![],
            mode:             None,
        }
    }

    #[test]
    fn overflow_folds_into_others() {
        let ranked = rank(
            table(&[("A", 1.0), ("B", 5.0), ("C", 3.0), ("D", 2.0)]),
            2,
            SortKey { year: 2020, order: SortOrder::Desc },
        );

        let kept: Vec<&str> = ranked.table.rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(kept, vec!["B", "C"]);
        assert_eq!(ranked.others.number_of_aggregated_entities, 2);
        assert_eq!(ranked.others.aggregated_values[0].value, 3.0);
    }

    #[test]
    fn nothing_to_fold_gives_empty_others() {
        let ranked = rank(table(&[("A", 1.0)]), 5, SortKey { year: 2020, order: SortOrder::Asc });
        assert_eq!(ranked.others.number_of_aggregated_entities, 0);
        assert!(ranked.others.aggregated_values.is_empty());
    }
}
