//! Comparison: two aggregated table sets → one compared table set.
//!
//! Rows pair up by identical group-key path. A row present on one side
//! only is compared against zeros. Base-side rows keep their order;
//! other-only rows follow in the other side's order.

use crate::{
    aggregation::{
        sort_rows, ComparisonMode, ImpactTable, ImpactTableRow, ImpactTableRowValue, SortKey,
        ValueComparison,
    },
    types::Year,
};
use std::collections::BTreeMap;

/// Compares tables pairwise by indicator id. `base` is the actual side
/// in `ActualVsScenario` mode.
pub fn compare(
    base: &[ImpactTable],
    other: &[ImpactTable],
    mode: ComparisonMode,
    sort: Option<SortKey>,
) -> Vec<ImpactTable> {
    let mut out = Vec::with_capacity(base.len().max(other.len()));

    for base_table in base {
        let other_table = other.iter().find(|t| t.indicator.id == base_table.indicator.id);
        out.push(compare_table(Some(base_table), other_table, base_table, mode, sort));
    }
    for other_table in other
        .iter()
        .filter(|t| !base.iter().any(|b| b.indicator.id == t.indicator.id))
    {
        out.push(compare_table(None, Some(other_table), other_table, mode, sort));
    }

    log::debug!("compared {} tables ({mode:?})", out.len());
    out
}

fn compare_table(
    base: Option<&ImpactTable>,
    other: Option<&ImpactTable>,
    template: &ImpactTable,
    mode: ComparisonMode,
    sort: Option<SortKey>,
) -> ImpactTable {
    let mut rows = compare_rows(rows_of(base), rows_of(other));
    if let Some(sort) = sort {
        sort_rows(&mut rows, sort);
    }

    ImpactTable {
        indicator: template.indicator.clone(),
        group_by: template.group_by.clone(),
        rows,
        year_sum: compare_values(year_sum_of(base), year_sum_of(other)),
        purchased_volume: compare_values(volume_of(base), volume_of(other)),
        mode: Some(mode),
    }
}

fn rows_of(table: Option<&ImpactTable>) -> &[ImpactTableRow] {
    table.map_or(&[][..], |t| t.rows.as_slice())
}

fn year_sum_of(table: Option<&ImpactTable>) -> &[ImpactTableRowValue] {
    table.map_or(&[][..], |t| t.year_sum.as_slice())
}

fn volume_of(table: Option<&ImpactTable>) -> &[ImpactTableRowValue] {
    table.map_or(&[][..], |t| t.purchased_volume.as_slice())
}

/// Recursive row alignment by key.
pub fn compare_rows(base: &[ImpactTableRow], other: &[ImpactTableRow]) -> Vec<ImpactTableRow> {
    let mut out: Vec<ImpactTableRow> = base
        .iter()
        .map(|b| {
            let o = other.iter().find(|o| o.key == b.key);
            ImpactTableRow {
                key:      b.key.clone(),
                name:     b.name.clone(),
                values:   compare_values(&b.values, o.map_or(&[][..], |o| o.values.as_slice())),
                children: compare_rows(&b.children, o.map_or(&[][..], |o| o.children.as_slice())),
            }
        })
        .collect();

    out.extend(
        other
            .iter()
            .filter(|o| !base.iter().any(|b| b.key == o.key))
            .map(|o| ImpactTableRow {
                key:      o.key.clone(),
                name:     o.name.clone(),
                values:   compare_values(&[], &o.values),
                children: compare_rows(&[], &o.children),
            }),
    );
    out
}

/// Year-by-year comparison over the union of years on both sides.
/// A year missing on one side counts as 0 there.
pub fn compare_values(base: &[ImpactTableRowValue], other: &[ImpactTableRowValue]) -> Vec<ImpactTableRowValue> {
    let mut years: BTreeMap<Year, (Option<&ImpactTableRowValue>, Option<&ImpactTableRowValue>)> =
        BTreeMap::new();
    for v in base {
        years.entry(v.year).or_default().0 = Some(v);
    }
    for v in other {
        years.entry(v.year).or_default().1 = Some(v);
    }

    years
        .into_iter()
        .map(|(year, (b, o))| {
            let base_value = b.map_or(0.0, |v| v.value);
            let other_value = o.map_or(0.0, |v| v.value);
            ImpactTableRowValue {
                year,
                value: base_value,
                is_projected: b.map_or(false, |v| v.is_projected) || o.map_or(false, |v| v.is_projected),
                comparison: Some(ValueComparison::between(base_value, other_value)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(key: &str, values: &[(Year, f64)]) -> ImpactTableRow {
        ImpactTableRow {
            key:      key.into(),
            name:     key.into(),
            values:   values
                .iter()
                .map(|&(y, v)| ImpactTableRowValue::plain(y, v, false))
                .collect(),
            children: vec![],
        }
    }

    #[test]
    fn zero_base_gives_null_percentage() {
        let out = compare_values(
            &[ImpactTableRowValue::plain(2021, 0.0, false)],
            &[ImpactTableRowValue::plain(2021, 5.0, false)],
        );
        let cmp = out[0].comparison.unwrap();
        assert_eq!(cmp.absolute_difference, 5.0);
        assert_eq!(cmp.percentage_difference, None);
    }

    #[test]
    fn one_sided_rows_compare_against_zero() {
        let out = compare_rows(&[row("A", &[(2020, 4.0)])], &[row("B", &[(2020, 2.0)])]);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, "A");
        let a = out[0].values[0].comparison.unwrap();
        assert_eq!((a.compared_value, a.absolute_difference), (0.0, -4.0));
        assert_eq!(a.percentage_difference, Some(-1.0));
        let b = out[1].values[0];
        assert_eq!(b.value, 0.0);
        assert_eq!(b.comparison.unwrap().absolute_difference, 2.0);
    }
}
