//! Report flattening: row trees → tabular records for export.
//!
//! RULE: Column order is fixed: indicator and group columns, then years
//! ascending, then difference columns. Export consumers depend on it.

use crate::{
    aggregation::{ComparisonMode, ImpactTable, ImpactTableRow},
    error::{EngineError, EngineResult},
    indicator::GroupingDimension,
    types::{Amount, Year},
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// One (row, year) record, long form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatReportRecord {
    pub indicator:             String,
    pub group_by:              String,
    pub parent_name:           Option<String>,
    /// Names from the outermost group down to this row, inclusive.
    pub path:                  Vec<String>,
    pub name:                  String,
    pub year:                  Year,
    pub is_projected:          bool,
    pub value:                 Amount,
    pub compared_value:        Option<Amount>,
    pub absolute_difference:   Option<Amount>,
    pub percentage_difference: Option<f64>,
}

pub fn group_by_label(group_by: &[GroupingDimension]) -> String {
    let dims: Vec<&str> = group_by.iter().map(GroupingDimension::as_str).collect();
    format!("Group by {}", dims.join(" > "))
}

/// Depth-first, parents before children, years ascending within a row.
pub fn flatten_long(tables: &[ImpactTable]) -> Vec<FlatReportRecord> {
    fn walk(
        rows: &[ImpactTableRow],
        path: &mut Vec<String>,
        indicator: &str,
        group_by: &str,
        out: &mut Vec<FlatReportRecord>,
    ) {
        for row in rows {
            let parent_name = path.last().cloned();
            path.push(row.name.clone());
            for value in &row.values {
                out.push(FlatReportRecord {
                    indicator:             indicator.to_string(),
                    group_by:              group_by.to_string(),
                    parent_name:           parent_name.clone(),
                    path:                  path.clone(),
                    name:                  row.name.clone(),
                    year:                  value.year,
                    is_projected:          value.is_projected,
                    value:                 value.value,
                    compared_value:        value.comparison.map(|c| c.compared_value),
                    absolute_difference:   value.comparison.map(|c| c.absolute_difference),
                    percentage_difference: value.comparison.and_then(|c| c.percentage_difference),
                });
            }
            walk(&row.children, path, indicator, group_by, out);
            path.pop();
        }
    }

    let mut out = Vec::new();
    for table in tables {
        let indicator = table.indicator.label();
        let group_by = group_by_label(&table.group_by);
        walk(&table.rows, &mut Vec::new(), &indicator, &group_by, &mut out);
    }
    out
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ReportCell {
    Text(String),
    Number(f64),
    Empty,
}

impl From<Option<f64>> for ReportCell {
    fn from(value: Option<f64>) -> Self {
        value.map_or(ReportCell::Empty, ReportCell::Number)
    }
}

/// Wide form: one record per row, one column group per year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows:    Vec<Vec<ReportCell>>,
}

impl ReportTable {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }
}

fn side_labels(mode: ComparisonMode) -> (&'static str, &'static str) {
    match mode {
        ComparisonMode::ActualVsScenario   => ("Actual", "Scenario"),
        ComparisonMode::ScenarioVsScenario => ("Base Scenario", "Compared Scenario"),
    }
}

/// Wide form: one row per tree node, one column per year and side.
/// Every table must share one comparison mode (or none).
pub fn flatten_wide(tables: &[ImpactTable]) -> EngineResult<ReportTable> {
    let mode = tables.first().and_then(|t| t.mode);
    if tables.iter().any(|t| t.mode != mode) {
        return Err(EngineError::MixedReportModes);
    }

    // Year → projected, across every table.
    let mut years: BTreeMap<Year, bool> = BTreeMap::new();
    for value in tables.iter().flat_map(|t| t.year_sum.iter()) {
        *years.entry(value.year).or_default() |= value.is_projected;
    }
    let year_list: BTreeSet<Year> = years.keys().copied().collect();

    let mut columns: Vec<String> = ["Indicator", "Group by", "Parent", "Name"]
        .iter()
        .map(|c| c.to_string())
        .collect();
    for (year, projected) in &years {
        let label = if *projected {
            format!("{year} (projected)")
        } else {
            year.to_string()
        };
        match mode {
            None => columns.push(label),
            Some(mode) => {
                let (base, other) = side_labels(mode);
                columns.push(format!("{label} ({base})"));
                columns.push(format!("{label} ({other})"));
            }
        }
    }
    if mode.is_some() {
        columns.extend(year_list.iter().map(|y| format!("{y} (Absolute Difference)")));
        columns.extend(year_list.iter().map(|y| format!("{y} (Percentage Difference)")));
    }

    let mut rows = Vec::new();
    for table in tables {
        let indicator = table.indicator.label();
        let group_by = group_by_label(&table.group_by);
        push_rows(&table.rows, None, &indicator, &group_by, &year_list, mode.is_some(), &mut rows);
    }

    log::debug!("flattened {} report rows into {} columns", rows.len(), columns.len());
    Ok(ReportTable { columns, rows })
}

fn push_rows(
    rows: &[ImpactTableRow],
    parent: Option<&str>,
    indicator: &str,
    group_by: &str,
    years: &BTreeSet<Year>,
    compared: bool,
    out: &mut Vec<Vec<ReportCell>>,
) {
    for row in rows {
        let mut cells = vec![
            ReportCell::Text(indicator.to_string()),
            ReportCell::Text(group_by.to_string()),
            parent.map_or(ReportCell::Empty, |p| ReportCell::Text(p.to_string())),
            ReportCell::Text(row.name.clone()),
        ];
        for &year in years {
            let value = row.value_for(year);
            cells.push(value.map(|v| v.value).into());
            if compared {
                cells.push(value.and_then(|v| v.comparison).map(|c| c.compared_value).into());
            }
        }
        if compared {
            for &year in years {
                let cmp = row.value_for(year).and_then(|v| v.comparison);
                cells.push(cmp.map(|c| c.absolute_difference).into());
            }
            for &year in years {
                let cmp = row.value_for(year).and_then(|v| v.comparison);
                cells.push(cmp.and_then(|c| c.percentage_difference).into());
            }
        }

        out.push(cells);
        push_rows(&row.children, Some(&row.name), indicator, group_by, years, compared, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        aggregation::{ImpactTableRowValue, ValueComparison},
        indicator::Indicator,
    };

    fn compared_table() -> ImpactTable {
        let values = vec![
            ImpactTableRowValue {
                year:         2022,
                value:        10.0,
                is_projected: false,
                comparison:   Some(ValueComparison::between(10.0, 12.0)),
            },
            ImpactTableRowValue {
                year:         2023,
                value:        0.0,
                is_projected: true,
                comparison:   Some(ValueComparison::between(0.0, 5.0)),
            },
        ];
        ImpactTable {
            indicator:        Indicator::new("water", "Water use", "m3"),
            group_by:         vec![GroupingDimension::Material],
            rows:             vec![ImpactTableRow {
                key:      "M1".into(),
                name:     "Cotton".into(),
                values:   values.clone(),
                children: vec![],
            }],
            year_sum:         values,
            purchased_volume: vec![],
            mode:             Some(ComparisonMode::ScenarioVsScenario),
        }
    }

    #[test]
    fn wide_columns_put_differences_last() {
        let report = flatten_wide(&[compared_table()]).unwrap();
        assert_eq!(
            report.columns,
            vec![
                "Indicator",
                "Group by",
                "Parent",
                "Name",
                "2022 (Base Scenario)",
                "2022 (Compared Scenario)",
                "2023 (projected) (Base Scenario)",
                "2023 (projected) (Compared Scenario)",
                "2022 (Absolute Difference)",
                "2023 (Absolute Difference)",
                "2022 (Percentage Difference)",
                "2023 (Percentage Difference)",
            ]
        );
        let row = &report.rows[0];
        assert_eq!(row[0], ReportCell::Text("Water use (m3)".into()));
        assert_eq!(row[11], ReportCell::Empty, "zero base has no percentage");
    }

    #[test]
    fn mixed_comparison_modes_are_rejected() {
        let mut actual_vs_scenario = compared_table();
        actual_vs_scenario.mode = Some(ComparisonMode::ActualVsScenario);
        let mut plain = compared_table();
        plain.mode = None;

        let err = flatten_wide(&[compared_table(), actual_vs_scenario]).unwrap_err();
        assert!(matches!(err, EngineError::MixedReportModes));
        assert!(flatten_wide(&[compared_table(), plain]).is_err(), "a plain table must not take a compared layout");
    }

    #[test]
    fn long_form_carries_ancestor_path() {
        let mut table = compared_table();
        table.rows[0].children.push(ImpactTableRow {
            key:      "S1".into(),
            name:     "Supplier One".into(),
            values:   vec![ImpactTableRowValue::plain(2022, 1.0, false)],
            children: vec![],
        });

        let records = flatten_long(&[table]);

        assert_eq!(records.len(), 3);
        let child = &records[2];
        assert_eq!(child.parent_name.as_deref(), Some("Cotton"));
        assert_eq!(child.path, vec!["Cotton", "Supplier One"]);
        assert_eq!(child.group_by, "Group by material");
        assert_eq!(child.compared_value, None);
    }
}
