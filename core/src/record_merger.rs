//! Purchase record merger.
//!
//! Sums two record sets year by year. Output is sorted ascending by
//! year with exactly one record per year. Associative and commutative.

use crate::{
    sourcing::PurchaseRecord,
    types::{Amount, Year},
};
use std::collections::BTreeMap;

pub fn merge_records(a: &[PurchaseRecord], b: &[PurchaseRecord]) -> Vec<PurchaseRecord> {
    let mut by_year: BTreeMap<Year, Amount> = BTreeMap::new();
    for record in a.iter().chain(b) {
        *by_year.entry(record.year).or_insert(0.0) += record.volume;
    }
    by_year
        .into_iter()
        .map(|(year, volume)| PurchaseRecord { year, volume })
        .collect()
}

/// Fold any number of record sets into one.
pub fn merge_all<'a, I>(sets: I) -> Vec<PurchaseRecord>
where
    I: IntoIterator<Item = &'a [PurchaseRecord]>,
{
    sets.into_iter()
        .fold(Vec::new(), |acc, set| merge_records(&acc, set))
}

/// Total volume per year across record sets. Used by the conservation check.
pub fn yearly_totals<'a, I>(sets: I) -> BTreeMap<Year, Amount>
where
    I: IntoIterator<Item = &'a [PurchaseRecord]>,
{
    merge_all(sets)
        .into_iter()
        .map(|r| (r.year, r.volume))
        .collect()
}
