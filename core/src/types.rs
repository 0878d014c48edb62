//! Shared primitive types used across the whole engine.

/// A calendar year of purchase data.
pub type Year = i32;

/// Purchased volume (tonnes) or an indicator value.
pub type Amount = f64;

/// A stable, unique identifier for any sourcing entity
/// (material, supplier, business unit, region, location).
pub type EntityId = String;

/// Inclusive range of requested years.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRange {
    pub start_year: Year,
    pub end_year:   Year,
}

impl YearRange {
    pub fn new(start_year: Year, end_year: Year) -> Self {
        Self { start_year, end_year }
    }

    pub fn contains(&self, year: Year) -> bool {
        year >= self.start_year && year <= self.end_year
    }

    /// Years in ascending order. Empty when start > end.
    pub fn years(&self) -> impl Iterator<Item = Year> {
        self.start_year..=self.end_year
    }

    /// Widest range a request may ask for.
    pub const MAX_SPAN: usize = 500;

    pub fn len(&self) -> usize {
        let span = i64::from(self.end_year) - i64::from(self.start_year) + 1;
        usize::try_from(span).unwrap_or(0)
    }

    /// Non-empty and no wider than `MAX_SPAN`.
    pub fn is_valid(&self) -> bool {
        !self.is_empty() && self.len() <= Self::MAX_SPAN
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
