//! Write-once memo of aggregation results.
//!
//! RULE: An entry is never replaced once written. Concurrent misses on
//! the same key may both compute; the first insert wins and both callers
//! get the stored value. Once `capacity` entries exist, misses are
//! computed and returned without being stored.

use crate::{
    aggregation::ImpactTable,
    error::EngineResult,
    indicator::GroupingDimension,
    types::YearRange,
};
use serde::Serialize;
use std::{
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::{Arc, Mutex, PoisonError},
};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub baseline_version:      u64,
    /// `None` for the actual (baseline-only) side.
    pub intervention_set_hash: Option<u64>,
    pub group_by:              Vec<GroupingDimension>,
    pub years:                 YearRange,
    /// Filter, indicators and sort of the request.
    pub request_hash:          u64,
    /// Flattened rows, so entity names and indicator values are covered.
    pub rows_hash:             u64,
}

/// Hash of any serializable value's JSON form.
pub fn content_hash<T: Serialize + ?Sized>(value: &T) -> EngineResult<u64> {
    let json = serde_json::to_string(value)?;
    let mut hasher = DefaultHasher::new();
    json.hash(&mut hasher);
    Ok(hasher.finish())
}

#[derive(Debug)]
pub struct AggregationCache {
    entries:  Mutex<HashMap<CacheKey, Arc<Vec<ImpactTable>>>>,
    capacity: usize,
}

impl AggregationCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<Vec<ImpactTable>>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Returns the cached tables for `key`, computing them on a miss.
    /// Errors are returned as-is and nothing is stored.
    pub fn get_or_try_insert_with<F>(&self, key: CacheKey, compute: F) -> EngineResult<Arc<Vec<ImpactTable>>>
    where
        F: FnOnce() -> EngineResult<Vec<ImpactTable>>,
    {
        if let Some(hit) = self.get(&key) {
            log::debug!("aggregation cache hit");
            return Ok(hit);
        }

        let computed = Arc::new(compute()?);
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        if !entries.contains_key(&key) && entries.len() >= self.capacity {
            log::debug!("aggregation cache full ({} entries), result not stored", self.capacity);
            return Ok(computed);
        }
        Ok(Arc::clone(entries.entry(key).or_insert(computed)))
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EngineError;

    fn key(request_hash: u64) -> CacheKey {
        CacheKey {
            baseline_version:      1,
            intervention_set_hash: None,
            group_by:              vec![GroupingDimension::Material],
            years:                 YearRange::new(2020, 2021),
            request_hash,
            rows_hash: 0,
        }
    }

    #[test]
    fn second_lookup_does_not_recompute() {
        let cache = AggregationCache::new(8);
        let mut calls = 0;
        for _ in 0..2 {
            cache
                .get_or_try_insert_with(key(7), || {
                    calls += 1;
                    Ok(Vec::new())
                })
                .unwrap();
        }
        assert_eq!(calls, 1);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn failures_are_not_cached() {
        let cache = AggregationCache::new(8);
        let result = cache.get_or_try_insert_with(key(1), || {
            Err(EngineError::UnknownGroupingDimension { name: "x".into() })
        });
        assert!(result.is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn full_cache_computes_without_storing() {
        let cache = AggregationCache::new(2);
        for hash in 0..4 {
            let tables = cache.get_or_try_insert_with(key(hash), || Ok(Vec::new())).unwrap();
            assert!(tables.is_empty());
        }
        assert_eq!(cache.len(), 2);

        let mut calls = 0;
        cache
            .get_or_try_insert_with(key(0), || {
                calls += 1;
                Ok(Vec::new())
            })
            .unwrap();
        assert_eq!(calls, 0, "entries stored before the cache filled up stay hits");
    }
}
