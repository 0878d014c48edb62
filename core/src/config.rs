use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Desc
    }
}

/// Engine-wide settings. Loaded once at startup, read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum per-year drift between canceled and replacing volume,
    /// relative to the canceled volume (absolute below a volume of 1).
    pub conservation_tolerance: f64,
    /// Label for group nodes whose grouping attribute is absent.
    pub unassigned_label:       String,
    pub default_sort_order:     SortOrder,
    /// Entities shown individually in ranked tables; the rest fold into `others`.
    pub max_ranking_entities:   usize,
    pub cache_enabled:          bool,
    /// Upper bound on cached aggregation results per engine.
    pub cache_capacity:         usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            conservation_tolerance: 1e-6,
            unassigned_label:       "Unassigned".into(),
            default_sort_order:     SortOrder::Desc,
            max_ranking_entities:   5,
            cache_enabled:          true,
            cache_capacity:         256,
        }
    }
}

impl EngineConfig {
    /// Reads an engine config from a JSON file. Missing keys take defaults.
    pub fn load(path: &str) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Cannot read {path}: {e}"))?;
        let config: EngineConfig = serde_json::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Cannot parse {path}: {e}"))?;
        if config.conservation_tolerance < 0.0 {
            anyhow::bail!("{path}: conservation_tolerance must be non-negative");
        }
        log::debug!("loaded engine config from {path}: {config:?}");
        Ok(config)
    }

    /// Minimal config for unit tests. Caching off so every call recomputes.
    pub fn default_test() -> Self {
        Self {
            cache_enabled: false,
            max_ranking_entities: 3,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_takes_defaults() {
        let config: EngineConfig =
            serde_json::from_str(r#"{ "unassigned_label": "n/a", "default_sort_order": "asc" }"#)
                .unwrap();
        assert_eq!(config.unassigned_label, "n/a");
        assert_eq!(config.default_sort_order, SortOrder::Asc);
        assert_eq!(config.max_ranking_entities, 5);
        assert!(config.cache_enabled);
        assert_eq!(config.cache_capacity, 256);
    }

    #[test]
    fn load_reports_missing_file() {
        let err = EngineConfig::load("/nonexistent/engine_config.json").unwrap_err();
        assert!(err.to_string().contains("Cannot read"));
    }
}
