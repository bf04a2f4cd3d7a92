//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Rows per page emitted by block sources unless configured otherwise.
pub const DEFAULT_MAX_PAGE_POSITIONS: usize = 8 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Circuit-breaker ceiling (in bytes) for every block the engine builds.
    pub mem_cap_bytes: usize,

    /// Upper bound on positions per page produced by sources.
    pub max_page_positions: usize,

    /// Pipeline instances `Engine::run_parallel` runs at once.
    pub max_parallel_pipelines: usize,

    /// Consecutive driver iterations without progress before a pipeline is
    /// declared stalled.
    pub driver_max_idle_iterations: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 512 * 1024 * 1024, // 512 MiB default
            max_page_positions: DEFAULT_MAX_PAGE_POSITIONS,
            max_parallel_pipelines: 4,
            driver_max_idle_iterations: 1_000_000,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `PAGEFLOW_MEM_CAP_BYTES`: breaker ceiling in bytes
    /// - `PAGEFLOW_MAX_PAGE_POSITIONS`: positions per source page
    /// - `PAGEFLOW_MAX_PARALLEL_PIPELINES`: concurrent pipeline instances
    /// - `PAGEFLOW_DRIVER_MAX_IDLE_ITERATIONS`: stall threshold
    ///
    /// Values that fail to parse are ignored.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as `from_env` but reading through `lookup`, so callers can layer
    /// other sources (and tests need not mutate the process environment).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        let parse = |key: &str| lookup(key).and_then(|s| s.trim().parse::<usize>().ok());

        if let Some(v) = parse("PAGEFLOW_MEM_CAP_BYTES") {
            cfg.mem_cap_bytes = v;
        }
        if let Some(v) = parse("PAGEFLOW_MAX_PAGE_POSITIONS") {
            cfg.max_page_positions = v;
        }
        if let Some(v) = parse("PAGEFLOW_MAX_PARALLEL_PIPELINES") {
            cfg.max_parallel_pipelines = v;
        }
        if let Some(v) = parse("PAGEFLOW_DRIVER_MAX_IDLE_ITERATIONS") {
            cfg.driver_max_idle_iterations = v;
        }
        cfg
    }

    /// Parse a JSON document; missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: EngineConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_page_positions == 0 {
            return Err(Error::Config("max_page_positions must be positive".into()));
        }
        if self.max_parallel_pipelines == 0 {
            return Err(Error::Config(
                "max_parallel_pipelines must be positive".into(),
            ));
        }
        if self.driver_max_idle_iterations == 0 {
            return Err(Error::Config(
                "driver_max_idle_iterations must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn lookup_overrides_and_ignores_garbage() {
        let env: HashMap<&str, &str> = [
            ("PAGEFLOW_MEM_CAP_BYTES", "1024"),
            ("PAGEFLOW_MAX_PAGE_POSITIONS", "not-a-number"),
            ("PAGEFLOW_MAX_PARALLEL_PIPELINES", " 2 "),
        ]
        .into_iter()
        .collect();
        let cfg = EngineConfig::from_lookup(|k| env.get(k).map(|v| v.to_string()));
        assert_eq!(cfg.mem_cap_bytes, 1024);
        assert_eq!(cfg.max_page_positions, DEFAULT_MAX_PAGE_POSITIONS);
        assert_eq!(cfg.max_parallel_pipelines, 2);
    }

    #[test]
    fn json_fills_defaults_and_validates() {
        let cfg = EngineConfig::from_json_str(r#"{"max_page_positions": 16}"#).unwrap();
        assert_eq!(cfg.max_page_positions, 16);
        assert_eq!(cfg.mem_cap_bytes, EngineConfig::default().mem_cap_bytes);

        let err = EngineConfig::from_json_str(r#"{"max_page_positions": 0}"#).unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(matches!(
            EngineConfig::from_json_str("{not json"),
            Err(Error::Config(_))
        ));
    }
}
