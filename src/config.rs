//! # Configuration
//!
//! Engine settings, deserialized from JSON. Every field has a default so a partial
//! document (or `{}`) is a valid configuration.
//!
//! ```json
//! {
//!     "worker_count": 8,
//!     "min_layer": -4,
//!     "max_layer": 19,
//!     "placement": { "include_unedited": false, "second_pass": true }
//! }
//! ```

use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Lowest vertical layer of the default world (y = -64).
pub const DEFAULT_MIN_LAYER: i32 = -4;
/// Highest vertical layer of the default world (y = 319).
pub const DEFAULT_MAX_LAYER: i32 = 19;
/// Worker count used when the platform cannot report its parallelism.
pub const FALLBACK_WORKER_COUNT: usize = 4;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Number of worker threads processing chunk columns. Zero runs every chunk
    /// on the committing thread.
    pub worker_count: usize,
    /// Lowest layer index of the world, inclusive.
    pub min_layer: i32,
    /// Highest layer index of the world, inclusive.
    pub max_layer: i32,
    /// Settings for connectivity recomputation.
    pub placement: PlacementConfig,
}

/// Settings for the placement/connectivity processor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PlacementConfig {
    /// Whether edit sessions install the processor at all.
    pub enabled: bool,
    /// Also recompute cells the edit did not touch.
    pub include_unedited: bool,
    /// Propagate changes to planar neighbors, including across chunk borders.
    pub second_pass: bool,
    /// Block type names replacing the default shape-sensitive mask.
    pub mask: Option<Vec<String>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let worker_count = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(FALLBACK_WORKER_COUNT);
        Self {
            worker_count,
            min_layer: DEFAULT_MIN_LAYER,
            max_layer: DEFAULT_MAX_LAYER,
            placement: PlacementConfig::default(),
        }
    }
}

impl Default for PlacementConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            include_unedited: false,
            second_pass: true,
            mask: None,
        }
    }
}

impl EngineConfig {
    /// Parses a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, EngineError> {
        let config: EngineConfig = serde_json::from_str(json).map_err(EngineError::ConfigParse)?;
        log::debug!("Loaded engine config: {:?}", config);
        Ok(config)
    }

    /// Reads and parses a configuration file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, EngineError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| EngineError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Number of layers between `min_layer` and `max_layer`, inclusive.
    pub fn layer_count(&self) -> usize {
        (self.max_layer - self.min_layer + 1).max(0) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_json_str("{}").unwrap();
        assert_eq!(config.min_layer, DEFAULT_MIN_LAYER);
        assert_eq!(config.max_layer, DEFAULT_MAX_LAYER);
        assert!(config.placement.enabled);
        assert!(config.placement.second_pass);
        assert!(!config.placement.include_unedited);
        assert_eq!(config.layer_count(), 24);
    }

    #[test]
    fn nested_placement_fields_override() {
        let config = EngineConfig::from_json_str(
            r#"{ "worker_count": 0, "placement": { "include_unedited": true, "mask": ["oak_fence"] } }"#,
        )
        .unwrap();
        assert_eq!(config.worker_count, 0);
        assert!(config.placement.include_unedited);
        assert!(config.placement.second_pass);
        assert_eq!(config.placement.mask, Some(vec!["oak_fence".to_string()]));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = EngineConfig::from_json_str(r#"{ "render_distance": 2 }"#).unwrap_err();
        assert!(matches!(err, EngineError::ConfigParse(_)));
    }

    #[test]
    fn missing_file_reports_path() {
        let err = EngineConfig::from_file("/nonexistent/engine.json").unwrap_err();
        match err {
            EngineError::ConfigIo { path, .. } => assert!(path.ends_with("engine.json")),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
