//! Engine configuration.
//!
//! One `EngineConfig` is built per document session and handed explicitly to
//! the components that need it. The core never reads it from disk or the
//! environment; the host application may persist it through `serde`.

use serde::{Deserialize, Serialize};

use crate::color::{Color, DEFAULT_KMEANS_ITERATIONS};
use crate::error::{CoreError, Result};

/// Largest canvas the engine will allocate (~256 megapixels).
pub const DEFAULT_MAX_PIXELS: u64 = 256_000_000;

/// Tunables shared by the engine components.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound on `width * height` for any buffer allocation.
    pub max_pixels: u64,
    /// Number of filter results kept in the LRU cache.
    pub filter_cache_capacity: usize,
    /// Seconds before a cached filter result expires.
    pub filter_cache_ttl_secs: u64,
    /// Iteration cap for k-means dominant color extraction.
    pub kmeans_max_iterations: usize,
    /// Interpolation steps per Catmull-Rom segment.
    pub catmull_rom_steps: usize,
    /// Fill color of a new stack's background layer.
    pub default_background: Color,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_pixels: DEFAULT_MAX_PIXELS,
            filter_cache_capacity: 32,
            filter_cache_ttl_secs: 300,
            kmeans_max_iterations: DEFAULT_KMEANS_ITERATIONS,
            catmull_rom_steps: 10,
            default_background: Color::WHITE,
        }
    }
}

impl EngineConfig {
    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_pixels == 0 {
            return Err(CoreError::arg("max_pixels must be non-zero"));
        }
        if self.filter_cache_capacity == 0 {
            return Err(CoreError::arg("filter_cache_capacity must be non-zero"));
        }
        if self.catmull_rom_steps == 0 {
            return Err(CoreError::arg("catmull_rom_steps must be non-zero"));
        }
        if self.kmeans_max_iterations == 0 {
            return Err(CoreError::arg("kmeans_max_iterations must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(EngineConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_cache_capacity_rejected() {
        let cfg = EngineConfig { filter_cache_capacity: 0, ..Default::default() };
        assert!(matches!(cfg.validate(), Err(CoreError::InvalidArgument(_))));
    }
}
