//! Registry Configuration
//!
//! Tunables for the light registry with serde support for hot-reload.
//! Slot capacities are compile-time constants because the GPU-side tables
//! they index are sized in the shaders.

use serde::{Deserialize, Serialize};

use crate::atlas::TileAtlas;
use crate::command::IntPacking;
use crate::error::ConfigError;
use crate::scheduler::DEFAULT_MAX_UPDATES;

/// Maximum number of attached lights
pub const MAX_LIGHTS: usize = 65_535;

/// Maximum number of slotted shadow sources
pub const MAX_SHADOW_SOURCES: usize = 2_048;

/// Shadow atlas geometry
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AtlasConfig {
    /// Atlas width and height in pixels
    pub size: u32,

    /// Tile width and height in pixels (1 = per-pixel allocation)
    pub tile_size: u32,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            size: 4096,
            tile_size: 32,
        }
    }
}

/// Light registry configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Shadow atlas geometry
    pub atlas: AtlasConfig,

    /// Shadow sources re-rendered per frame at most
    pub max_updates: usize,

    /// Sources farther than this from the camera are not updated and lose
    /// their atlas region
    pub shadow_update_distance: f32,

    /// Integer encoding used in command records
    pub int_packing: IntPacking,

    /// Multiplier applied to `color * energy` in light commands
    pub energy_scale: f32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            atlas: AtlasConfig::default(),
            max_updates: DEFAULT_MAX_UPDATES,
            shadow_update_distance: 100.0,
            int_packing: IntPacking::Convert,
            energy_scale: 1.0,
        }
    }
}

impl RegistryConfig {
    /// Smaller atlas and budget for memory-constrained targets
    pub fn low_memory() -> Self {
        Self {
            atlas: AtlasConfig {
                size: 2048,
                tile_size: 32,
            },
            max_updates: 4,
            shadow_update_distance: 50.0,
            ..Default::default()
        }
    }

    /// Larger atlas and budget
    pub fn high_quality() -> Self {
        Self {
            atlas: AtlasConfig {
                size: 8192,
                tile_size: 64,
            },
            max_updates: 16,
            shadow_update_distance: 200.0,
            ..Default::default()
        }
    }

    /// Check every value, without clamping
    pub fn validate(&self) -> Result<(), ConfigError> {
        TileAtlas::validate(self.atlas.size, self.atlas.tile_size)?;
        if !(self.shadow_update_distance > 0.0) {
            return Err(ConfigError::InvalidUpdateDistance(self.shadow_update_distance));
        }
        if !(self.energy_scale > 0.0) || !self.energy_scale.is_finite() {
            return Err(ConfigError::InvalidEnergyScale(self.energy_scale));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RegistryConfig::default();

        assert_eq!(config.atlas.size, 4096);
        assert_eq!(config.atlas.tile_size, 32);
        assert_eq!(config.max_updates, 10);
        assert_eq!(config.shadow_update_distance, 100.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(RegistryConfig::low_memory().validate().is_ok());
        assert!(RegistryConfig::high_quality().validate().is_ok());
    }

    #[test]
    fn test_invalid_atlas_rejected() {
        let config = RegistryConfig {
            atlas: AtlasConfig {
                size: 1000,
                tile_size: 32,
            },
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Atlas(_))));
    }

    #[test]
    fn test_invalid_distance_rejected() {
        let mut config = RegistryConfig::default();
        config.shadow_update_distance = 0.0;
        assert!(config.validate().is_err());

        config.shadow_update_distance = f32::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serde_roundtrip() {
        let config = RegistryConfig {
            int_packing: IntPacking::Reinterpret,
            ..RegistryConfig::high_quality()
        };

        let json = serde_json::to_string(&config).unwrap();
        let restored: RegistryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let restored: RegistryConfig = serde_json::from_str(r#"{ "max_updates": 3 }"#).unwrap();

        assert_eq!(restored.max_updates, 3);
        assert_eq!(restored.atlas, AtlasConfig::default());
    }
}
