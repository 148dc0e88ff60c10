//! Simulation configuration parsing from TOML files.

use serde::Deserialize;
use std::path::Path;

use crate::sim::agent::CapsuleExtent;
use crate::sim::params::MovementParams;
use crate::sim::steering::WanderParams;

/// Full simulation configuration. Every section falls back to the built-in
/// defaults, so an empty file is a valid configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Locomotion tuning.
    pub movement: MovementParams,
    /// Agent collision shape.
    pub capsule: CapsuleExtent,
    /// Wander input producer tuning.
    pub steering: WanderParams,
}

impl SimConfig {
    /// Load simulation configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, SimConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SimConfigError::Io(path.to_path_buf(), e))?;

        toml::from_str(&content).map_err(|e| SimConfigError::Parse(path.to_path_buf(), e))
    }
}

/// Errors that can occur when loading simulation configuration.
#[derive(Debug)]
pub enum SimConfigError {
    Io(std::path::PathBuf, std::io::Error),
    Parse(std::path::PathBuf, toml::de::Error),
}

impl std::fmt::Display for SimConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimConfigError::Io(path, e) => {
                write!(f, "Failed to read {}: {}", path.display(), e)
            }
            SimConfigError::Parse(path, e) => {
                write!(f, "Failed to parse {}: {}", path.display(), e)
            }
        }
    }
}

impl std::error::Error for SimConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_config_uses_defaults() {
        let config: SimConfig = toml::from_str("").unwrap();
        assert_eq!(config.movement.max_step_height, 45.0);
        assert_eq!(config.capsule.radius, 42.0);
        assert_eq!(config.capsule.half_height, 96.0);
        assert_eq!(config.steering.move_dist_max, 400.0);
    }

    #[test]
    fn test_parse_full_config() {
        let toml = r#"
            [movement]
            max_step_height = 30.0
            gravity_z = -490.0
            can_walk_off_ledges = false

            [capsule]
            radius = 30.0
            half_height = 80.0

            [steering]
            acceptance_radius = 50.0
        "#;
        let config: SimConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.movement.max_step_height, 30.0);
        assert_eq!(config.movement.gravity_z, -490.0);
        assert!(!config.movement.can_walk_off_ledges);
        assert_eq!(config.capsule.radius, 30.0);
        assert_eq!(config.steering.acceptance_radius, 50.0);
        // Untouched options keep their defaults.
        assert_eq!(config.movement.jump_z_velocity, 700.0);
    }

    #[test]
    fn test_parse_error_reports_path() {
        let dir = std::env::temp_dir().join("stridesim_config_test");
        let _ = std::fs::create_dir_all(&dir);
        let path = dir.join("broken.toml");
        std::fs::write(&path, "movement = 3").unwrap();
        let err = SimConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, SimConfigError::Parse(..)));
        assert!(err.to_string().contains("broken.toml"));
    }
}
