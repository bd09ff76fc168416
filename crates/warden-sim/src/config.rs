//! Simulation configuration.
//!
//! Wraps the AI tunables and the scenario layout in one TOML document.
//! Loading never fails: a missing or broken file yields defaults.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use warden_ai::AiConfig;
use warden_common::{ConfigError, ConfigResult};

/// Configuration file name.
pub const CONFIG_FILE: &str = "warden.toml";

/// Scenario layout and run length.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioConfig {
    /// RNG seed (None = random)
    pub seed: Option<u64>,
    /// Simulated seconds to run
    pub duration: f32,
    /// Fixed simulation step in seconds
    pub fixed_dt: f32,
    /// Nominal rendered frame time fed to the clock
    pub frame_time: f32,
    /// Random spread applied to each frame time
    pub frame_jitter: f32,
    /// Number of guards
    pub guards: usize,
    /// Number of patrolling NPCs
    pub npcs: usize,
    /// Number of civilians
    pub civilians: usize,
    /// Radius of the area agents spawn in
    pub arena_radius: f32,
    /// Number of pillars blocking sight and movement
    pub pillars: usize,
    /// Where civilians can leave the scene
    pub escape_points: Vec<Vec3>,
    /// Loop walked by the scripted player
    pub player_route: Vec<Vec3>,
    /// Scripted player walking speed
    pub player_speed: f32,
    /// Authored guard graph; the built-in graph is used when unset
    pub guard_graph: Option<PathBuf>,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            seed: None,
            duration: 60.0,
            fixed_dt: 1.0 / 60.0,
            frame_time: 1.0 / 60.0,
            frame_jitter: 0.004,
            guards: 3,
            npcs: 4,
            civilians: 6,
            arena_radius: 20.0,
            pillars: 5,
            escape_points: vec![
                Vec3::new(25.0, 0.0, 0.0),
                Vec3::new(-25.0, 0.0, 0.0),
                Vec3::new(0.0, 0.0, 25.0),
            ],
            player_route: vec![
                Vec3::new(-15.0, 0.0, -15.0),
                Vec3::new(15.0, 0.0, -15.0),
                Vec3::new(15.0, 0.0, 15.0),
                Vec3::new(-15.0, 0.0, 15.0),
            ],
            player_speed: 3.5,
            guard_graph: None,
        }
    }
}

impl ScenarioConfig {
    /// Rejects values the runner cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_non_negative("duration", self.duration)?;
        ConfigError::check_positive("fixed_dt", self.fixed_dt)?;
        ConfigError::check_positive("frame_time", self.frame_time)?;
        ConfigError::check_non_negative("frame_jitter", self.frame_jitter)?;
        ConfigError::check_positive("arena_radius", self.arena_radius)?;
        ConfigError::check_non_negative("player_speed", self.player_speed)
    }
}

/// Whole simulation configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Scenario layout
    pub scenario: ScenarioConfig,
    /// AI tunables
    pub ai: AiConfig,
}

impl SimConfig {
    /// Load configuration from a specific path.
    /// Returns default config if the file is missing or invalid.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();

        if !path.exists() {
            info!("Config file not found, using defaults");
            return Self::default();
        }

        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                warn!("Failed to read config file: {e}");
                return Self::default();
            },
        };

        match toml::from_str(&contents) {
            Ok(config) => {
                info!("Loaded config from {}", path.display());
                config
            },
            Err(e) => {
                warn!("Failed to parse config file: {e}");
                Self::default()
            },
        }
    }

    /// Save configuration to a specific path.
    pub fn save_to<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        let mut file = fs::File::create(path)?;
        file.write_all(contents.as_bytes())?;

        info!("Saved config to {}", path.display());
        Ok(())
    }

    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.scenario.validate()?;
        self.ai.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use warden_ai::{PatrolMode, Personality};

    #[test]
    fn test_default_config() {
        let config = SimConfig::default();
        assert_eq!(config.scenario.guards, 3);
        assert_eq!(config.ai.civilian.weights.flee, 70.0);
        assert_eq!(config.ai.guard.bullet_speed, 15.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_save_load() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("nested").join("warden.toml");

        let mut config = SimConfig::default();
        config.scenario.seed = Some(42);
        config.scenario.civilians = 9;
        config.ai.agent.patrol_mode = PatrolMode::Random;
        config.ai.agent.personality = Personality::Defensive;
        config.ai.civilian.weights.panic = 25.0;

        config.save_to(&config_path).expect("Failed to save config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("warden.toml");
        fs::write(&config_path, "[scenario]\nguards = 7\n\n[ai.guard]\nchase_speed = 6.0\n")
            .expect("Failed to write config");

        let loaded = SimConfig::load_from(&config_path);
        assert_eq!(loaded.scenario.guards, 7);
        assert_eq!(loaded.scenario.npcs, 4);
        assert_eq!(loaded.ai.guard.chase_speed, 6.0);
        assert_eq!(loaded.ai.guard.patrol_speed, 2.0);
    }

    #[test]
    fn test_config_load_missing_file() {
        let config = SimConfig::load_from("/nonexistent/path/warden.toml");
        assert_eq!(config, SimConfig::default());
    }

    #[test]
    fn test_config_load_garbage_file() {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let config_path = temp_dir.path().join("warden.toml");
        fs::write(&config_path, "guards = [[[").expect("Failed to write config");
        assert_eq!(SimConfig::load_from(&config_path), SimConfig::default());
    }

    #[test]
    fn test_invalid_scenario_rejected() {
        let mut config = SimConfig::default();
        config.scenario.fixed_dt = 0.0;
        assert!(config.validate().is_err());
    }
}
