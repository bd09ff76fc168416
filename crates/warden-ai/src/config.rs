//! Tunable parameters for agents, steering, and selectors.
//!
//! Every section deserializes with `#[serde(default)]` so partial documents
//! only override what they mention. Call `validate` once after loading.

use crate::patrol::PatrolMode;
use crate::presets::Personality;
use serde::{Deserialize, Serialize};
use warden_common::{ConfigError, ConfigResult};

/// Blackboard limits and sensing ranges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlackboardConfig {
    /// Maximum health
    pub max_health: f32,
    /// Health at or below which the agent counts as hurt
    pub low_health_threshold: f32,
    /// Player sighting range
    pub sight_range: f32,
    /// Melee reach
    pub attack_range: f32,
}

impl Default for BlackboardConfig {
    fn default() -> Self {
        Self {
            max_health: 100.0,
            low_health_threshold: 30.0,
            sight_range: 10.0,
            attack_range: 3.0,
        }
    }
}

impl BlackboardConfig {
    /// Rejects negative or non-finite values.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_positive("max_health", self.max_health)?;
        ConfigError::check_non_negative("low_health_threshold", self.low_health_threshold)?;
        ConfigError::check_non_negative("sight_range", self.sight_range)?;
        ConfigError::check_non_negative("attack_range", self.attack_range)
    }
}

/// Decision-tree NPC orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Mover speed in units per second
    pub move_speed: f32,
    /// Seconds between logic steps
    pub update_interval: f32,
    /// Radius of the fallback patrol disc when no waypoints exist
    pub patrol_range: f32,
    /// Waypoint ordering
    pub patrol_mode: PatrolMode,
    /// Planar noise added to sequential waypoints
    pub patrol_jitter: f32,
    /// Distance at which a patrol target counts as reached
    pub arrival_distance: f32,
    /// Minimum wait at a reached waypoint
    pub dwell_min: f32,
    /// Maximum wait at a reached waypoint
    pub dwell_max: f32,
    /// Minimum rest in Idle before picking a new target
    pub idle_min: f32,
    /// Maximum rest in Idle before picking a new target
    pub idle_max: f32,
    /// How far ahead of the agent a flee target is placed
    pub flee_distance: f32,
    /// Rotation smoothing rate while attacking
    pub turn_rate: f32,
    /// Seconds between attack cues
    pub attack_cooldown: f32,
    /// Decision tree preset
    pub personality: Personality,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            move_speed: 3.0,
            update_interval: 0.1,
            patrol_range: 10.0,
            patrol_mode: PatrolMode::Sequential,
            patrol_jitter: 1.0,
            arrival_distance: 1.5,
            dwell_min: 1.0,
            dwell_max: 2.0,
            idle_min: 2.0,
            idle_max: 4.0,
            flee_distance: 10.0,
            turn_rate: 5.0,
            attack_cooldown: 0.5,
            personality: Personality::Standard,
        }
    }
}

impl AgentConfig {
    /// Rejects negative or non-finite values and inverted ranges.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_non_negative("move_speed", self.move_speed)?;
        ConfigError::check_positive("update_interval", self.update_interval)?;
        ConfigError::check_non_negative("patrol_range", self.patrol_range)?;
        ConfigError::check_non_negative("patrol_jitter", self.patrol_jitter)?;
        ConfigError::check_non_negative("arrival_distance", self.arrival_distance)?;
        ConfigError::check_non_negative("dwell_min", self.dwell_min)?;
        ConfigError::check_non_negative("dwell_max", self.dwell_max)?;
        ConfigError::check_non_negative("idle_min", self.idle_min)?;
        ConfigError::check_non_negative("idle_max", self.idle_max)?;
        ConfigError::check_non_negative("flee_distance", self.flee_distance)?;
        ConfigError::check_non_negative("turn_rate", self.turn_rate)?;
        ConfigError::check_non_negative("attack_cooldown", self.attack_cooldown)?;
        if self.dwell_max < self.dwell_min {
            return Err(ConfigError::InvalidParameter {
                name: "dwell_max",
                value: self.dwell_max,
            });
        }
        if self.idle_max < self.idle_min {
            return Err(ConfigError::InvalidParameter {
                name: "idle_max",
                value: self.idle_max,
            });
        }
        Ok(())
    }
}

/// Kinematic limits for steering-driven agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringConfig {
    /// Velocity magnitude cap
    pub max_speed: f32,
    /// Steering correction magnitude cap
    pub max_force: f32,
    /// Speed below which the agent neither moves nor turns
    pub move_epsilon: f32,
    /// Radius of the swept sphere used by obstacle probes
    pub probe_radius: f32,
}

impl Default for SteeringConfig {
    fn default() -> Self {
        Self {
            max_speed: 5.0,
            max_force: 10.0,
            move_epsilon: 0.1,
            probe_radius: 1.0,
        }
    }
}

impl SteeringConfig {
    /// Rejects negative or non-finite values.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_positive("max_speed", self.max_speed)?;
        ConfigError::check_non_negative("max_force", self.max_force)?;
        ConfigError::check_non_negative("move_epsilon", self.move_epsilon)?;
        ConfigError::check_non_negative("probe_radius", self.probe_radius)
    }
}

/// Reaction weights expressed as percentages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReactionWeights {
    /// Run to the nearest escape point
    pub flee: f32,
    /// Chase the player
    pub attack: f32,
    /// Back away from the player
    pub hide: f32,
    /// Erratic wandering
    pub panic: f32,
}

impl Default for ReactionWeights {
    fn default() -> Self {
        Self {
            flee: 70.0,
            attack: 10.0,
            hide: 15.0,
            panic: 5.0,
        }
    }
}

impl ReactionWeights {
    /// Declared maximum of the percentage convention.
    pub const PERCENT_TOTAL: f32 = 100.0;

    /// Sum of all weights.
    #[must_use]
    pub fn total(&self) -> f32 {
        self.flee + self.attack + self.hide + self.panic
    }

    /// Rescales the weights so they sum to 100 when they exceed it.
    ///
    /// Weights summing to 100 or less are returned unchanged.
    #[must_use]
    pub fn normalized(&self) -> Self {
        let total = self.total();
        if total <= Self::PERCENT_TOTAL || !total.is_finite() {
            return self.clone();
        }
        let scale = Self::PERCENT_TOTAL / total;
        Self {
            flee: self.flee * scale,
            attack: self.attack * scale,
            hide: self.hide * scale,
            panic: self.panic * scale,
        }
    }
}

/// Civilian orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CivilianConfig {
    /// Reaction probabilities
    pub weights: ReactionWeights,
    /// Player detection radius
    pub detection_range: f32,
    /// Seconds of panic before switching to flee
    pub panic_duration: f32,
    /// Distance at which an escape point counts as reached
    pub escape_reach_distance: f32,
    /// Seconds the player is ignored after being lost
    pub lost_cooldown: f32,
    /// Kinematic limits
    pub steering: SteeringConfig,
}

impl Default for CivilianConfig {
    fn default() -> Self {
        Self {
            weights: ReactionWeights::default(),
            detection_range: 8.0,
            panic_duration: 5.0,
            escape_reach_distance: 2.0,
            lost_cooldown: 2.0,
            steering: SteeringConfig {
                max_speed: 3.0,
                max_force: 6.0,
                ..SteeringConfig::default()
            },
        }
    }
}

impl CivilianConfig {
    /// Rejects negative or non-finite values.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_non_negative("detection_range", self.detection_range)?;
        ConfigError::check_non_negative("panic_duration", self.panic_duration)?;
        ConfigError::check_non_negative("escape_reach_distance", self.escape_reach_distance)?;
        ConfigError::check_non_negative("lost_cooldown", self.lost_cooldown)?;
        self.steering.validate()
    }
}

/// Guard orchestration parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Player detection radius
    pub detection_range: f32,
    /// Firing range
    pub attack_range: f32,
    /// Full field of view in degrees
    pub field_of_view: f32,
    /// Patrol and search walking speed
    pub patrol_speed: f32,
    /// Chase running speed
    pub chase_speed: f32,
    /// Seconds spent idle before patrolling
    pub idle_time: f32,
    /// Seconds spent searching before giving up
    pub search_time: f32,
    /// Distance at which a waypoint counts as reached
    pub waypoint_tolerance: f32,
    /// Seconds between shots
    pub shoot_cooldown: f32,
    /// Projectile speed carried on fire requests
    pub bullet_speed: f32,
    /// Offset of the default waypoints ahead of and behind the spawn
    pub default_patrol_offset: f32,
    /// Turning speed in degrees per second while scanning the last known position
    pub search_turn_rate: f32,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            detection_range: 8.0,
            attack_range: 2.0,
            field_of_view: 90.0,
            patrol_speed: 2.0,
            chase_speed: 4.0,
            idle_time: 3.0,
            search_time: 5.0,
            waypoint_tolerance: 1.0,
            shoot_cooldown: 0.5,
            bullet_speed: 15.0,
            default_patrol_offset: 5.0,
            search_turn_rate: 45.0,
        }
    }
}

impl GuardConfig {
    /// Rejects negative or non-finite values.
    pub fn validate(&self) -> ConfigResult<()> {
        ConfigError::check_non_negative("detection_range", self.detection_range)?;
        ConfigError::check_non_negative("attack_range", self.attack_range)?;
        ConfigError::check_non_negative("field_of_view", self.field_of_view)?;
        ConfigError::check_non_negative("patrol_speed", self.patrol_speed)?;
        ConfigError::check_non_negative("chase_speed", self.chase_speed)?;
        ConfigError::check_non_negative("idle_time", self.idle_time)?;
        ConfigError::check_non_negative("search_time", self.search_time)?;
        ConfigError::check_non_negative("waypoint_tolerance", self.waypoint_tolerance)?;
        ConfigError::check_non_negative("shoot_cooldown", self.shoot_cooldown)?;
        ConfigError::check_non_negative("bullet_speed", self.bullet_speed)?;
        ConfigError::check_non_negative("default_patrol_offset", self.default_patrol_offset)?;
        ConfigError::check_non_negative("search_turn_rate", self.search_turn_rate)
    }
}

/// All AI sections in one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    /// Blackboard limits
    pub blackboard: BlackboardConfig,
    /// Decision-tree NPCs
    pub agent: AgentConfig,
    /// Civilians
    pub civilian: CivilianConfig,
    /// Guards
    pub guard: GuardConfig,
}

impl AiConfig {
    /// Validates every section.
    pub fn validate(&self) -> ConfigResult<()> {
        self.blackboard.validate()?;
        self.agent.validate()?;
        self.civilian.validate()?;
        self.guard.validate()
    }
}
