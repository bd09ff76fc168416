//! Per-agent fact store read by decision logic.

use crate::config::BlackboardConfig;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Sensed and derived state for one agent.
///
/// Health is clamped to `[0, max_health]` on every write. `is_alive` is not
/// self-enforcing: the owner calls [`Blackboard::refresh_alive`] each tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blackboard {
    current_health: f32,
    max_health: f32,
    low_health_threshold: f32,
    sight_range: f32,
    attack_range: f32,
    /// Player currently detected
    pub is_player_in_sight: bool,
    /// Distance to the player, infinite when there is none
    pub distance_to_player: f32,
    /// Last position the player was seen at
    pub last_known_player_position: Option<Vec3>,
    /// Alive flag, derived from health by the owner
    pub is_alive: bool,
    /// Current patrol destination
    pub patrol_target: Option<Vec3>,
    /// Patrol destination reached and not yet replaced
    pub has_reached_patrol_point: bool,
}

impl Blackboard {
    /// Creates a blackboard at full health.
    #[must_use]
    pub fn new(config: &BlackboardConfig) -> Self {
        Self {
            current_health: config.max_health,
            max_health: config.max_health,
            low_health_threshold: config.low_health_threshold,
            sight_range: config.sight_range,
            attack_range: config.attack_range,
            is_player_in_sight: false,
            distance_to_player: f32::INFINITY,
            last_known_player_position: None,
            is_alive: true,
            patrol_target: None,
            has_reached_patrol_point: false,
        }
    }

    /// Current health.
    #[must_use]
    pub fn current_health(&self) -> f32 {
        self.current_health
    }

    /// Sets health, clamped to `[0, max_health]`.
    pub fn set_current_health(&mut self, health: f32) {
        let health = if health.is_nan() { 0.0 } else { health };
        self.current_health = health.clamp(0.0, self.max_health);
    }

    /// Subtracts `amount` from health and returns what is left.
    pub fn apply_damage(&mut self, amount: f32) -> f32 {
        self.set_current_health(self.current_health - amount);
        self.current_health
    }

    /// Maximum health.
    #[must_use]
    pub fn max_health(&self) -> f32 {
        self.max_health
    }

    /// Low health threshold.
    #[must_use]
    pub fn low_health_threshold(&self) -> f32 {
        self.low_health_threshold
    }

    /// Sighting range.
    #[must_use]
    pub fn sight_range(&self) -> f32 {
        self.sight_range
    }

    /// Attack range.
    #[must_use]
    pub fn attack_range(&self) -> f32 {
        self.attack_range
    }

    /// Re-derives `is_alive` from health.
    pub fn refresh_alive(&mut self) {
        self.is_alive = self.current_health > 0.0;
    }

    /// Forgets the player after sensing reports no target.
    pub fn clear_sighting(&mut self) {
        self.is_player_in_sight = false;
        self.distance_to_player = f32::INFINITY;
    }

    // ========================================================================
    // Condition queries
    // ========================================================================

    /// Alive flag set and health above zero.
    #[must_use]
    pub fn check_is_alive(&self) -> bool {
        self.is_alive && self.current_health > 0.0
    }

    /// Player detected.
    #[must_use]
    pub fn check_player_in_sight(&self) -> bool {
        self.is_player_in_sight
    }

    /// Health at or below the low threshold.
    #[must_use]
    pub fn check_low_health(&self) -> bool {
        self.current_health <= self.low_health_threshold
    }

    /// Player detected and within attack range.
    #[must_use]
    pub fn check_player_in_attack_range(&self) -> bool {
        self.is_player_in_sight && self.distance_to_player <= self.attack_range
    }

    /// Patrol destination reached.
    #[must_use]
    pub fn check_arrived_at_point(&self) -> bool {
        self.has_reached_patrol_point
    }

    /// Health exhausted.
    #[must_use]
    pub fn check_health_depleted(&self) -> bool {
        self.current_health <= 0.0
    }
}

impl Default for Blackboard {
    fn default() -> Self {
        Self::new(&BlackboardConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_defaults() {
        let bb = Blackboard::default();
        assert_eq!(bb.current_health(), 100.0);
        assert_eq!(bb.distance_to_player, f32::INFINITY);
        assert!(bb.check_is_alive());
        assert!(bb.patrol_target.is_none());
        assert!(!bb.check_player_in_attack_range());
    }

    #[test]
    fn test_attack_range_requires_sight() {
        let mut bb = Blackboard::default();
        bb.distance_to_player = 1.0;
        assert!(!bb.check_player_in_attack_range());
        bb.is_player_in_sight = true;
        assert!(bb.check_player_in_attack_range());
    }

    #[test]
    fn test_damage_and_alive_refresh() {
        let mut bb = Blackboard::default();
        assert_eq!(bb.apply_damage(75.0), 25.0);
        assert!(bb.check_low_health());
        bb.apply_damage(500.0);
        assert_eq!(bb.current_health(), 0.0);
        assert!(bb.is_alive);
        assert!(!bb.check_is_alive());
        bb.refresh_alive();
        assert!(!bb.is_alive);
        assert!(bb.check_health_depleted());
    }

    proptest! {
        #[test]
        fn test_health_stays_clamped(writes in proptest::collection::vec(-500.0f32..500.0, 1..20)) {
            let mut bb = Blackboard::default();
            for value in writes {
                bb.set_current_health(value);
                prop_assert!(bb.current_health() >= 0.0);
                prop_assert!(bb.current_health() <= bb.max_health());
            }
        }
    }
}
