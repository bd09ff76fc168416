//! Capability contracts between agents and the outside world.
//!
//! Agents read the world through [`Sensing`], move through
//! [`MotionActuator`] and cue animations through [`AnimationCues`]. The
//! reference implementations here are enough to run agents headless.

use crate::steering::SphereObstacleField;
use ahash::AHashMap;
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::rc::Rc;
use warden_common::{look_rotation, Pose};

// ============================================================================
// Sensing
// ============================================================================

/// Read-only view of the tracked target.
///
/// A missing target is a value, never an error: distance is infinite and
/// position is `None`. Check [`Sensing::has_target`] before relying on it.
pub trait Sensing {
    /// Whether a target exists at all.
    fn has_target(&self) -> bool;
    /// Whether the target is within `range` of `from` and not occluded.
    fn is_target_visible(&self, from: Vec3, range: f32) -> bool;
    /// Distance from `from` to the target, infinite without one.
    fn distance_to_target(&self, from: Vec3) -> f32;
    /// Target position, if any.
    fn target_position(&self) -> Option<Vec3>;
    /// Target velocity, zero when unknown.
    fn target_velocity(&self) -> Vec3 {
        Vec3::ZERO
    }
    /// Whether nothing blocks the straight line from `from` to the target.
    fn has_line_of_sight(&self, _from: Vec3) -> bool {
        self.has_target()
    }
}

/// Kinematic state of a tracked target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetSnapshot {
    /// World position
    pub position: Vec3,
    /// World velocity
    pub velocity: Vec3,
}

impl TargetSnapshot {
    /// Creates a stationary snapshot.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
        }
    }
}

/// Shared slot holding the current target snapshot.
///
/// One writer (the player driver) updates it between ticks; every agent holds
/// a clone and reads it. All access happens on the simulation thread.
#[derive(Debug, Clone, Default)]
pub struct TargetHandle(Rc<Cell<Option<TargetSnapshot>>>);

impl TargetHandle {
    /// Creates an empty handle.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a handle already holding a snapshot.
    #[must_use]
    pub fn with_target(snapshot: TargetSnapshot) -> Self {
        let handle = Self::new();
        handle.set(snapshot);
        handle
    }

    /// Publishes a new snapshot.
    pub fn set(&self, snapshot: TargetSnapshot) {
        self.0.set(Some(snapshot));
    }

    /// Removes the target.
    pub fn clear(&self) {
        self.0.set(None);
    }

    /// Current snapshot.
    #[must_use]
    pub fn get(&self) -> Option<TargetSnapshot> {
        self.0.get()
    }
}

/// [`Sensing`] over a [`TargetHandle`], optionally occluded by obstacles.
#[derive(Debug, Clone, Default)]
pub struct PlayerTracker {
    target: TargetHandle,
    occluders: Option<Rc<SphereObstacleField>>,
}

impl PlayerTracker {
    /// Eye height used for line-of-sight rays.
    pub const EYE_HEIGHT: f32 = 0.5;

    /// Tracks the given target with nothing blocking sight.
    #[must_use]
    pub fn new(target: TargetHandle) -> Self {
        Self {
            target,
            occluders: None,
        }
    }

    /// Blocks sight with the given obstacles.
    #[must_use]
    pub fn with_occluders(mut self, occluders: Rc<SphereObstacleField>) -> Self {
        self.occluders = Some(occluders);
        self
    }

    /// Shared handle being tracked.
    #[must_use]
    pub fn handle(&self) -> &TargetHandle {
        &self.target
    }
}

impl Sensing for PlayerTracker {
    fn has_target(&self) -> bool {
        self.target.get().is_some()
    }

    fn is_target_visible(&self, from: Vec3, range: f32) -> bool {
        self.distance_to_target(from) <= range && self.has_line_of_sight(from)
    }

    fn distance_to_target(&self, from: Vec3) -> f32 {
        self.target
            .get()
            .map_or(f32::INFINITY, |t| from.distance(t.position))
    }

    fn target_position(&self) -> Option<Vec3> {
        self.target.get().map(|t| t.position)
    }

    fn target_velocity(&self) -> Vec3 {
        self.target.get().map_or(Vec3::ZERO, |t| t.velocity)
    }

    fn has_line_of_sight(&self, from: Vec3) -> bool {
        let Some(target) = self.target.get() else {
            return false;
        };
        let Some(occluders) = &self.occluders else {
            return true;
        };
        let eye = from + Vec3::Y * Self::EYE_HEIGHT;
        let to = target.position + Vec3::Y * Self::EYE_HEIGHT;
        let offset = to - eye;
        let distance = offset.length();
        if distance <= f32::EPSILON {
            return true;
        }
        occluders.raycast(eye, offset / distance, distance).is_none()
    }
}

// ============================================================================
// Motion actuation
// ============================================================================

/// Movement layer driven by an orchestrator.
pub trait MotionActuator {
    /// Starts or retargets movement toward `target`.
    fn move_toward(&mut self, target: Vec3);
    /// Halts movement.
    fn stop(&mut self);
    /// Sets orientation directly.
    fn set_rotation(&mut self, rotation: Quat);
    /// Integrates position over `dt` seconds.
    fn tick(&mut self, dt: f32);
    /// Current pose.
    fn pose(&self) -> Pose;
    /// Whether a move is in progress.
    fn is_moving(&self) -> bool;
}

/// Straight-line mover with a fixed speed.
#[derive(Debug, Clone)]
pub struct KinematicMover {
    pose: Pose,
    speed: f32,
    target: Vec3,
    moving: bool,
}

impl KinematicMover {
    /// Distance at which a move completes.
    pub const ARRIVAL_EPSILON: f32 = 0.1;

    /// Creates a stationary mover.
    #[must_use]
    pub fn new(position: Vec3, speed: f32) -> Self {
        Self {
            pose: Pose::at(position),
            speed,
            target: position,
            moving: false,
        }
    }

    /// Current destination.
    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Movement speed.
    #[must_use]
    pub fn speed(&self) -> f32 {
        self.speed
    }

    /// Teleports without changing the destination.
    pub fn set_position(&mut self, position: Vec3) {
        self.pose.position = position;
    }
}

impl MotionActuator for KinematicMover {
    fn move_toward(&mut self, target: Vec3) {
        self.target = target;
        self.moving = true;
    }

    fn stop(&mut self) {
        self.moving = false;
    }

    fn set_rotation(&mut self, rotation: Quat) {
        self.pose.rotation = rotation;
    }

    fn tick(&mut self, dt: f32) {
        if !self.moving {
            return;
        }
        let offset = self.target - self.pose.position;
        let remaining = offset.length();
        let step = self.speed * dt;
        if step >= remaining {
            self.pose.position = self.target;
        } else {
            self.pose.position += offset / remaining * step;
        }
        if let Some(rotation) = look_rotation(offset) {
            self.pose.rotation = rotation;
        }
        if self.pose.position.distance(self.target) < Self::ARRIVAL_EPSILON {
            self.moving = false;
        }
    }

    fn pose(&self) -> Pose {
        self.pose
    }

    fn is_moving(&self) -> bool {
        self.moving
    }
}

// ============================================================================
// Animation cues
// ============================================================================

/// A single animation parameter change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AnimationCue {
    /// Set a boolean parameter
    SetBool {
        /// Parameter name
        name: String,
        /// New value
        value: bool,
    },
    /// Fire a trigger
    SetTrigger(String),
    /// Set a float parameter
    SetFloat {
        /// Parameter name
        name: String,
        /// New value
        value: f32,
    },
    /// Play a named clip
    Play(String),
}

impl AnimationCue {
    /// Boolean parameter change.
    pub fn set_bool(name: impl Into<String>, value: bool) -> Self {
        Self::SetBool {
            name: name.into(),
            value,
        }
    }

    /// Trigger.
    pub fn trigger(name: impl Into<String>) -> Self {
        Self::SetTrigger(name.into())
    }

    /// Float parameter change.
    pub fn set_float(name: impl Into<String>, value: f32) -> Self {
        Self::SetFloat {
            name: name.into(),
            value,
        }
    }
}

/// Animation sink. Agents without animation use [`NullAnimator`].
pub trait AnimationCues {
    /// Sets a boolean parameter.
    fn set_bool(&mut self, name: &str, value: bool);
    /// Fires a trigger.
    fn set_trigger(&mut self, name: &str);
    /// Sets a float parameter.
    fn set_float(&mut self, name: &str, value: f32);
    /// Plays a clip.
    fn play(&mut self, name: &str);

    /// Dispatches a cue value.
    fn apply(&mut self, cue: &AnimationCue) {
        match cue {
            AnimationCue::SetBool { name, value } => self.set_bool(name, *value),
            AnimationCue::SetTrigger(name) => self.set_trigger(name),
            AnimationCue::SetFloat { name, value } => self.set_float(name, *value),
            AnimationCue::Play(name) => self.play(name),
        }
    }
}

/// Discards every cue.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullAnimator;

impl AnimationCues for NullAnimator {
    fn set_bool(&mut self, _name: &str, _value: bool) {}
    fn set_trigger(&mut self, _name: &str) {}
    fn set_float(&mut self, _name: &str, _value: f32) {}
    fn play(&mut self, _name: &str) {}
}

/// Keeps every cue and the latest parameter values.
#[derive(Debug, Clone, Default)]
pub struct RecordingAnimator {
    log: Vec<AnimationCue>,
    bools: AHashMap<String, bool>,
    floats: AHashMap<String, f32>,
}

impl RecordingAnimator {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every cue in arrival order.
    #[must_use]
    pub fn cues(&self) -> &[AnimationCue] {
        &self.log
    }

    /// Latest value of a boolean parameter.
    #[must_use]
    pub fn bool_value(&self, name: &str) -> Option<bool> {
        self.bools.get(name).copied()
    }

    /// Latest value of a float parameter.
    #[must_use]
    pub fn float_value(&self, name: &str) -> Option<f32> {
        self.floats.get(name).copied()
    }

    /// Number of times a trigger fired.
    #[must_use]
    pub fn trigger_count(&self, name: &str) -> usize {
        self.log
            .iter()
            .filter(|cue| matches!(cue, AnimationCue::SetTrigger(n) if n == name))
            .count()
    }

    /// Forgets everything recorded.
    pub fn clear(&mut self) {
        self.log.clear();
        self.bools.clear();
        self.floats.clear();
    }
}

impl AnimationCues for RecordingAnimator {
    fn set_bool(&mut self, name: &str, value: bool) {
        self.bools.insert(name.to_string(), value);
        self.log.push(AnimationCue::set_bool(name, value));
    }

    fn set_trigger(&mut self, name: &str) {
        self.log.push(AnimationCue::trigger(name));
    }

    fn set_float(&mut self, name: &str, value: f32) {
        self.floats.insert(name.to_string(), value);
        self.log.push(AnimationCue::set_float(name, value));
    }

    fn play(&mut self, name: &str) {
        self.log.push(AnimationCue::Play(name.to_string()));
    }
}

// ============================================================================
// Weapons
// ============================================================================

/// Logical request to spawn a projectile. Pooling is the receiver's concern.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeaponRequest {
    /// Spawn point
    pub origin: Vec3,
    /// Unit travel direction
    pub direction: Vec3,
    /// Travel speed
    pub speed: f32,
}
