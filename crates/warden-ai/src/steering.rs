//! Steering behaviors and the priority-weighted blender.
//!
//! Each behavior turns a read-only [`SteeringContext`] into a desired
//! velocity correction, returning zero when inactive or lacking inputs. The
//! blender averages the non-zero corrections by priority and clamps the
//! result to the agent's maximum force.

use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::trace;
use warden_common::{look_rotation, planar_jitter, Pose};

// ============================================================================
// Obstacle probing
// ============================================================================

/// Answers "is something in the way, and which way do I turn?".
pub trait ObstacleProbe {
    /// Sweeps from `origin` along `direction` for up to `max_distance`.
    ///
    /// Returns a unit avoidance direction on a hit.
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<Vec3>;
}

/// A world without obstacles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoObstacles;

impl ObstacleProbe for NoObstacles {
    fn probe(&self, _origin: Vec3, _direction: Vec3, _max_distance: f32) -> Option<Vec3> {
        None
    }
}

impl<P: ObstacleProbe + ?Sized> ObstacleProbe for Rc<P> {
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<Vec3> {
        (**self).probe(origin, direction, max_distance)
    }
}

/// Spherical obstacle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SphereObstacle {
    /// Centre
    pub center: Vec3,
    /// Radius
    pub radius: f32,
}

impl SphereObstacle {
    /// Creates an obstacle.
    #[must_use]
    pub const fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Distance along a unit ray to the surface inflated by `inflate`.
    fn ray_hit(&self, origin: Vec3, direction: Vec3, inflate: f32, max_distance: f32) -> Option<f32> {
        let radius = self.radius + inflate;
        let m = origin - self.center;
        let b = m.dot(direction);
        let c = m.length_squared() - radius * radius;
        if c > 0.0 && b > 0.0 {
            return None;
        }
        let discriminant = b * b - c;
        if discriminant < 0.0 {
            return None;
        }
        let t = (-b - discriminant.sqrt()).max(0.0);
        (t <= max_distance).then_some(t)
    }
}

/// Obstacle set probed by sweeping a sphere of `probe_radius`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SphereObstacleField {
    obstacles: Vec<SphereObstacle>,
    probe_radius: f32,
}

impl SphereObstacleField {
    /// Creates an empty field.
    #[must_use]
    pub fn new(probe_radius: f32) -> Self {
        Self {
            obstacles: Vec::new(),
            probe_radius,
        }
    }

    /// Adds an obstacle.
    pub fn add(&mut self, obstacle: SphereObstacle) {
        self.obstacles.push(obstacle);
    }

    /// All obstacles.
    #[must_use]
    pub fn obstacles(&self) -> &[SphereObstacle] {
        &self.obstacles
    }

    /// Nearest hit distance of a thin ray, for line-of-sight checks.
    #[must_use]
    pub fn raycast(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<f32> {
        self.nearest(origin, direction, 0.0, max_distance)
            .map(|(t, _)| t)
    }

    fn nearest(
        &self,
        origin: Vec3,
        direction: Vec3,
        inflate: f32,
        max_distance: f32,
    ) -> Option<(f32, &SphereObstacle)> {
        self.obstacles
            .iter()
            .filter_map(|o| {
                o.ray_hit(origin, direction, inflate, max_distance)
                    .map(|t| (t, o))
            })
            .min_by(|a, b| a.0.total_cmp(&b.0))
    }
}

impl ObstacleProbe for SphereObstacleField {
    fn probe(&self, origin: Vec3, direction: Vec3, max_distance: f32) -> Option<Vec3> {
        let direction = direction.normalize_or_zero();
        if direction == Vec3::ZERO {
            return None;
        }
        let (t, obstacle) = self.nearest(origin, direction, self.probe_radius, max_distance)?;

        // Contact point on the obstacle surface facing the swept sphere.
        let swept_center = origin + direction * t;
        let hit_point =
            obstacle.center + (swept_center - obstacle.center).normalize_or_zero() * obstacle.radius;
        let obstacle_to_agent = (origin - hit_point).normalize_or_zero();

        let left = direction.cross(Vec3::Y).normalize_or_zero();
        let right = -left;
        if left.dot(obstacle_to_agent) > right.dot(obstacle_to_agent) {
            Some(left)
        } else {
            Some(right)
        }
    }
}

// ============================================================================
// Context
// ============================================================================

/// Kinematic state of whatever is being sought, fled, or pursued.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetInfo {
    /// World position
    pub position: Vec3,
    /// World velocity
    pub velocity: Vec3,
}

impl TargetInfo {
    /// Stationary target.
    #[must_use]
    pub const fn at(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
        }
    }
}

/// Read-only inputs shared by every behavior in one blend.
#[derive(Clone, Copy)]
pub struct SteeringContext<'a> {
    /// Agent pose
    pub pose: Pose,
    /// Agent velocity
    pub velocity: Vec3,
    /// Velocity magnitude cap
    pub max_speed: f32,
    /// Correction magnitude cap
    pub max_force: f32,
    /// Current target, if any
    pub target: Option<TargetInfo>,
    /// Obstacle query
    pub probe: &'a dyn ObstacleProbe,
}

impl SteeringContext<'_> {
    /// Agent position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    /// Agent forward axis.
    #[must_use]
    pub fn forward(&self) -> Vec3 {
        self.pose.forward()
    }

    /// Correction steering toward `point` at full speed.
    #[must_use]
    pub fn seek(&self, point: Vec3) -> Vec3 {
        let desired = (point - self.position()).normalize_or_zero() * self.max_speed;
        desired - self.velocity
    }
}

// ============================================================================
// Behaviors
// ============================================================================

/// Discriminant used to look behaviors up in a blender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SteeringKind {
    /// Head for the target
    Seek,
    /// Run from a nearby target
    Flee,
    /// Head for where the target will be
    Pursuit,
    /// Turn away from obstacles ahead
    ObstacleAvoidance,
    /// Correlated random walk
    Wander,
}

/// Persistent wander circle state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WanderState {
    /// Circle radius
    pub radius: f32,
    /// Circle distance ahead of the agent
    pub distance: f32,
    /// Per-call perturbation amplitude
    pub jitter: f32,
    target: Vec3,
}

impl WanderState {
    /// Creates a wander state with its target straight ahead.
    #[must_use]
    pub const fn new(radius: f32, distance: f32, jitter: f32) -> Self {
        Self {
            radius,
            distance,
            jitter,
            target: Vec3::Z,
        }
    }

    /// Local-space point on the wander circle.
    #[must_use]
    pub fn target(&self) -> Vec3 {
        self.target
    }

    /// Recentres the target straight ahead.
    pub fn reset(&mut self) {
        self.target = Vec3::Z;
    }

    fn step(&mut self, ctx: &SteeringContext<'_>, rng: &mut fastrand::Rng) -> Vec3 {
        self.target += planar_jitter(rng, self.jitter);
        self.target = self.target.try_normalize().unwrap_or(Vec3::Z) * self.radius;
        let local = self.target + Vec3::Z * self.distance;
        ctx.seek(ctx.pose.transform_point(local))
    }
}

impl Default for WanderState {
    fn default() -> Self {
        Self::new(3.0, 5.0, 1.0)
    }
}

/// Behavior-specific parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BehaviorKind {
    /// Head straight for the target
    Seek,
    /// Run from the target while it is within `radius`
    Flee {
        /// Trigger radius
        radius: f32,
    },
    /// Head for the predicted target position
    Pursuit {
        /// Longest look-ahead in seconds
        prediction_cap: f32,
    },
    /// Turn sideways when something is ahead
    ObstacleAvoidance {
        /// Probe length
        look_ahead: f32,
    },
    /// Correlated random walk
    Wander(WanderState),
}

/// One weighted steering influence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SteeringBehavior {
    /// Blend weight
    pub priority: f32,
    /// Inactive behaviors contribute nothing
    pub active: bool,
    /// Parameters
    pub kind: BehaviorKind,
}

impl SteeringBehavior {
    const fn with(priority: f32, kind: BehaviorKind) -> Self {
        Self {
            priority,
            active: true,
            kind,
        }
    }

    /// Seek at priority 1.
    #[must_use]
    pub const fn seek() -> Self {
        Self::with(1.0, BehaviorKind::Seek)
    }

    /// Flee within 10 units at priority 2.
    #[must_use]
    pub const fn flee() -> Self {
        Self::with(2.0, BehaviorKind::Flee { radius: 10.0 })
    }

    /// Pursuit with a one second cap at priority 1.
    #[must_use]
    pub const fn pursuit() -> Self {
        Self::with(1.0, BehaviorKind::Pursuit { prediction_cap: 1.0 })
    }

    /// Obstacle avoidance looking 5 units ahead at priority 5.
    #[must_use]
    pub const fn obstacle_avoidance() -> Self {
        Self::with(5.0, BehaviorKind::ObstacleAvoidance { look_ahead: 5.0 })
    }

    /// Wander at priority 0.5.
    #[must_use]
    pub const fn wander() -> Self {
        Self::with(0.5, BehaviorKind::Wander(WanderState::new(3.0, 5.0, 1.0)))
    }

    /// Overrides the priority. Negative and non-finite values become 0.
    #[must_use]
    pub fn with_priority(mut self, priority: f32) -> Self {
        self.priority = if priority.is_finite() {
            priority.max(0.0)
        } else {
            0.0
        };
        self
    }

    /// Whether the priority can take part in a blend.
    fn has_weight(&self) -> bool {
        self.priority.is_finite() && self.priority > 0.0
    }

    /// Lookup key.
    #[must_use]
    pub fn steering_kind(&self) -> SteeringKind {
        match self.kind {
            BehaviorKind::Seek => SteeringKind::Seek,
            BehaviorKind::Flee { .. } => SteeringKind::Flee,
            BehaviorKind::Pursuit { .. } => SteeringKind::Pursuit,
            BehaviorKind::ObstacleAvoidance { .. } => SteeringKind::ObstacleAvoidance,
            BehaviorKind::Wander(_) => SteeringKind::Wander,
        }
    }

    /// Wander state, if this is a wander behavior.
    pub fn wander_state_mut(&mut self) -> Option<&mut WanderState> {
        match &mut self.kind {
            BehaviorKind::Wander(state) => Some(state),
            _ => None,
        }
    }

    /// Desired velocity correction, zero when inactive or lacking inputs.
    pub fn compute(&mut self, ctx: &SteeringContext<'_>, rng: &mut fastrand::Rng) -> Vec3 {
        if !self.active {
            return Vec3::ZERO;
        }
        match &mut self.kind {
            BehaviorKind::Seek => ctx.target.map_or(Vec3::ZERO, |t| ctx.seek(t.position)),
            BehaviorKind::Flee { radius } => {
                let Some(target) = ctx.target else {
                    return Vec3::ZERO;
                };
                if ctx.position().distance(target.position) > *radius {
                    return Vec3::ZERO;
                }
                let desired =
                    (ctx.position() - target.position).normalize_or_zero() * ctx.max_speed;
                desired - ctx.velocity
            },
            BehaviorKind::Pursuit { prediction_cap } => {
                let Some(target) = ctx.target else {
                    return Vec3::ZERO;
                };
                let distance = ctx.position().distance(target.position);
                let lead = (distance / ctx.max_speed).min(*prediction_cap);
                ctx.seek(target.position + target.velocity * lead)
            },
            BehaviorKind::ObstacleAvoidance { look_ahead } => ctx
                .probe
                .probe(ctx.position(), ctx.forward(), *look_ahead)
                .map_or(Vec3::ZERO, |avoid| avoid * ctx.max_force),
            BehaviorKind::Wander(state) => state.step(ctx, rng),
        }
    }
}

// ============================================================================
// Blender
// ============================================================================

/// Priority-weighted average of steering behaviors.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SteeringBlender {
    behaviors: Vec<SteeringBehavior>,
}

impl SteeringBlender {
    /// Creates an empty blender.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a behavior.
    pub fn add(&mut self, behavior: SteeringBehavior) {
        self.behaviors.push(behavior);
    }

    /// Builder form of [`SteeringBlender::add`].
    #[must_use]
    pub fn with(mut self, behavior: SteeringBehavior) -> Self {
        self.add(behavior);
        self
    }

    /// Removes the first behavior of `kind`.
    pub fn remove(&mut self, kind: SteeringKind) -> Option<SteeringBehavior> {
        let index = self
            .behaviors
            .iter()
            .position(|b| b.steering_kind() == kind)?;
        Some(self.behaviors.remove(index))
    }

    /// First behavior of `kind`.
    #[must_use]
    pub fn get(&self, kind: SteeringKind) -> Option<&SteeringBehavior> {
        self.behaviors.iter().find(|b| b.steering_kind() == kind)
    }

    /// First behavior of `kind`, mutably.
    pub fn get_mut(&mut self, kind: SteeringKind) -> Option<&mut SteeringBehavior> {
        self.behaviors
            .iter_mut()
            .find(|b| b.steering_kind() == kind)
    }

    /// All behaviors in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &SteeringBehavior> {
        self.behaviors.iter()
    }

    /// Number of behaviors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    /// Whether there are no behaviors.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    /// Blends every active, non-zero correction and clamps to `max_force`.
    ///
    /// Behaviors without a positive finite priority are skipped, so the total
    /// weight is either zero or positive.
    pub fn compute(&mut self, ctx: &SteeringContext<'_>, rng: &mut fastrand::Rng) -> Vec3 {
        let mut sum = Vec3::ZERO;
        let mut weight = 0.0;
        let mut contributors = 0usize;

        for behavior in self.behaviors.iter_mut().filter(|b| b.active && b.has_weight()) {
            let correction = behavior.compute(ctx, rng);
            if correction == Vec3::ZERO {
                continue;
            }
            sum += correction * behavior.priority;
            weight += behavior.priority;
            contributors += 1;
        }

        let blended = if weight > 0.0 { sum / weight } else { Vec3::ZERO };
        let result = blended.clamp_length_max(ctx.max_force);
        trace!(contributors, ?result, "blended steering");
        result
    }
}

// ============================================================================
// Agent
// ============================================================================

/// Kinematic body driven by a [`SteeringBlender`].
#[derive(Debug, Clone)]
pub struct SteeringAgent {
    pose: Pose,
    velocity: Vec3,
    /// Velocity magnitude cap
    pub max_speed: f32,
    /// Correction magnitude cap
    pub max_force: f32,
    /// Speed at or below which orientation is left alone
    pub move_epsilon: f32,
    /// Current target
    pub target: Option<TargetInfo>,
    blender: SteeringBlender,
}

impl SteeringAgent {
    /// Creates a stationary agent facing +Z.
    #[must_use]
    pub fn new(position: Vec3, max_speed: f32, max_force: f32) -> Self {
        Self {
            pose: Pose::at(position),
            velocity: Vec3::ZERO,
            max_speed,
            max_force,
            move_epsilon: 0.1,
            target: None,
            blender: SteeringBlender::new(),
        }
    }

    /// Replaces the blender.
    #[must_use]
    pub fn with_blender(mut self, blender: SteeringBlender) -> Self {
        self.blender = blender;
        self
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Current position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.pose.position
    }

    /// Current velocity.
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Sets orientation directly.
    pub fn set_rotation(&mut self, rotation: Quat) {
        self.pose.rotation = rotation;
    }

    /// Behaviors.
    #[must_use]
    pub fn blender(&self) -> &SteeringBlender {
        &self.blender
    }

    /// Behaviors, mutably.
    pub fn blender_mut(&mut self) -> &mut SteeringBlender {
        &mut self.blender
    }

    /// Blends behaviors for the current state without integrating.
    pub fn steering(&mut self, probe: &dyn ObstacleProbe, rng: &mut fastrand::Rng) -> Vec3 {
        let ctx = SteeringContext {
            pose: self.pose,
            velocity: self.velocity,
            max_speed: self.max_speed,
            max_force: self.max_force,
            target: self.target,
            probe,
        };
        self.blender.compute(&ctx, rng)
    }

    /// Blends, then integrates velocity and position over `dt`.
    ///
    /// Orientation follows the velocity only above `move_epsilon`.
    pub fn update(&mut self, dt: f32, probe: &dyn ObstacleProbe, rng: &mut fastrand::Rng) -> Vec3 {
        let correction = self.steering(probe, rng);
        self.velocity = (self.velocity + correction * dt).clamp_length_max(self.max_speed);
        self.pose.position += self.velocity * dt;
        if self.velocity.length() > self.move_epsilon {
            if let Some(rotation) = look_rotation(self.velocity) {
                self.pose.rotation = rotation;
            }
        }
        correction
    }

    /// Zeroes velocity.
    pub fn halt(&mut self) {
        self.velocity = Vec3::ZERO;
    }
}
