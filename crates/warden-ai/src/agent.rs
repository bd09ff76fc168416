//! Decision-tree NPC orchestrator.
//!
//! Each logic step runs the same pipeline: sense the player into the
//! blackboard, derive the alive flag, evaluate the tree, apply one-shot
//! effects on a state change, then run the continuous behavior of the
//! current state. Steps run at a throttled cadence and use the throttle
//! interval as their delta time.

use crate::blackboard::Blackboard;
use crate::config::{AgentConfig, AiConfig};
use crate::dispatcher::Updatable;
use crate::patrol::PatrolRoute;
use crate::presets::{AiState, NpcIntent, NpcTree, Personality};
use crate::sensing::{AnimationCues, MotionActuator, Sensing, WeaponRequest};
use crate::throttle::LogicThrottle;
use glam::{Quat, Vec3};
use tracing::{debug, info, warn};
use warden_common::{
    look_rotation, planar_direction, planar_distance, random_in_disc, random_range, ConfigResult,
    Pose,
};

/// Notification emitted by an agent for its owner to drain.
#[derive(Debug, Clone, PartialEq)]
pub enum AgentEvent {
    /// Discrete state changed
    StateChanged {
        /// Previous state name
        from: &'static str,
        /// New state name
        to: &'static str,
    },
    /// Health ran out
    Died,
    /// Projectile requested
    WeaponFired(WeaponRequest),
    /// Reached an escape point and asks to be despawned
    Escaped {
        /// Where the agent left the scene
        position: Vec3,
    },
}

/// NPC driven by a [`NpcTree`].
pub struct NpcAgent<S, M, A> {
    name: String,
    config: AgentConfig,
    blackboard: Blackboard,
    personality: Personality,
    tree: NpcTree,
    state: AiState,
    sensing: S,
    mover: M,
    animator: A,
    throttle: LogicThrottle,
    route: PatrolRoute,
    idle_timer: f32,
    idle_threshold: f32,
    dwell_timer: f32,
    dwell_threshold: f32,
    attack_timer: f32,
    rng: fastrand::Rng,
    events: Vec<AgentEvent>,
}

impl<S, M, A> NpcAgent<S, M, A>
where
    S: Sensing,
    M: MotionActuator,
    A: AnimationCues,
{
    /// Creates an idle agent with no waypoints.
    pub fn new(
        name: impl Into<String>,
        config: &AiConfig,
        sensing: S,
        mover: M,
        animator: A,
        mut rng: fastrand::Rng,
    ) -> ConfigResult<Self> {
        config.blackboard.validate()?;
        config.agent.validate()?;
        let agent = config.agent.clone();
        let tree = agent.personality.build_tree()?;
        let idle_threshold = random_range(&mut rng, agent.idle_min, agent.idle_max);
        let dwell_threshold = random_range(&mut rng, agent.dwell_min, agent.dwell_max);

        Ok(Self {
            name: name.into(),
            blackboard: Blackboard::new(&config.blackboard),
            personality: agent.personality,
            tree,
            state: AiState::Idle,
            sensing,
            mover,
            animator,
            throttle: LogicThrottle::new(agent.update_interval),
            route: PatrolRoute::empty(agent.patrol_mode),
            idle_timer: 0.0,
            idle_threshold,
            dwell_timer: 0.0,
            dwell_threshold,
            attack_timer: 0.0,
            rng,
            events: Vec::new(),
            config: agent,
        })
    }

    /// Builder form of [`NpcAgent::set_patrol_points`].
    #[must_use]
    pub fn with_patrol_points(mut self, points: Vec<Vec3>) -> Self {
        self.set_patrol_points(points);
        self
    }

    /// Replaces the waypoints, starting from a random one.
    pub fn set_patrol_points(&mut self, points: Vec<Vec3>) {
        self.route = PatrolRoute::new(
            points,
            self.config.patrol_mode,
            self.config.patrol_jitter,
            &mut self.rng,
        );
        if self.route.is_empty() {
            warn!(agent = %self.name, "No patrol points, patrolling a random area");
            return;
        }
        info!(
            agent = %self.name,
            points = self.route.points().len(),
            index = self.route.index(),
            mode = ?self.route.mode(),
            "Patrol points assigned"
        );
        self.select_patrol_target();
    }

    /// Swaps the decision tree preset.
    pub fn set_personality(&mut self, personality: Personality) -> ConfigResult<()> {
        self.tree = personality.build_tree()?;
        self.personality = personality;
        info!(agent = %self.name, %personality, "Personality set");
        Ok(())
    }

    /// Applies damage and returns the remaining health.
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        let remaining = self.blackboard.apply_damage(amount);
        debug!(agent = %self.name, amount, remaining, "Took damage");
        remaining
    }

    /// Advances by one frame. Logic runs only when the throttle releases a step.
    pub fn update(&mut self, frame_dt: f32) {
        if let Some(dt) = self.throttle.tick(frame_dt) {
            self.step(dt);
        }
    }

    /// Runs one logic step of length `dt`.
    pub fn step(&mut self, dt: f32) {
        self.sense();
        self.blackboard.refresh_alive();

        let decision = self.tree.execute(&self.blackboard);
        for intent in &decision.intents {
            self.apply_intent(intent);
        }
        if decision.state != self.state {
            let previous = self.state;
            self.state = decision.state;
            self.on_state_changed(previous, decision.state);
        }

        self.execute_state(dt);
        self.mover.tick(dt);
    }

    fn sense(&mut self) {
        let bb = &mut self.blackboard;
        if !self.sensing.has_target() {
            bb.clear_sighting();
            return;
        }
        let position = self.mover.pose().position;
        bb.distance_to_player = self.sensing.distance_to_target(position);
        bb.is_player_in_sight = self.sensing.is_target_visible(position, bb.sight_range());
        if bb.is_player_in_sight {
            bb.last_known_player_position = self.sensing.target_position();
        }
    }

    fn apply_intent(&mut self, intent: &NpcIntent) {
        match intent {
            NpcIntent::Cue(cue) => self.animator.apply(cue),
            NpcIntent::RememberPlayerPosition => {
                if let Some(position) = self.sensing.target_position() {
                    self.blackboard.last_known_player_position = Some(position);
                }
            },
            NpcIntent::EnsurePatrolTarget => {
                if self.blackboard.patrol_target.is_none() {
                    self.select_patrol_target();
                }
            },
            NpcIntent::StopMovement => self.mover.stop(),
        }
    }

    fn on_state_changed(&mut self, from: AiState, to: AiState) {
        debug!(agent = %self.name, %from, %to, "State changed");
        self.events.push(AgentEvent::StateChanged {
            from: from.name(),
            to: to.name(),
        });

        match from {
            AiState::Pursuit => self.animator.set_bool("IsChasing", false),
            AiState::Flee => self.animator.set_bool("IsFleeing", false),
            AiState::Attack => self.animator.set_bool("InCombat", false),
            _ => {},
        }

        match to {
            AiState::Idle => {
                self.mover.stop();
                self.animator.set_bool("IsMoving", false);
                self.idle_timer = 0.0;
                self.idle_threshold =
                    random_range(&mut self.rng, self.config.idle_min, self.config.idle_max);
            },
            AiState::Patrol => {
                self.animator.set_bool("IsMoving", true);
                self.dwell_timer = 0.0;
                if self.blackboard.patrol_target.is_none() {
                    self.select_patrol_target();
                }
            },
            AiState::Pursuit => {
                self.animator.set_bool("IsMoving", true);
                self.animator.set_bool("IsChasing", true);
            },
            AiState::Attack => {
                self.mover.stop();
                self.animator.set_bool("IsMoving", false);
                self.attack_timer = 0.0;
            },
            AiState::Flee => {
                self.animator.set_bool("IsMoving", true);
                self.animator.set_bool("IsFleeing", true);
            },
            AiState::Die => {
                self.mover.stop();
                self.animator.set_trigger("Die");
                self.events.push(AgentEvent::Died);
                info!(agent = %self.name, "Died");
            },
        }
    }

    fn execute_state(&mut self, dt: f32) {
        let position = self.mover.pose().position;
        match self.state {
            AiState::Idle => {
                self.idle_timer += dt;
                if self.idle_timer >= self.idle_threshold {
                    self.select_patrol_target();
                    self.idle_timer = 0.0;
                    self.idle_threshold =
                        random_range(&mut self.rng, self.config.idle_min, self.config.idle_max);
                }
            },
            AiState::Patrol => {
                let Some(target) = self.blackboard.patrol_target else {
                    self.select_patrol_target();
                    return;
                };
                if planar_distance(position, target) > self.config.arrival_distance {
                    self.mover.move_toward(target);
                    self.dwell_timer = 0.0;
                    return;
                }
                self.mover.stop();
                self.blackboard.has_reached_patrol_point = true;
                self.dwell_timer += dt;
                if self.dwell_timer >= self.dwell_threshold {
                    self.select_patrol_target();
                    self.dwell_timer = 0.0;
                    self.dwell_threshold =
                        random_range(&mut self.rng, self.config.dwell_min, self.config.dwell_max);
                }
            },
            AiState::Pursuit => {
                let target = if self.blackboard.is_player_in_sight {
                    self.sensing.target_position()
                } else {
                    self.blackboard.last_known_player_position
                };
                if let Some(target) = target {
                    self.mover.move_toward(target);
                }
            },
            AiState::Attack => {
                if let Some(player) = self.sensing.target_position() {
                    if let Some(look) = look_rotation(player - position) {
                        let current = self.mover.pose().rotation;
                        let t = (self.config.turn_rate * dt).min(1.0);
                        self.mover.set_rotation(current.slerp(look, t));
                    }
                }
                self.attack_timer += dt;
                if self.attack_timer >= self.config.attack_cooldown {
                    self.attack_timer = 0.0;
                    self.perform_attack();
                }
            },
            AiState::Flee => {
                if let Some(player) = self.sensing.target_position() {
                    let mut away = planar_direction(player, position);
                    if away == Vec3::ZERO {
                        away = -self.mover.pose().forward();
                    }
                    self.mover
                        .move_toward(position + away * self.config.flee_distance);
                }
            },
            AiState::Die => {},
        }
    }

    /// Fires the attack cue.
    pub fn perform_attack(&mut self) {
        self.animator.set_trigger("Attack");
        debug!(agent = %self.name, "Attack");
    }

    /// Picks the next waypoint, or a random point nearby without waypoints.
    pub fn select_patrol_target(&mut self) {
        self.route.advance(&mut self.rng);
        let target = match self.route.target(&mut self.rng) {
            Some(target) => target,
            None => {
                let origin = self.mover.pose().position;
                debug!(agent = %self.name, "Fallback patrol area");
                origin + random_in_disc(&mut self.rng, self.config.patrol_range)
            },
        };
        self.blackboard.patrol_target = Some(target);
        self.blackboard.has_reached_patrol_point = false;
    }

    /// Takes every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Agent name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current discrete state.
    #[must_use]
    pub fn state(&self) -> AiState {
        self.state
    }

    /// Active personality.
    #[must_use]
    pub fn personality(&self) -> Personality {
        self.personality
    }

    /// Facts used by the tree.
    #[must_use]
    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    /// Mutable facts, for scripted scenarios.
    pub fn blackboard_mut(&mut self) -> &mut Blackboard {
        &mut self.blackboard
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.mover.pose()
    }

    /// Current rotation.
    #[must_use]
    pub fn rotation(&self) -> Quat {
        self.mover.pose().rotation
    }

    /// Waypoints.
    #[must_use]
    pub fn route(&self) -> &PatrolRoute {
        &self.route
    }

    /// Movement layer.
    #[must_use]
    pub fn mover(&self) -> &M {
        &self.mover
    }

    /// Animation sink.
    #[must_use]
    pub fn animator(&self) -> &A {
        &self.animator
    }

    /// Sensing layer.
    #[must_use]
    pub fn sensing(&self) -> &S {
        &self.sensing
    }

    /// Whether the agent still needs updates.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.state != AiState::Die
    }
}

impl<S, M, A> Updatable for NpcAgent<S, M, A>
where
    S: Sensing,
    M: MotionActuator,
    A: AnimationCues,
{
    fn on_update(&mut self, dt: f32) {
        self.update(dt);
    }

    fn is_active(&self) -> bool {
        self.is_alive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sensing::{
        KinematicMover, PlayerTracker, RecordingAnimator, TargetHandle, TargetSnapshot,
    };

    type TestAgent = NpcAgent<PlayerTracker, KinematicMover, RecordingAnimator>;

    fn agent_with(handle: &TargetHandle, config: &AiConfig) -> TestAgent {
        NpcAgent::new(
            "npc",
            config,
            PlayerTracker::new(handle.clone()),
            KinematicMover::new(Vec3::ZERO, config.agent.move_speed),
            RecordingAnimator::new(),
            fastrand::Rng::with_seed(42),
        )
        .expect("valid config")
    }

    fn agent(handle: &TargetHandle) -> TestAgent {
        agent_with(handle, &AiConfig::default())
    }

    fn run(agent: &mut TestAgent, steps: usize) {
        for _ in 0..steps {
            agent.update(0.1);
        }
    }

    #[test]
    fn test_logic_waits_for_throttle() {
        let handle = TargetHandle::with_target(TargetSnapshot::at(Vec3::new(0.0, 0.0, 2.0)));
        let mut agent = agent(&handle);
        agent.update(0.05);
        assert_eq!(agent.state(), AiState::Idle);
        agent.update(0.05);
        assert_eq!(agent.state(), AiState::Attack);
    }

    #[test]
    fn test_patrols_waypoints_and_rests() {
        let handle = TargetHandle::new();
        let mut agent = agent(&handle).with_patrol_points(vec![
            Vec3::new(6.0, 0.0, 0.0),
            Vec3::new(6.0, 0.0, 6.0),
        ]);
        assert!(agent.blackboard().patrol_target.is_some());

        run(&mut agent, 1);
        assert_eq!(agent.state(), AiState::Patrol);
        assert!(agent.mover().is_moving());
        assert_eq!(agent.animator().bool_value("IsMoving"), Some(true));

        run(&mut agent, 100);
        let events = agent.drain_events();
        assert!(events
            .iter()
            .any(|e| matches!(e, AgentEvent::StateChanged { to: "Idle", .. })));
        assert!(agent.pose().position.length() > 1.0);
    }

    #[test]
    fn test_fallback_patrol_stays_in_range() {
        let handle = TargetHandle::new();
        let mut agent = agent(&handle);
        run(&mut agent, 1);
        let target = agent.blackboard().patrol_target.expect("fallback target");
        assert!(planar_distance(Vec3::ZERO, target) <= 10.0 + 1e-3);
    }

    #[test]
    fn test_low_health_flees_from_player() {
        let handle = TargetHandle::with_target(TargetSnapshot::at(Vec3::new(5.0, 0.0, 0.0)));
        let mut agent = agent(&handle);
        agent.take_damage(80.0);
        run(&mut agent, 10);

        assert_eq!(agent.state(), AiState::Flee);
        assert!(agent.pose().position.x < -1.0);
        assert_eq!(agent.animator().bool_value("IsFleeing"), Some(true));
        assert!(agent.animator().trigger_count("Panic") >= 1);
    }

    #[test]
    fn test_pursues_then_attacks() {
        let handle = TargetHandle::with_target(TargetSnapshot::at(Vec3::new(0.0, 0.0, 8.0)));
        let mut agent = agent(&handle);
        run(&mut agent, 1);
        assert_eq!(agent.state(), AiState::Pursuit);
        assert_eq!(agent.animator().bool_value("IsChasing"), Some(true));
        assert_eq!(agent.blackboard().last_known_player_position, Some(Vec3::new(0.0, 0.0, 8.0)));

        run(&mut agent, 30);
        assert_eq!(agent.state(), AiState::Attack);
        assert!(!agent.mover().is_moving());
        assert_eq!(agent.animator().bool_value("IsChasing"), Some(false));
        assert_eq!(agent.animator().bool_value("InCombat"), Some(true));

        run(&mut agent, 10);
        assert!(agent.animator().trigger_count("Attack") >= 1);
    }

    #[test]
    fn test_death_fires_once_and_deactivates() {
        let handle = TargetHandle::with_target(TargetSnapshot::at(Vec3::new(0.0, 0.0, 2.0)));
        let mut agent = agent(&handle);
        run(&mut agent, 2);
        assert_eq!(agent.take_damage(500.0), 0.0);
        run(&mut agent, 5);

        assert_eq!(agent.state(), AiState::Die);
        assert!(!agent.is_active());
        assert!(!agent.mover().is_moving());
        assert_eq!(agent.animator().trigger_count("Die"), 1);
        assert_eq!(
            agent
                .drain_events()
                .iter()
                .filter(|e| **e == AgentEvent::Died)
                .count(),
            1
        );
    }

    #[test]
    fn test_personality_switch() {
        let handle = TargetHandle::with_target(TargetSnapshot::at(Vec3::new(0.0, 0.0, 2.0)));
        let mut agent = agent(&handle);
        agent
            .set_personality(Personality::Defensive)
            .expect("preset builds");
        run(&mut agent, 1);
        assert_eq!(agent.personality(), Personality::Defensive);
        assert_eq!(agent.state(), AiState::Flee);
        assert_eq!(agent.animator().bool_value("IsScared"), Some(true));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let handle = TargetHandle::new();
        let mut config = AiConfig::default();
        config.agent.update_interval = 0.0;
        assert!(NpcAgent::new(
            "npc",
            &config,
            PlayerTracker::new(handle),
            KinematicMover::new(Vec3::ZERO, 3.0),
            RecordingAnimator::new(),
            fastrand::Rng::with_seed(1),
        )
        .is_err());
    }
}
