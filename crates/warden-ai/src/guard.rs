//! Guard orchestrator driven by a finite state machine.
//!
//! Guards idle, walk between waypoints, chase and shoot at the player, then
//! search the last place they saw it. The five state objects and five
//! conditions below act on a [`GuardModel`] and can be wired either through
//! an authored [`StateGraphAsset`] (see [`default_guard_graph`]) or through
//! the keyed [`StateGraph`] (see [`guard_state_graph`]).

use crate::agent::AgentEvent;
use crate::blackboard::Blackboard;
use crate::config::{AiConfig, GuardConfig};
use crate::dispatcher::Updatable;
use crate::fsm::{
    and, not, BehaviorRegistry, BoxedCondition, ConditionAsset, State, StateAsset, StateCondition,
    StateGraph, StateGraphAsset, StateMachine,
};
use crate::sensing::{Sensing, WeaponRequest};
use glam::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info, warn};
use warden_common::{
    look_rotation, planar_direction, planar_distance, ConfigResult, Pose, SchemaVersion,
};

/// Height of the muzzle above the guard's feet.
const MUZZLE_HEIGHT: f32 = 0.5;
/// Distance of the muzzle ahead of the guard.
const MUZZLE_OFFSET: f32 = 0.8;

// ============================================================================
// Model
// ============================================================================

/// Everything the guard states and conditions read and write.
pub struct GuardModel<S> {
    name: String,
    pose: Pose,
    config: GuardConfig,
    blackboard: Blackboard,
    sensing: S,
    waypoints: Vec<Vec3>,
    patrol_index: usize,
    /// Patrol was left standing on its waypoint during the current tick.
    arrived: bool,
    state_timer: f32,
    shoot_timer: f32,
    last_known_position: Vec3,
    dt: f32,
    events: Vec<AgentEvent>,
}

impl<S: Sensing> GuardModel<S> {
    fn new(
        name: String,
        config: &AiConfig,
        position: Vec3,
        sensing: S,
        waypoints: Vec<Vec3>,
    ) -> Self {
        let guard = config.guard.clone();
        let waypoints = if waypoints.is_empty() {
            let offset = Vec3::Z * guard.default_patrol_offset;
            warn!(guard = %name, "No patrol points, using default points ahead and behind");
            vec![position + offset, position - offset]
        } else {
            waypoints
        };
        Self {
            name,
            pose: Pose::at(position),
            blackboard: Blackboard::new(&config.blackboard),
            sensing,
            waypoints,
            patrol_index: 0,
            arrived: false,
            state_timer: 0.0,
            shoot_timer: guard.shoot_cooldown,
            last_known_position: position,
            dt: 0.0,
            events: Vec::new(),
            config: guard,
        }
    }

    /// Player within detection range, inside the field of view and unoccluded.
    #[must_use]
    pub fn can_see_player(&self) -> bool {
        let Some(player) = self.sensing.target_position() else {
            return false;
        };
        let offset = player - self.pose.position;
        let distance = offset.length();
        if distance > self.config.detection_range {
            return false;
        }
        if distance > f32::EPSILON {
            let angle = self.pose.forward().angle_between(offset).to_degrees();
            if angle > self.config.field_of_view * 0.5 {
                return false;
            }
        }
        self.sensing.has_line_of_sight(self.pose.position)
    }

    /// Player within firing range. Sight is not required.
    #[must_use]
    pub fn player_in_attack_range(&self) -> bool {
        self.sensing.has_target()
            && self.sensing.distance_to_target(self.pose.position) <= self.config.attack_range
    }

    /// Current waypoint within tolerance on the ground plane. True when
    /// there is no waypoint to reach.
    #[must_use]
    pub fn reached_patrol_point(&self) -> bool {
        match self.current_waypoint() {
            Some(point) => {
                planar_distance(self.pose.position, point) < self.config.waypoint_tolerance
            },
            None => true,
        }
    }

    /// Seconds spent in the current idle or search state.
    #[must_use]
    pub fn state_timer(&self) -> f32 {
        self.state_timer
    }

    /// Waypoint currently walked to.
    #[must_use]
    pub fn current_waypoint(&self) -> Option<Vec3> {
        self.waypoints.get(self.patrol_index).copied()
    }

    /// Patrol waypoints.
    #[must_use]
    pub fn waypoints(&self) -> &[Vec3] {
        &self.waypoints
    }

    /// Index of the current waypoint.
    #[must_use]
    pub fn patrol_index(&self) -> usize {
        self.patrol_index
    }

    /// Where the player was last seen.
    #[must_use]
    pub fn last_known_position(&self) -> Vec3 {
        self.last_known_position
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.pose
    }

    /// Tunables.
    #[must_use]
    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn is_alive(&self) -> bool {
        self.blackboard.check_is_alive()
    }

    fn advance_patrol(&mut self) {
        if !self.waypoints.is_empty() {
            self.patrol_index = (self.patrol_index + 1) % self.waypoints.len();
        }
    }

    fn remember_player(&mut self) {
        if let Some(player) = self.sensing.target_position() {
            self.last_known_position = player;
        }
    }

    fn face(&mut self, direction: Vec3) {
        if let Some(rotation) = look_rotation(direction) {
            self.pose.rotation = rotation;
        }
    }

    fn step_toward(&mut self, point: Vec3, speed: f32) {
        let direction = planar_direction(self.pose.position, point);
        if direction == Vec3::ZERO {
            return;
        }
        self.pose.position += direction * speed * self.dt;
        self.face(direction);
    }

    fn turn(&mut self, degrees_per_second: f32) {
        let yaw = Quat::from_rotation_y((degrees_per_second * self.dt).to_radians());
        self.pose.rotation = (yaw * self.pose.rotation).normalize();
    }

    fn try_fire(&mut self, direction: Vec3) -> bool {
        if self.shoot_timer < self.config.shoot_cooldown {
            return false;
        }
        self.shoot_timer = 0.0;
        let request = WeaponRequest {
            origin: self.pose.position + Vec3::Y * MUZZLE_HEIGHT + direction * MUZZLE_OFFSET,
            direction,
            speed: self.config.bullet_speed,
        };
        debug!(guard = %self.name, origin = ?request.origin, "Fire");
        self.events.push(AgentEvent::WeaponFired(request));
        true
    }
}

impl<S> fmt::Debug for GuardModel<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GuardModel")
            .field("name", &self.name)
            .field("pose", &self.pose)
            .field("patrol_index", &self.patrol_index)
            .field("state_timer", &self.state_timer)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// States
// ============================================================================

/// Guard state keys, also the state names used in authored graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GuardState {
    /// Standing still
    Idle,
    /// Walking to the current waypoint
    Patrol,
    /// Running after the player
    Chase,
    /// Shooting at the player
    Attack,
    /// Checking the last known position
    Search,
}

impl GuardState {
    /// Every state, in authored order.
    pub const ALL: [Self; 5] = [
        Self::Idle,
        Self::Patrol,
        Self::Chase,
        Self::Attack,
        Self::Search,
    ];

    /// State name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Patrol => "Patrol",
            Self::Chase => "Chase",
            Self::Attack => "Attack",
            Self::Search => "Search",
        }
    }

    /// Registered behavior implementing this state.
    #[must_use]
    pub fn behavior(self) -> &'static str {
        match self {
            Self::Idle => GuardIdle::NAME,
            Self::Patrol => GuardPatrol::NAME,
            Self::Chase => GuardChase::NAME,
            Self::Attack => GuardAttack::NAME,
            Self::Search => GuardSearch::NAME,
        }
    }
}

impl fmt::Display for GuardState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stands still; restarts the state timer on entry.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardIdle;

impl GuardIdle {
    /// Registry name.
    pub const NAME: &'static str = "guard_idle";
}

impl<S: Sensing> State<GuardModel<S>> for GuardIdle {
    fn enter(&mut self, model: &mut GuardModel<S>) {
        model.state_timer = 0.0;
        if std::mem::take(&mut model.arrived) {
            model.advance_patrol();
        }
        debug!(guard = %model.name, index = model.patrol_index, "Entered Idle");
    }

    fn execute(&mut self, _model: &mut GuardModel<S>) {}
}

/// Walks to the current waypoint.
///
/// The cursor only moves on when Patrol hands over to Idle at the waypoint;
/// a patrol cut short by a sighting keeps its target.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardPatrol;

impl GuardPatrol {
    /// Registry name.
    pub const NAME: &'static str = "guard_patrol";
}

impl<S: Sensing> State<GuardModel<S>> for GuardPatrol {
    fn enter(&mut self, model: &mut GuardModel<S>) {
        debug!(guard = %model.name, index = model.patrol_index, "Entered Patrol");
    }

    fn execute(&mut self, model: &mut GuardModel<S>) {
        if let Some(point) = model.current_waypoint() {
            let speed = model.config.patrol_speed;
            model.step_toward(point, speed);
        }
    }

    fn exit(&mut self, model: &mut GuardModel<S>) {
        model.arrived = model.reached_patrol_point();
    }
}

/// Runs at the player, tracking its position.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardChase;

impl GuardChase {
    /// Registry name.
    pub const NAME: &'static str = "guard_chase";
}

impl<S: Sensing> State<GuardModel<S>> for GuardChase {
    fn enter(&mut self, model: &mut GuardModel<S>) {
        model.remember_player();
        debug!(guard = %model.name, "Entered Chase");
    }

    fn execute(&mut self, model: &mut GuardModel<S>) {
        let Some(player) = model.sensing.target_position() else {
            return;
        };
        let speed = model.config.chase_speed;
        model.step_toward(player, speed);
        model.last_known_position = player;
    }
}

/// Faces the player and fires on cooldown.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardAttack;

impl GuardAttack {
    /// Registry name.
    pub const NAME: &'static str = "guard_attack";
}

impl<S: Sensing> State<GuardModel<S>> for GuardAttack {
    fn enter(&mut self, model: &mut GuardModel<S>) {
        debug!(guard = %model.name, "Entered Attack");
    }

    fn execute(&mut self, model: &mut GuardModel<S>) {
        let Some(player) = model.sensing.target_position() else {
            return;
        };
        let direction = planar_direction(model.pose.position, player);
        if direction == Vec3::ZERO {
            return;
        }
        model.face(direction);
        model.try_fire(direction);
    }
}

/// Walks to the last known position, then turns in place.
#[derive(Debug, Clone, Copy, Default)]
pub struct GuardSearch;

impl GuardSearch {
    /// Registry name.
    pub const NAME: &'static str = "guard_search";
}

impl<S: Sensing> State<GuardModel<S>> for GuardSearch {
    fn enter(&mut self, model: &mut GuardModel<S>) {
        model.state_timer = 0.0;
        debug!(guard = %model.name, at = ?model.last_known_position, "Entered Search");
    }

    fn execute(&mut self, model: &mut GuardModel<S>) {
        let target = model.last_known_position;
        if planar_distance(model.pose.position, target) > model.config.waypoint_tolerance {
            let speed = model.config.patrol_speed;
            model.step_toward(target, speed);
        } else {
            let rate = model.config.search_turn_rate;
            model.turn(rate);
        }
    }
}

// ============================================================================
// Conditions
// ============================================================================

/// See [`GuardModel::can_see_player`].
#[derive(Debug, Clone, Copy, Default)]
pub struct CanSeePlayer;

impl CanSeePlayer {
    /// Registry name.
    pub const NAME: &'static str = "can_see_player";
}

impl<S: Sensing> StateCondition<GuardModel<S>> for CanSeePlayer {
    fn check(&self, model: &GuardModel<S>) -> bool {
        model.can_see_player()
    }
}

/// See [`GuardModel::player_in_attack_range`].
#[derive(Debug, Clone, Copy, Default)]
pub struct PlayerInAttackRange;

impl PlayerInAttackRange {
    /// Registry name.
    pub const NAME: &'static str = "player_in_attack_range";
}

impl<S: Sensing> StateCondition<GuardModel<S>> for PlayerInAttackRange {
    fn check(&self, model: &GuardModel<S>) -> bool {
        model.player_in_attack_range()
    }
}

/// See [`GuardModel::reached_patrol_point`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReachedPatrolPoint;

impl ReachedPatrolPoint {
    /// Registry name.
    pub const NAME: &'static str = "reached_patrol_point";
}

impl<S: Sensing> StateCondition<GuardModel<S>> for ReachedPatrolPoint {
    fn check(&self, model: &GuardModel<S>) -> bool {
        model.reached_patrol_point()
    }
}

/// State timer reached the idle time.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdleTimeElapsed;

impl IdleTimeElapsed {
    /// Registry name.
    pub const NAME: &'static str = "idle_time_elapsed";
}

impl<S: Sensing> StateCondition<GuardModel<S>> for IdleTimeElapsed {
    fn check(&self, model: &GuardModel<S>) -> bool {
        model.state_timer >= model.config.idle_time
    }
}

/// State timer reached the search time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SearchTimeElapsed;

impl SearchTimeElapsed {
    /// Registry name.
    pub const NAME: &'static str = "search_time_elapsed";
}

impl<S: Sensing> StateCondition<GuardModel<S>> for SearchTimeElapsed {
    fn check(&self, model: &GuardModel<S>) -> bool {
        model.state_timer >= model.config.search_time
    }
}

// ============================================================================
// Wiring
// ============================================================================

/// Registry holding every guard behavior and condition.
pub fn guard_registry<S: Sensing + 'static>() -> BehaviorRegistry<GuardModel<S>> {
    let mut registry = BehaviorRegistry::new();
    registry.register_state(GuardIdle::NAME, || {
        Box::new(GuardIdle) as Box<dyn State<GuardModel<S>>>
    });
    registry.register_state(GuardPatrol::NAME, || {
        Box::new(GuardPatrol) as Box<dyn State<GuardModel<S>>>
    });
    registry.register_state(GuardChase::NAME, || {
        Box::new(GuardChase) as Box<dyn State<GuardModel<S>>>
    });
    registry.register_state(GuardAttack::NAME, || {
        Box::new(GuardAttack) as Box<dyn State<GuardModel<S>>>
    });
    registry.register_state(GuardSearch::NAME, || {
        Box::new(GuardSearch) as Box<dyn State<GuardModel<S>>>
    });

    registry.register_condition(CanSeePlayer::NAME, || {
        Box::new(CanSeePlayer) as BoxedCondition<GuardModel<S>>
    });
    registry.register_condition(PlayerInAttackRange::NAME, || {
        Box::new(PlayerInAttackRange) as BoxedCondition<GuardModel<S>>
    });
    registry.register_condition(ReachedPatrolPoint::NAME, || {
        Box::new(ReachedPatrolPoint) as BoxedCondition<GuardModel<S>>
    });
    registry.register_condition(IdleTimeElapsed::NAME, || {
        Box::new(IdleTimeElapsed) as BoxedCondition<GuardModel<S>>
    });
    registry.register_condition(SearchTimeElapsed::NAME, || {
        Box::new(SearchTimeElapsed) as BoxedCondition<GuardModel<S>>
    });
    registry
}

/// Default authored guard graph, starting in Idle.
#[must_use]
pub fn default_guard_graph() -> StateGraphAsset {
    use ConditionAsset as C;
    use GuardState::*;

    let sees = || C::named(CanSeePlayer::NAME);
    let in_range = || C::named(PlayerInAttackRange::NAME);
    let state = |key: GuardState, wiring: Vec<(ConditionAsset, GuardState)>| {
        let (conditions, exits) = wiring
            .into_iter()
            .map(|(condition, exit)| (condition, exit.name().to_string()))
            .unzip();
        StateAsset {
            name: key.name().to_string(),
            behavior: key.behavior().to_string(),
            conditions,
            exits,
        }
    };

    StateGraphAsset {
        version: SchemaVersion::STATE_GRAPH,
        name: "guard".to_string(),
        states: vec![
            state(
                Idle,
                vec![(sees(), Chase), (C::named(IdleTimeElapsed::NAME), Patrol)],
            ),
            state(
                Patrol,
                vec![(sees(), Chase), (C::named(ReachedPatrolPoint::NAME), Idle)],
            ),
            state(
                Chase,
                vec![(in_range(), Attack), (C::Not(Box::new(sees())), Search)],
            ),
            state(
                Attack,
                vec![
                    (C::Not(Box::new(sees())), Search),
                    (C::Not(Box::new(in_range())), Chase),
                ],
            ),
            state(
                Search,
                vec![(sees(), Chase), (C::named(SearchTimeElapsed::NAME), Idle)],
            ),
        ],
    }
}

/// Keyed-graph wiring of the same states, started in Idle.
pub fn guard_state_graph<S: Sensing + 'static>(
    model: &mut GuardModel<S>,
) -> ConfigResult<StateGraph<GuardState, GuardModel<S>>> {
    use GuardState::*;

    let mut graph = StateGraph::new();
    graph.add_state(Idle, GuardIdle);
    graph.add_state(Patrol, GuardPatrol);
    graph.add_state(Chase, GuardChase);
    graph.add_state(Attack, GuardAttack);
    graph.add_state(Search, GuardSearch);

    graph.add_transition(Idle, Patrol, IdleTimeElapsed)?;
    graph.add_transition(Patrol, Idle, ReachedPatrolPoint)?;
    graph.add_transition(Idle, Chase, CanSeePlayer)?;
    graph.add_transition(Patrol, Chase, CanSeePlayer)?;
    graph.add_transition(Chase, Attack, PlayerInAttackRange)?;
    graph.add_transition(Chase, Search, not(CanSeePlayer))?;
    graph.add_transition(Attack, Chase, and(not(PlayerInAttackRange), CanSeePlayer))?;
    graph.add_transition(Attack, Search, not(CanSeePlayer))?;
    graph.add_transition(Search, Chase, CanSeePlayer)?;
    graph.add_transition(Search, Idle, SearchTimeElapsed)?;

    graph.start(Idle, model)?;
    Ok(graph)
}

// ============================================================================
// Agent
// ============================================================================

enum GuardBrain<S> {
    Authored(StateMachine<GuardModel<S>>),
    Keyed(StateGraph<GuardState, GuardModel<S>>),
}

/// Guard agent: a [`GuardModel`] and the machine driving it.
pub struct GuardAgent<S> {
    model: GuardModel<S>,
    brain: GuardBrain<S>,
}

impl<S: Sensing + 'static> GuardAgent<S> {
    /// Creates a guard wired with [`default_guard_graph`].
    ///
    /// Without waypoints the guard patrols two points ahead of and behind
    /// `position`.
    pub fn new(
        name: impl Into<String>,
        config: &AiConfig,
        position: Vec3,
        sensing: S,
        waypoints: Vec<Vec3>,
    ) -> ConfigResult<Self> {
        Self::from_asset(
            name,
            config,
            position,
            sensing,
            waypoints,
            &default_guard_graph(),
            &guard_registry(),
        )
    }

    /// Creates a guard wired from an authored graph.
    pub fn from_asset(
        name: impl Into<String>,
        config: &AiConfig,
        position: Vec3,
        sensing: S,
        waypoints: Vec<Vec3>,
        asset: &StateGraphAsset,
        registry: &BehaviorRegistry<GuardModel<S>>,
    ) -> ConfigResult<Self> {
        config.blackboard.validate()?;
        config.guard.validate()?;
        let mut model = GuardModel::new(name.into(), config, position, sensing, waypoints);
        let machine = registry.build_machine(asset, &mut model)?;
        info!(guard = %model.name, graph = %asset.name, "Guard ready");
        Ok(Self {
            model,
            brain: GuardBrain::Authored(machine),
        })
    }

    /// Creates a guard wired with [`guard_state_graph`].
    pub fn with_state_graph(
        name: impl Into<String>,
        config: &AiConfig,
        position: Vec3,
        sensing: S,
        waypoints: Vec<Vec3>,
    ) -> ConfigResult<Self> {
        config.blackboard.validate()?;
        config.guard.validate()?;
        let mut model = GuardModel::new(name.into(), config, position, sensing, waypoints);
        let graph = guard_state_graph(&mut model)?;
        info!(guard = %model.name, "Guard ready");
        Ok(Self {
            model,
            brain: GuardBrain::Keyed(graph),
        })
    }
}

impl<S: Sensing> GuardAgent<S> {
    /// Advances timers and runs one machine tick.
    pub fn update(&mut self, dt: f32) {
        if !self.model.is_alive() {
            return;
        }
        self.model.dt = dt;
        self.model.state_timer += dt;
        self.model.shoot_timer += dt;
        match &mut self.brain {
            GuardBrain::Authored(machine) => {
                machine.run(&mut self.model);
            },
            GuardBrain::Keyed(graph) => graph.update(&mut self.model),
        }
        self.model.arrived = false;
    }

    /// Applies damage and returns the remaining health.
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        let was_alive = self.model.is_alive();
        let health = self.model.blackboard.apply_damage(amount);
        self.model.blackboard.refresh_alive();
        if was_alive && !self.model.is_alive() {
            self.model.events.push(AgentEvent::Died);
            info!(guard = %self.model.name, "Died");
        }
        health
    }

    /// Name of the active state.
    #[must_use]
    pub fn state_name(&self) -> &str {
        match &self.brain {
            GuardBrain::Authored(machine) => machine.current_state_name(),
            GuardBrain::Keyed(graph) => graph.current().map_or("", GuardState::name),
        }
    }

    /// Takes every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.model.events)
    }

    /// Guard name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.model.name
    }

    /// State and perception data.
    #[must_use]
    pub fn model(&self) -> &GuardModel<S> {
        &self.model
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.model.pose
    }

    /// Whether health remains.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.model.is_alive()
    }
}

impl<S: Sensing> Updatable for GuardAgent<S> {
    fn on_update(&mut self, dt: f32) {
        self.update(dt);
    }

    fn is_active(&self) -> bool {
        self.is_alive()
    }

    fn wants_removal(&self) -> bool {
        !self.is_alive()
    }
}
