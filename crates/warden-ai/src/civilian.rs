//! Civilian orchestrator: a roulette-chosen reaction expressed through steering.
//!
//! Calm civilians wander. On first sighting the player they draw one
//! [`Reaction`] and keep it while the player stays in sight. Losing the
//! player resets the reaction and makes the civilian ignore the player for a
//! short cooldown.

use crate::agent::AgentEvent;
use crate::blackboard::Blackboard;
use crate::config::{AiConfig, CivilianConfig};
use crate::decision::{ComplexAction, Condition, DecisionNode, DecisionTree};
use crate::dispatcher::Updatable;
use crate::roulette::RouletteWheel;
use crate::sensing::Sensing;
use crate::steering::{
    BehaviorKind, ObstacleProbe, SteeringAgent, SteeringBehavior, SteeringBlender, SteeringKind,
    TargetInfo, WanderState,
};
use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};
use warden_common::{planar_distance, ConfigResult, Pose};

/// Response drawn when the player is first noticed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reaction {
    /// Head for the nearest escape point, or run from the player
    Flee,
    /// Chase the player
    Attack,
    /// Back away from the player
    Hide,
    /// Wander erratically, then flee
    Panic,
}

impl fmt::Display for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Discrete civilian state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CivilianState {
    /// Calm wandering
    #[default]
    Wander,
    /// Acting on a drawn reaction
    React,
    /// Dead
    Die,
}

impl CivilianState {
    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Wander => "Wander",
            Self::React => "React",
            Self::Die => "Die",
        }
    }
}

/// Alive, then sight: react or wander.
pub fn civilian_tree() -> ConfigResult<DecisionTree<CivilianState, ()>> {
    let react = ComplexAction::new(CivilianState::React, CivilianState::Wander)
        .guarded_by(Condition::PlayerInSight);
    DecisionTree::new(DecisionNode::branch(
        Condition::IsAlive,
        DecisionNode::branch(
            Condition::PlayerInSight,
            react.into(),
            DecisionNode::action(CivilianState::Wander),
        ),
        DecisionNode::action(CivilianState::Die),
    ))
}

/// Wander circle used while calm. The circle target is kept between modes.
const CALM_WANDER: WanderState = WanderState::new(2.0, 3.0, 1.0);

/// Panic jitter amplitude.
const PANIC_JITTER: f32 = 5.0;

fn enable(
    blender: &mut SteeringBlender,
    kind: SteeringKind,
    priority: f32,
) -> Option<&mut SteeringBehavior> {
    let behavior = blender.get_mut(kind)?;
    behavior.active = true;
    behavior.priority = priority;
    Some(behavior)
}

fn set_flee_radius(behavior: Option<&mut SteeringBehavior>, radius: f32) {
    if let Some(SteeringBehavior {
        kind: BehaviorKind::Flee { radius: r },
        ..
    }) = behavior
    {
        *r = radius;
    }
}

/// Civilian driven by a decision tree, a roulette wheel and a steering blender.
pub struct CivilianAgent<S, P> {
    name: String,
    config: CivilianConfig,
    blackboard: Blackboard,
    tree: DecisionTree<CivilianState, ()>,
    state: CivilianState,
    wheel: RouletteWheel<Reaction>,
    reaction: Option<Reaction>,
    steering: SteeringAgent,
    sensing: S,
    probe: P,
    escape_points: Vec<Vec3>,
    escape_target: Option<Vec3>,
    panic_timer: f32,
    lost_timer: f32,
    escaped: bool,
    rng: fastrand::Rng,
    events: Vec<AgentEvent>,
}

impl<S, P> CivilianAgent<S, P>
where
    S: Sensing,
    P: ObstacleProbe,
{
    /// Creates a wandering civilian at `position`.
    ///
    /// Zero weights are left off the wheel; all-zero weights are rejected.
    pub fn new(
        name: impl Into<String>,
        config: &AiConfig,
        position: Vec3,
        sensing: S,
        probe: P,
        rng: fastrand::Rng,
    ) -> ConfigResult<Self> {
        config.blackboard.validate()?;
        config.civilian.validate()?;
        let civilian = config.civilian.clone();

        let weights = civilian.weights.normalized();
        let wheel = RouletteWheel::new(
            [
                (Reaction::Flee, weights.flee),
                (Reaction::Attack, weights.attack),
                (Reaction::Hide, weights.hide),
                (Reaction::Panic, weights.panic),
            ]
            .into_iter()
            .filter(|(_, weight)| *weight != 0.0),
        )?;

        let blender = SteeringBlender::new()
            .with(SteeringBehavior::obstacle_avoidance())
            .with(SteeringBehavior {
                priority: 3.0,
                active: true,
                kind: BehaviorKind::Flee {
                    radius: civilian.detection_range,
                },
            })
            .with(SteeringBehavior::pursuit().with_priority(2.0))
            .with(SteeringBehavior::wander().with_priority(1.0));
        let mut steering = SteeringAgent::new(
            position,
            civilian.steering.max_speed,
            civilian.steering.max_force,
        )
        .with_blender(blender);
        steering.move_epsilon = civilian.steering.move_epsilon;

        let mut agent = Self {
            name: name.into(),
            blackboard: Blackboard::new(&config.blackboard),
            tree: civilian_tree()?,
            state: CivilianState::Wander,
            wheel,
            reaction: None,
            steering,
            sensing,
            probe,
            escape_points: Vec::new(),
            escape_target: None,
            panic_timer: 0.0,
            lost_timer: 0.0,
            escaped: false,
            rng,
            events: Vec::new(),
            config: civilian,
        };
        agent.set_wander_mode();
        Ok(agent)
    }

    /// Builder form of [`CivilianAgent::set_escape_points`].
    #[must_use]
    pub fn with_escape_points(mut self, points: Vec<Vec3>) -> Self {
        self.set_escape_points(points);
        self
    }

    /// Replaces the escape points.
    pub fn set_escape_points(&mut self, points: Vec<Vec3>) {
        info!(agent = %self.name, points = points.len(), "Escape points assigned");
        self.escape_points = points;
    }

    /// Applies damage and returns the remaining health.
    pub fn take_damage(&mut self, amount: f32) -> f32 {
        self.blackboard.apply_damage(amount)
    }

    /// Advances by one frame.
    pub fn update(&mut self, dt: f32) {
        if self.escaped {
            return;
        }
        self.lost_timer = (self.lost_timer - dt).max(0.0);
        self.sense();
        self.blackboard.refresh_alive();

        let next = self.tree.evaluate_state(&self.blackboard);
        if next != self.state {
            let previous = self.state;
            self.state = next;
            self.on_state_changed(previous, next);
        }

        match self.state {
            CivilianState::React => self.update_reaction(dt),
            CivilianState::Die => {
                self.steering.halt();
                return;
            },
            CivilianState::Wander => {},
        }

        self.steering.update(dt, &self.probe, &mut self.rng);
        self.check_escape();
    }

    fn sense(&mut self) {
        let bb = &mut self.blackboard;
        if !self.sensing.has_target() {
            bb.clear_sighting();
            return;
        }
        let position = self.steering.position();
        bb.distance_to_player = self.sensing.distance_to_target(position);
        bb.is_player_in_sight = self.lost_timer <= 0.0
            && self
                .sensing
                .is_target_visible(position, self.config.detection_range);
        if bb.is_player_in_sight {
            bb.last_known_player_position = self.sensing.target_position();
        }
    }

    fn on_state_changed(&mut self, from: CivilianState, to: CivilianState) {
        debug!(agent = %self.name, from = from.name(), to = to.name(), "State changed");
        self.events.push(AgentEvent::StateChanged {
            from: from.name(),
            to: to.name(),
        });

        match to {
            CivilianState::React => {
                let reaction = self.wheel.draw(&mut self.rng);
                info!(agent = %self.name, %reaction, "Noticed player");
                self.configure_reaction(reaction);
            },
            CivilianState::Wander => {
                debug!(agent = %self.name, "Lost sight of player");
                self.reaction = None;
                self.escape_target = None;
                self.lost_timer = self.config.lost_cooldown;
                self.set_wander_mode();
            },
            CivilianState::Die => {
                self.steering.halt();
                self.events.push(AgentEvent::Died);
                info!(agent = %self.name, "Died");
            },
        }
    }

    fn player_target(&self) -> Option<TargetInfo> {
        self.sensing.target_position().map(|position| TargetInfo {
            position,
            velocity: self.sensing.target_velocity(),
        })
    }

    fn configure_reaction(&mut self, reaction: Reaction) {
        self.reaction = Some(reaction);
        self.escape_target = None;
        let detection = self.config.detection_range;
        let player = self.player_target();
        let nearest = self.nearest_escape_point();

        let blender = self.steering.blender_mut();
        for kind in [SteeringKind::Flee, SteeringKind::Pursuit, SteeringKind::Wander] {
            if let Some(behavior) = blender.get_mut(kind) {
                behavior.active = false;
            }
        }
        if let Some(avoidance) = blender.get_mut(SteeringKind::ObstacleAvoidance) {
            avoidance.active = true;
        }

        match reaction {
            Reaction::Flee => match nearest {
                Some(point) => {
                    enable(blender, SteeringKind::Pursuit, 5.0);
                    self.escape_target = Some(point);
                    self.steering.target = Some(TargetInfo::at(point));
                },
                None => {
                    set_flee_radius(enable(blender, SteeringKind::Flee, 4.0), detection * 2.0);
                    self.steering.target = player;
                },
            },
            Reaction::Attack => {
                enable(blender, SteeringKind::Pursuit, 4.0);
                self.steering.target = player;
            },
            Reaction::Hide => {
                set_flee_radius(enable(blender, SteeringKind::Flee, 2.0), detection * 1.5);
                self.steering.target = player;
            },
            Reaction::Panic => {
                if let Some(wander) = enable(blender, SteeringKind::Wander, 4.0)
                    .and_then(SteeringBehavior::wander_state_mut)
                {
                    wander.jitter = PANIC_JITTER;
                }
                self.panic_timer = self.config.panic_duration;
                self.steering.target = player;
            },
        }
        debug!(agent = %self.name, %reaction, escaping = self.escape_target.is_some(), "Reaction configured");
    }

    fn set_wander_mode(&mut self) {
        self.steering.target = None;
        let blender = self.steering.blender_mut();
        for kind in [SteeringKind::Flee, SteeringKind::Pursuit] {
            if let Some(behavior) = blender.get_mut(kind) {
                behavior.active = false;
            }
        }
        if let Some(wander) =
            enable(blender, SteeringKind::Wander, 2.0).and_then(SteeringBehavior::wander_state_mut)
        {
            wander.radius = CALM_WANDER.radius;
            wander.distance = CALM_WANDER.distance;
            wander.jitter = CALM_WANDER.jitter;
        }
        enable(blender, SteeringKind::ObstacleAvoidance, 5.0);
    }

    fn update_reaction(&mut self, dt: f32) {
        match self.reaction {
            Some(Reaction::Panic) => {
                self.panic_timer -= dt;
                if self.panic_timer <= 0.0 {
                    debug!(agent = %self.name, "Panic ended, fleeing");
                    self.configure_reaction(Reaction::Flee);
                }
            },
            Some(Reaction::Flee) if self.escape_target.is_some() => {
                self.steering.target = self.escape_target.map(TargetInfo::at);
            },
            Some(_) => self.steering.target = self.player_target(),
            None => {},
        }
    }

    fn check_escape(&mut self) {
        let Some(point) = self.escape_target else {
            return;
        };
        let position = self.steering.position();
        if planar_distance(position, point) <= self.config.escape_reach_distance {
            self.escaped = true;
            self.steering.halt();
            self.events.push(AgentEvent::Escaped { position });
            info!(agent = %self.name, "Reached escape point");
        }
    }

    fn nearest_escape_point(&self) -> Option<Vec3> {
        let position = self.steering.position();
        self.escape_points
            .iter()
            .copied()
            .min_by(|a, b| planar_distance(position, *a).total_cmp(&planar_distance(position, *b)))
    }

    /// Takes every event emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        std::mem::take(&mut self.events)
    }

    /// Civilian name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current discrete state.
    #[must_use]
    pub fn state(&self) -> CivilianState {
        self.state
    }

    /// Reaction in effect, if reacting.
    #[must_use]
    pub fn reaction(&self) -> Option<Reaction> {
        self.reaction
    }

    /// Whether heading for an escape point.
    #[must_use]
    pub fn is_escaping(&self) -> bool {
        self.escape_target.is_some()
    }

    /// Escape point being pursued.
    #[must_use]
    pub fn escape_target(&self) -> Option<Vec3> {
        self.escape_target
    }

    /// Whether an escape point was reached.
    #[must_use]
    pub fn has_escaped(&self) -> bool {
        self.escaped
    }

    /// Seconds left before the player can be noticed again.
    #[must_use]
    pub fn lost_cooldown_remaining(&self) -> f32 {
        self.lost_timer
    }

    /// Kinematic body and blender.
    #[must_use]
    pub fn steering(&self) -> &SteeringAgent {
        &self.steering
    }

    /// Reaction wheel.
    #[must_use]
    pub fn wheel(&self) -> &RouletteWheel<Reaction> {
        &self.wheel
    }

    /// Facts used by the tree.
    #[must_use]
    pub fn blackboard(&self) -> &Blackboard {
        &self.blackboard
    }

    /// Current pose.
    #[must_use]
    pub fn pose(&self) -> Pose {
        self.steering.pose()
    }
}

impl<S, P> Updatable for CivilianAgent<S, P>
where
    S: Sensing,
    P: ObstacleProbe,
{
    fn on_update(&mut self, dt: f32) {
        self.update(dt);
    }

    fn is_active(&self) -> bool {
        self.state != CivilianState::Die && !self.escaped
    }

    fn wants_removal(&self) -> bool {
        self.escaped
    }
}
