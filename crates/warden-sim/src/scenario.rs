//! Scenario construction and the headless run loop.

use crate::config::{ScenarioConfig, SimConfig};
use crate::timing::SimClock;
use anyhow::Result;
use glam::Vec3;
use serde::Serialize;
use std::collections::BTreeMap;
use std::rc::Rc;
use tracing::{debug, info};
use warden_ai::{
    guard_registry, AgentEvent, CivilianAgent, GuardAgent, KinematicMover, NpcAgent,
    PlayerTracker, RecordingAnimator, SphereObstacle, SphereObstacleField, StateGraphAsset,
    TargetHandle, TargetSnapshot, TickDispatcher, Updatable,
};
use warden_common::{planar_direction, planar_distance, random_in_disc, random_range, AgentId};

// ============================================================================
// Player
// ============================================================================

/// Player stand-in walking a fixed loop.
#[derive(Debug)]
pub struct ScriptedPlayer {
    route: Vec<Vec3>,
    index: usize,
    speed: f32,
    position: Vec3,
    handle: TargetHandle,
}

impl ScriptedPlayer {
    /// Places the player on the first route point.
    pub fn new(route: Vec<Vec3>, speed: f32) -> Self {
        let position = route.first().copied().unwrap_or(Vec3::ZERO);
        Self {
            index: usize::from(route.len() > 1),
            route,
            speed,
            position,
            handle: TargetHandle::with_target(TargetSnapshot::at(position)),
        }
    }

    /// Slot every agent reads the player from.
    pub fn handle(&self) -> &TargetHandle {
        &self.handle
    }

    /// Current position.
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Walks toward the next route point and publishes the new snapshot.
    pub fn update(&mut self, dt: f32) {
        let Some(&target) = self.route.get(self.index) else {
            return;
        };
        let step = self.speed * dt;
        let direction = planar_direction(self.position, target);
        if planar_distance(self.position, target) <= step {
            self.position = target;
            self.index = (self.index + 1) % self.route.len();
        } else {
            self.position += direction * step;
        }
        self.handle.set(TargetSnapshot {
            position: self.position,
            velocity: direction * self.speed,
        });
    }
}

// ============================================================================
// Agents
// ============================================================================

/// Orchestrator family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentKind {
    /// Decision-tree NPC
    Npc,
    /// Roulette and steering civilian
    Civilian,
    /// State machine guard
    Guard,
}

/// Any agent the scenario drives.
pub enum SimAgent {
    /// Patrolling NPC
    Npc(NpcAgent<PlayerTracker, KinematicMover, RecordingAnimator>),
    /// Civilian
    Civilian(CivilianAgent<PlayerTracker, Rc<SphereObstacleField>>),
    /// Guard
    Guard(GuardAgent<PlayerTracker>),
}

impl SimAgent {
    /// Orchestrator family.
    pub fn kind(&self) -> AgentKind {
        match self {
            Self::Npc(_) => AgentKind::Npc,
            Self::Civilian(_) => AgentKind::Civilian,
            Self::Guard(_) => AgentKind::Guard,
        }
    }

    /// Agent name.
    pub fn name(&self) -> &str {
        match self {
            Self::Npc(agent) => agent.name(),
            Self::Civilian(agent) => agent.name(),
            Self::Guard(agent) => agent.name(),
        }
    }

    /// Current state label.
    pub fn state_name(&self) -> &str {
        match self {
            Self::Npc(agent) => agent.state().name(),
            Self::Civilian(agent) => agent.state().name(),
            Self::Guard(agent) => agent.state_name(),
        }
    }

    /// Takes pending events.
    pub fn drain_events(&mut self) -> Vec<AgentEvent> {
        match self {
            Self::Npc(agent) => agent.drain_events(),
            Self::Civilian(agent) => agent.drain_events(),
            Self::Guard(agent) => agent.drain_events(),
        }
    }

    fn as_updatable(&self) -> &dyn Updatable {
        match self {
            Self::Npc(agent) => agent,
            Self::Civilian(agent) => agent,
            Self::Guard(agent) => agent,
        }
    }

    fn as_updatable_mut(&mut self) -> &mut dyn Updatable {
        match self {
            Self::Npc(agent) => agent,
            Self::Civilian(agent) => agent,
            Self::Guard(agent) => agent,
        }
    }
}

impl Updatable for SimAgent {
    fn on_update(&mut self, dt: f32) {
        self.as_updatable_mut().on_update(dt);
    }

    fn is_active(&self) -> bool {
        self.as_updatable().is_active()
    }

    fn wants_removal(&self) -> bool {
        self.as_updatable().wants_removal()
    }
}

// ============================================================================
// Summary
// ============================================================================

/// What happened during a run.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
pub struct Summary {
    /// Seed the run used
    pub seed: u64,
    /// Frames fed to the clock
    pub frames: u64,
    /// Dispatcher ticks
    pub ticks: u64,
    /// Simulated seconds
    pub simulated_seconds: f64,
    /// Agents spawned per family
    pub spawned: BTreeMap<AgentKind, usize>,
    /// Discrete state changes reported by agents
    pub state_changes: usize,
    /// Civilian reactions drawn, by name
    pub reactions: BTreeMap<String, usize>,
    /// Fire requests from guards
    pub shots_fired: usize,
    /// Agents that died
    pub deaths: usize,
    /// Civilians that reached an escape point
    pub escapes: usize,
    /// Agents removed from the dispatcher
    pub removed: usize,
    /// Agents still registered, by state label
    pub final_states: BTreeMap<String, usize>,
}

impl Summary {
    fn record(&mut self, agent: &SimAgent, event: &AgentEvent) {
        match event {
            AgentEvent::StateChanged { to, .. } => {
                self.state_changes += 1;
                let reaction = match agent {
                    SimAgent::Civilian(civilian) if *to == "React" => civilian.reaction(),
                    _ => None,
                };
                if let Some(reaction) = reaction {
                    *self.reactions.entry(reaction.to_string()).or_default() += 1;
                }
            },
            AgentEvent::Died => self.deaths += 1,
            AgentEvent::WeaponFired(_) => self.shots_fired += 1,
            AgentEvent::Escaped { .. } => self.escapes += 1,
        }
    }
}

// ============================================================================
// Scenario
// ============================================================================

/// Populated world and the clock that drives it.
pub struct Scenario {
    config: ScenarioConfig,
    clock: SimClock,
    dispatcher: TickDispatcher<SimAgent>,
    player: ScriptedPlayer,
    rng: fastrand::Rng,
    summary: Summary,
}

impl Scenario {
    /// Spawns every agent from `config`, wiring guards with `guard_graph`.
    pub fn build(config: &SimConfig, guard_graph: &StateGraphAsset) -> Result<Self> {
        config.validate()?;
        let scenario = &config.scenario;
        let ai = &config.ai;

        let seed = scenario.seed.unwrap_or_else(|| fastrand::Rng::new().u64(..));
        let mut rng = fastrand::Rng::with_seed(seed);
        let mut summary = Summary {
            seed,
            ..Summary::default()
        };

        let mut field = SphereObstacleField::new(ai.civilian.steering.probe_radius);
        for _ in 0..scenario.pillars {
            let center = random_in_disc(&mut rng, scenario.arena_radius * 0.8);
            field.add(SphereObstacle::new(center, random_range(&mut rng, 1.0, 2.0)));
        }
        let field = Rc::new(field);

        let player = ScriptedPlayer::new(scenario.player_route.clone(), scenario.player_speed);
        let tracker =
            || PlayerTracker::new(player.handle().clone()).with_occluders(Rc::clone(&field));

        let mut dispatcher = TickDispatcher::new();
        let mut spawn = |agent: SimAgent| -> AgentId {
            *summary.spawned.entry(agent.kind()).or_default() += 1;
            debug!(agent = agent.name(), kind = ?agent.kind(), "Spawned");
            dispatcher.register(agent)
        };

        let registry = guard_registry();
        for i in 0..scenario.guards {
            let angle = std::f32::consts::TAU * i as f32 / scenario.guards as f32;
            let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * scenario.arena_radius * 0.5;
            // Odd guards walk a tangent line; even ones get the default points.
            let waypoints = if i % 2 == 1 {
                let tangent = Vec3::new(-angle.sin(), 0.0, angle.cos()) * 4.0;
                vec![position + tangent, position - tangent]
            } else {
                Vec::new()
            };
            let guard = GuardAgent::from_asset(
                format!("guard-{i}"),
                ai,
                position,
                tracker(),
                waypoints,
                guard_graph,
                &registry,
            )?;
            spawn(SimAgent::Guard(guard));
        }

        for i in 0..scenario.npcs {
            let home = random_in_disc(&mut rng, scenario.arena_radius * 0.7);
            let corners = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];
            let points = corners
                .iter()
                .map(|&(x, z)| home + Vec3::new(x, 0.0, z) * 4.0)
                .collect();
            let npc = NpcAgent::new(
                format!("npc-{i}"),
                ai,
                tracker(),
                KinematicMover::new(home, ai.agent.move_speed),
                RecordingAnimator::new(),
                rng.fork(),
            )?
            .with_patrol_points(points);
            spawn(SimAgent::Npc(npc));
        }

        for i in 0..scenario.civilians {
            let position = random_in_disc(&mut rng, scenario.arena_radius * 0.6);
            let civilian = CivilianAgent::new(
                format!("civilian-{i}"),
                ai,
                position,
                tracker(),
                Rc::clone(&field),
                rng.fork(),
            )?
            .with_escape_points(scenario.escape_points.clone());
            spawn(SimAgent::Civilian(civilian));
        }

        info!(
            seed,
            guards = scenario.guards,
            npcs = scenario.npcs,
            civilians = scenario.civilians,
            pillars = scenario.pillars,
            "Scenario built"
        );

        Ok(Self {
            clock: SimClock::new(scenario.fixed_dt),
            config: scenario.clone(),
            dispatcher,
            player,
            rng,
            summary,
        })
    }

    /// Runs until the configured duration has been simulated.
    pub fn run(&mut self) -> &Summary {
        let duration = f64::from(self.config.duration);
        let jitter = self.config.frame_jitter;
        while self.clock.elapsed() < duration {
            let frame = self.config.frame_time + random_range(&mut self.rng, -jitter, jitter);
            let steps = self.clock.accumulate(frame.max(0.0));
            for _ in 0..steps {
                self.step(self.clock.fixed_dt());
            }
        }
        self.finish()
    }

    fn step(&mut self, dt: f32) {
        self.player.update(dt);
        let removed = self.dispatcher.tick(dt);

        for (_, agent) in self.dispatcher.iter_mut() {
            for event in agent.drain_events() {
                self.summary.record(agent, &event);
            }
        }
        for (id, mut agent) in removed {
            for event in agent.drain_events() {
                self.summary.record(&agent, &event);
            }
            info!(%id, agent = agent.name(), "Left the scene");
            self.summary.removed += 1;
        }
    }

    fn finish(&mut self) -> &Summary {
        self.summary.frames = self.clock.frames();
        self.summary.ticks = self.dispatcher.tick_count();
        self.summary.simulated_seconds = self.clock.elapsed();
        self.summary.final_states.clear();
        for (_, agent) in self.dispatcher.iter() {
            let label = format!("{:?}:{}", agent.kind(), agent.state_name());
            *self.summary.final_states.entry(label).or_default() += 1;
        }
        debug!(player = ?self.player.position(), "Run finished");
        &self.summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warden_ai::default_guard_graph;

    fn small_config(seed: u64) -> SimConfig {
        let mut config = SimConfig::default();
        config.scenario.seed = Some(seed);
        config.scenario.duration = 10.0;
        config
    }

    #[test]
    fn test_bundled_guard_graph_matches_builtin() {
        let asset = StateGraphAsset::from_ron(include_str!("../assets/fsm/guard.ron"))
            .expect("bundled graph parses");
        assert_eq!(asset, default_guard_graph());
    }

    #[test]
    fn test_player_walks_route_loop() {
        let route = vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0)];
        let mut player = ScriptedPlayer::new(route, 1.0);
        for _ in 0..4 {
            player.update(0.5);
        }
        assert_eq!(player.position(), Vec3::new(2.0, 0.0, 0.0));
        for _ in 0..4 {
            player.update(0.5);
        }
        assert_eq!(player.position(), Vec3::ZERO);
        let snapshot = player.handle().get().expect("published");
        assert_eq!(snapshot.position, player.position());
    }

    #[test]
    fn test_scenario_spawns_everything() {
        let config = small_config(3);
        let mut scenario = Scenario::build(&config, &default_guard_graph()).expect("builds");
        assert_eq!(scenario.dispatcher.pending_count(), 13);

        let summary = scenario.run().clone();
        assert_eq!(summary.seed, 3);
        assert_eq!(summary.spawned.get(&AgentKind::Guard), Some(&3));
        assert_eq!(summary.spawned.get(&AgentKind::Npc), Some(&4));
        assert_eq!(summary.spawned.get(&AgentKind::Civilian), Some(&6));
        assert!(summary.simulated_seconds >= 10.0);
        assert!(summary.ticks > 500);
        assert!(summary.state_changes > 0);
        let remaining: usize = summary.final_states.values().sum();
        assert_eq!(remaining + summary.removed, 13);
    }

    #[test]
    fn test_same_seed_same_summary() {
        let config = small_config(11);
        let first = Scenario::build(&config, &default_guard_graph())
            .expect("builds")
            .run()
            .clone();
        let second = Scenario::build(&config, &default_guard_graph())
            .expect("builds")
            .run()
            .clone();
        assert_eq!(first, second);
    }

    #[test]
    fn test_summary_serializes_to_json() {
        let mut config = small_config(5);
        config.scenario.duration = 1.0;
        let mut scenario = Scenario::build(&config, &default_guard_graph()).expect("builds");
        let json = serde_json::to_string(scenario.run()).expect("serializable");
        assert!(json.contains("\"shots_fired\""));
        assert!(json.contains("\"guard\":3"));
    }

    #[test]
    fn test_invalid_config_fails_build() {
        let mut config = small_config(1);
        config.ai.guard.detection_range = f32::NAN;
        assert!(Scenario::build(&config, &default_guard_graph()).is_err());
    }
}
