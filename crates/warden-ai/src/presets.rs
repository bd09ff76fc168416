//! Prebuilt NPC decision trees.

use crate::decision::{ComplexAction, Condition, DecisionNode, DecisionTree};
use crate::sensing::AnimationCue;
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::fmt;
use std::str::FromStr;
use warden_common::ConfigResult;

/// Discrete behavior state of a decision-tree NPC.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AiState {
    /// Resting
    #[default]
    Idle,
    /// Walking between waypoints
    Patrol,
    /// Chasing the player
    Pursuit,
    /// Fighting the player
    Attack,
    /// Running away
    Flee,
    /// Dead
    Die,
}

impl AiState {
    /// Display name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Patrol => "Patrol",
            Self::Pursuit => "Pursuit",
            Self::Attack => "Attack",
            Self::Flee => "Flee",
            Self::Die => "Die",
        }
    }
}

impl fmt::Display for AiState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Side effect requested by a decision, applied by the owning agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NpcIntent {
    /// Forward a cue to the animation sink
    Cue(AnimationCue),
    /// Copy the sensed player position into the blackboard
    RememberPlayerPosition,
    /// Pick a patrol target if none is set
    EnsurePatrolTarget,
    /// Halt the mover
    StopMovement,
}

/// Decision tree used by NPC agents.
pub type NpcTree = DecisionTree<AiState, NpcIntent>;

type Node = DecisionNode<AiState, NpcIntent>;

/// Decision tree preset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Personality {
    /// Flees when hurt, otherwise fights
    #[default]
    Standard,
    /// Always engages
    Aggressive,
    /// Always runs
    Defensive,
}

impl Personality {
    /// Builds the matching tree.
    pub fn build_tree(self) -> ConfigResult<NpcTree> {
        match self {
            Self::Standard => standard_tree(),
            Self::Aggressive => aggressive_tree(),
            Self::Defensive => defensive_tree(),
        }
    }

    /// Lowercase name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Aggressive => "aggressive",
            Self::Defensive => "defensive",
        }
    }
}

impl fmt::Display for Personality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Personality {
    type Err = Infallible;

    /// Case-insensitive; unknown names select [`Personality::Standard`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "aggressive" => Self::Aggressive,
            "defensive" => Self::Defensive,
            _ => Self::Standard,
        })
    }
}

fn cue(cue: AnimationCue) -> NpcIntent {
    NpcIntent::Cue(cue)
}

fn dead() -> Node {
    DecisionNode::action_with(AiState::Die, vec![NpcIntent::StopMovement])
}

/// Alive, then sight, then health decides between fleeing and fighting.
///
/// Low health takes priority over attacking even when the player is in reach.
pub fn standard_tree() -> ConfigResult<NpcTree> {
    let attack = ComplexAction::new(AiState::Attack, AiState::Idle)
        .guarded_by(Condition::PlayerInSight)
        .on_enter(cue(AnimationCue::set_bool("InCombat", true)));

    let engaged = DecisionNode::branch(
        Condition::LowHealth,
        DecisionNode::action_with(AiState::Flee, vec![cue(AnimationCue::trigger("Panic"))]),
        DecisionNode::branch(
            Condition::PlayerInAttackRange,
            attack.into(),
            DecisionNode::action_with(
                AiState::Pursuit,
                vec![
                    cue(AnimationCue::set_bool("IsChasing", true)),
                    NpcIntent::RememberPlayerPosition,
                ],
            ),
        ),
    );

    let unaware = DecisionNode::branch(
        Condition::ArrivedAtPoint,
        DecisionNode::action(AiState::Idle),
        DecisionNode::action_with(AiState::Patrol, vec![NpcIntent::EnsurePatrolTarget]),
    );

    DecisionTree::new(DecisionNode::branch(
        Condition::IsAlive,
        DecisionNode::branch(Condition::PlayerInSight, engaged, unaware),
        dead(),
    ))
}

/// Pursues and attacks whenever the player is seen.
pub fn aggressive_tree() -> ConfigResult<NpcTree> {
    DecisionTree::new(DecisionNode::branch(
        Condition::IsAlive,
        DecisionNode::branch(
            Condition::PlayerInSight,
            DecisionNode::branch(
                Condition::PlayerInAttackRange,
                DecisionNode::action_with(
                    AiState::Attack,
                    vec![cue(AnimationCue::set_float("AttackSpeed", 1.5))],
                ),
                DecisionNode::action(AiState::Pursuit),
            ),
            DecisionNode::action(AiState::Patrol),
        ),
        dead(),
    ))
}

/// Flees whenever the player is seen.
pub fn defensive_tree() -> ConfigResult<NpcTree> {
    DecisionTree::new(DecisionNode::branch(
        Condition::IsAlive,
        DecisionNode::branch(
            Condition::PlayerInSight,
            DecisionNode::action_with(
                AiState::Flee,
                vec![cue(AnimationCue::set_bool("IsScared", true))],
            ),
            DecisionNode::action(AiState::Patrol),
        ),
        dead(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blackboard::Blackboard;

    fn engaged_blackboard(health: f32, distance: f32) -> Blackboard {
        let mut bb = Blackboard::default();
        bb.is_alive = true;
        bb.is_player_in_sight = true;
        bb.set_current_health(health);
        bb.distance_to_player = distance;
        bb
    }

    #[test]
    fn test_low_health_flees_before_pursuit() {
        let tree = standard_tree().expect("preset");
        let bb = engaged_blackboard(20.0, 10.0);
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, AiState::Flee);
        assert_eq!(decision.intents, vec![cue(AnimationCue::trigger("Panic"))]);
    }

    #[test]
    fn test_low_health_flees_even_in_reach() {
        let tree = standard_tree().expect("preset");
        assert_eq!(tree.evaluate_state(&engaged_blackboard(20.0, 1.0)), AiState::Flee);
    }

    #[test]
    fn test_healthy_in_reach_attacks() {
        let tree = standard_tree().expect("preset");
        let decision = tree.execute(&engaged_blackboard(80.0, 2.0));
        assert_eq!(decision.state, AiState::Attack);
        assert_eq!(
            decision.intents,
            vec![cue(AnimationCue::set_bool("InCombat", true))]
        );
    }

    #[test]
    fn test_healthy_out_of_reach_pursues() {
        let tree = standard_tree().expect("preset");
        let decision = tree.execute(&engaged_blackboard(80.0, 10.0));
        assert_eq!(decision.state, AiState::Pursuit);
        assert!(decision.intents.contains(&NpcIntent::RememberPlayerPosition));
    }

    #[test]
    fn test_unseen_at_point_idles() {
        let tree = standard_tree().expect("preset");
        let mut bb = engaged_blackboard(80.0, 10.0);
        bb.is_player_in_sight = false;
        bb.has_reached_patrol_point = true;
        assert_eq!(tree.evaluate_state(&bb), AiState::Idle);

        bb.has_reached_patrol_point = false;
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, AiState::Patrol);
        assert_eq!(decision.intents, vec![NpcIntent::EnsurePatrolTarget]);
    }

    #[test]
    fn test_dead_regardless_of_other_fields() {
        for personality in [
            Personality::Standard,
            Personality::Aggressive,
            Personality::Defensive,
        ] {
            let tree = personality.build_tree().expect("preset");
            for (health, distance, sighted) in [(80.0, 2.0, true), (20.0, 10.0, false), (0.0, 1.0, true)]
            {
                let mut bb = engaged_blackboard(health, distance);
                bb.is_player_in_sight = sighted;
                bb.is_alive = false;
                assert_eq!(tree.evaluate_state(&bb), AiState::Die);
            }
        }
    }

    #[test]
    fn test_execute_is_deterministic() {
        let tree = standard_tree().expect("preset");
        let bb = engaged_blackboard(80.0, 2.0);
        let first = tree.execute(&bb);
        for _ in 0..10 {
            assert_eq!(tree.execute(&bb), first);
        }
    }

    #[test]
    fn test_aggressive_and_defensive() {
        let aggressive = aggressive_tree().expect("preset");
        let defensive = defensive_tree().expect("preset");
        let bb = engaged_blackboard(20.0, 2.0);

        let decision = aggressive.execute(&bb);
        assert_eq!(decision.state, AiState::Attack);
        assert_eq!(
            decision.intents,
            vec![cue(AnimationCue::set_float("AttackSpeed", 1.5))]
        );
        assert_eq!(defensive.evaluate_state(&bb), AiState::Flee);
    }

    #[test]
    fn test_personality_parsing() {
        assert_eq!("AGGRESSIVE".parse::<Personality>(), Ok(Personality::Aggressive));
        assert_eq!("Defensive".parse::<Personality>(), Ok(Personality::Defensive));
        assert_eq!("berserk".parse::<Personality>(), Ok(Personality::Standard));
        assert_eq!(Personality::Defensive.to_string(), "defensive");
    }
}
