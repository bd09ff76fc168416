//! Decision trees over a [`Blackboard`].
//!
//! A tree is a closed set of node variants walked once from the root per
//! evaluation. Terminal nodes yield a discrete state; side effects are not
//! performed by the tree but returned as intent values for the owner to apply.
//! Evaluation is a pure function of the blackboard snapshot.

use crate::blackboard::Blackboard;
use std::fmt;
use std::sync::Arc;
use warden_common::{ConfigError, ConfigResult};

/// Deepest tree accepted by [`DecisionTree::new`].
pub const MAX_TREE_DEPTH: usize = 32;

/// Blackboard predicate supplied by the caller.
#[derive(Clone)]
pub struct CustomCondition {
    label: &'static str,
    predicate: Arc<dyn Fn(&Blackboard) -> bool + Send + Sync>,
}

impl CustomCondition {
    /// Wraps a predicate under a label used in logs and debug output.
    pub fn new<F>(label: &'static str, predicate: F) -> Self
    where
        F: Fn(&Blackboard) -> bool + Send + Sync + 'static,
    {
        Self {
            label,
            predicate: Arc::new(predicate),
        }
    }

    /// Label given at construction.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.label
    }
}

impl fmt::Debug for CustomCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CustomCondition").field(&self.label).finish()
    }
}

/// Predicate evaluated at a branch.
#[derive(Debug, Clone)]
pub enum Condition {
    /// Agent is alive
    IsAlive,
    /// Player detected
    PlayerInSight,
    /// Health at or below the low threshold
    LowHealth,
    /// Player detected and within attack range
    PlayerInAttackRange,
    /// Patrol destination reached
    ArrivedAtPoint,
    /// Health exhausted
    HealthDepleted,
    /// Negation
    Not(Box<Condition>),
    /// Every condition holds
    All(Vec<Condition>),
    /// At least one condition holds
    Any(Vec<Condition>),
    /// Caller-supplied predicate
    Custom(CustomCondition),
}

impl Condition {
    /// Evaluates against a blackboard.
    #[must_use]
    pub fn holds(&self, bb: &Blackboard) -> bool {
        match self {
            Self::IsAlive => bb.check_is_alive(),
            Self::PlayerInSight => bb.check_player_in_sight(),
            Self::LowHealth => bb.check_low_health(),
            Self::PlayerInAttackRange => bb.check_player_in_attack_range(),
            Self::ArrivedAtPoint => bb.check_arrived_at_point(),
            Self::HealthDepleted => bb.check_health_depleted(),
            Self::Not(inner) => !inner.holds(bb),
            Self::All(conditions) => conditions.iter().all(|c| c.holds(bb)),
            Self::Any(conditions) => conditions.iter().any(|c| c.holds(bb)),
            Self::Custom(custom) => (custom.predicate)(bb),
        }
    }

    /// Negates this condition.
    #[must_use]
    pub fn negate(self) -> Self {
        Self::Not(Box::new(self))
    }
}

/// Terminal with a guard and enter/execute intents.
#[derive(Debug, Clone)]
pub struct ComplexAction<S, I> {
    state: S,
    fallback: S,
    guard: Option<Condition>,
    on_enter: Vec<I>,
    on_execute: Vec<I>,
}

impl<S, I> ComplexAction<S, I> {
    /// Creates a terminal yielding `state`, or `fallback` when its guard fails.
    pub fn new(state: S, fallback: S) -> Self {
        Self {
            state,
            fallback,
            guard: None,
            on_enter: Vec::new(),
            on_execute: Vec::new(),
        }
    }

    /// Sets the guard predicate.
    pub fn guarded_by(mut self, guard: Condition) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Adds an intent emitted first when the guard passes.
    pub fn on_enter(mut self, intent: I) -> Self {
        self.on_enter.push(intent);
        self
    }

    /// Adds an intent emitted after the enter intents.
    pub fn on_execute(mut self, intent: I) -> Self {
        self.on_execute.push(intent);
        self
    }
}

/// Node of a decision tree.
#[derive(Debug, Clone)]
pub enum DecisionNode<S, I> {
    /// Two-way branch
    Condition {
        /// Predicate deciding the branch
        condition: Condition,
        /// Intents emitted before branching, whichever branch is taken
        on_evaluate: Vec<I>,
        /// Taken when the predicate holds
        if_true: Box<DecisionNode<S, I>>,
        /// Taken otherwise
        if_false: Box<DecisionNode<S, I>>,
    },
    /// Terminal state with one-shot intents
    Action {
        /// Resulting state
        state: S,
        /// Intents emitted when reached
        on_execute: Vec<I>,
    },
    /// Guarded terminal
    ComplexAction(ComplexAction<S, I>),
}

impl<S, I> DecisionNode<S, I> {
    /// Creates a branch node.
    pub fn branch(condition: Condition, if_true: Self, if_false: Self) -> Self {
        Self::Condition {
            condition,
            on_evaluate: Vec::new(),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        }
    }

    /// Creates a terminal without intents.
    pub fn action(state: S) -> Self {
        Self::Action {
            state,
            on_execute: Vec::new(),
        }
    }

    /// Creates a terminal with intents.
    pub fn action_with(state: S, on_execute: Vec<I>) -> Self {
        Self::Action { state, on_execute }
    }

    /// Starts an incrementally built branch.
    pub fn when(label: impl Into<String>, condition: Condition) -> BranchBuilder<S, I> {
        BranchBuilder {
            label: label.into(),
            condition,
            on_evaluate: Vec::new(),
            if_true: None,
            if_false: None,
        }
    }

    /// Longest root-to-leaf path, counting nodes.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Condition {
                if_true, if_false, ..
            } => 1 + if_true.depth().max(if_false.depth()),
            Self::Action { .. } | Self::ComplexAction(_) => 1,
        }
    }
}

impl<S, I> From<ComplexAction<S, I>> for DecisionNode<S, I> {
    fn from(action: ComplexAction<S, I>) -> Self {
        Self::ComplexAction(action)
    }
}

/// Incremental branch construction with fail-fast validation.
#[derive(Debug)]
pub struct BranchBuilder<S, I> {
    label: String,
    condition: Condition,
    on_evaluate: Vec<I>,
    if_true: Option<DecisionNode<S, I>>,
    if_false: Option<DecisionNode<S, I>>,
}

impl<S, I> BranchBuilder<S, I> {
    /// Sets the branch taken when the condition holds.
    pub fn then(mut self, node: impl Into<DecisionNode<S, I>>) -> Self {
        self.if_true = Some(node.into());
        self
    }

    /// Sets the branch taken otherwise.
    pub fn otherwise(mut self, node: impl Into<DecisionNode<S, I>>) -> Self {
        self.if_false = Some(node.into());
        self
    }

    /// Adds an intent emitted on every pass through this branch.
    pub fn on_evaluate(mut self, intent: I) -> Self {
        self.on_evaluate.push(intent);
        self
    }

    /// Finishes the branch, failing if either child is missing.
    pub fn build(self) -> ConfigResult<DecisionNode<S, I>> {
        match (self.if_true, self.if_false) {
            (Some(if_true), Some(if_false)) => Ok(DecisionNode::Condition {
                condition: self.condition,
                on_evaluate: self.on_evaluate,
                if_true: Box::new(if_true),
                if_false: Box::new(if_false),
            }),
            _ => Err(ConfigError::MissingBranch { node: self.label }),
        }
    }
}

/// Outcome of one evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision<S, I> {
    /// Terminal state reached
    pub state: S,
    /// Intents collected along the walk, in order
    pub intents: Vec<I>,
}

/// Validated, immutable decision tree.
#[derive(Debug, Clone)]
pub struct DecisionTree<S, I> {
    root: DecisionNode<S, I>,
    depth: usize,
}

impl<S: Clone, I: Clone> DecisionTree<S, I> {
    /// Wraps a root node after checking the depth bound.
    pub fn new(root: DecisionNode<S, I>) -> ConfigResult<Self> {
        let depth = root.depth();
        if depth > MAX_TREE_DEPTH {
            return Err(ConfigError::TreeTooDeep {
                depth,
                max: MAX_TREE_DEPTH,
            });
        }
        Ok(Self { root, depth })
    }

    /// Root node.
    #[must_use]
    pub fn root(&self) -> &DecisionNode<S, I> {
        &self.root
    }

    /// Depth measured at construction.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Walks from the root to a terminal.
    #[must_use]
    pub fn execute(&self, bb: &Blackboard) -> Decision<S, I> {
        let mut intents = Vec::new();
        let mut node = &self.root;
        loop {
            match node {
                DecisionNode::Condition {
                    condition,
                    on_evaluate,
                    if_true,
                    if_false,
                } => {
                    intents.extend(on_evaluate.iter().cloned());
                    node = if condition.holds(bb) {
                        &**if_true
                    } else {
                        &**if_false
                    };
                },
                DecisionNode::Action { state, on_execute } => {
                    intents.extend(on_execute.iter().cloned());
                    return Decision {
                        state: state.clone(),
                        intents,
                    };
                },
                DecisionNode::ComplexAction(action) => {
                    if let Some(guard) = &action.guard {
                        if !guard.holds(bb) {
                            return Decision {
                                state: action.fallback.clone(),
                                intents,
                            };
                        }
                    }
                    intents.extend(action.on_enter.iter().cloned());
                    intents.extend(action.on_execute.iter().cloned());
                    return Decision {
                        state: action.state.clone(),
                        intents,
                    };
                },
            }
        }
    }

    /// Evaluates and discards intents.
    #[must_use]
    pub fn evaluate_state(&self, bb: &Blackboard) -> S {
        self.execute(bb).state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Mode {
        Rest,
        Run,
        Fallback,
    }

    fn chain(depth: usize) -> DecisionNode<Mode, u8> {
        let mut node = DecisionNode::action(Mode::Rest);
        for _ in 1..depth {
            node = DecisionNode::branch(Condition::IsAlive, node, DecisionNode::action(Mode::Run));
        }
        node
    }

    #[test]
    fn test_branch_intents_emitted_before_terminal() {
        let root = DecisionNode::when("sighted", Condition::PlayerInSight)
            .on_evaluate(1)
            .then(DecisionNode::action_with(Mode::Run, vec![2]))
            .otherwise(DecisionNode::action(Mode::Rest))
            .build()
            .expect("complete branch");
        let tree = DecisionTree::new(root).expect("valid tree");

        let mut bb = Blackboard::default();
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, Mode::Rest);
        assert_eq!(decision.intents, vec![1]);

        bb.is_player_in_sight = true;
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, Mode::Run);
        assert_eq!(decision.intents, vec![1, 2]);
    }

    #[test]
    fn test_missing_branch_fails_fast() {
        let result = DecisionNode::<Mode, u8>::when("sighted", Condition::PlayerInSight)
            .then(DecisionNode::action(Mode::Run))
            .build();
        assert_eq!(
            result.err(),
            Some(ConfigError::MissingBranch {
                node: "sighted".to_string()
            })
        );
    }

    #[test]
    fn test_guard_failure_skips_intents() {
        let action = ComplexAction::new(Mode::Run, Mode::Fallback)
            .guarded_by(Condition::PlayerInSight)
            .on_enter(7)
            .on_execute(8);
        let tree: DecisionTree<Mode, u8> = DecisionTree::new(action.into()).expect("valid tree");

        let mut bb = Blackboard::default();
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, Mode::Fallback);
        assert!(decision.intents.is_empty());

        bb.is_player_in_sight = true;
        let decision = tree.execute(&bb);
        assert_eq!(decision.state, Mode::Run);
        assert_eq!(decision.intents, vec![7, 8]);
    }

    #[test]
    fn test_depth_bound() {
        assert_eq!(chain(MAX_TREE_DEPTH).depth(), MAX_TREE_DEPTH);
        assert!(DecisionTree::new(chain(MAX_TREE_DEPTH)).is_ok());
        assert!(matches!(
            DecisionTree::new(chain(MAX_TREE_DEPTH + 1)),
            Err(ConfigError::TreeTooDeep { .. })
        ));
    }

    #[test]
    fn test_custom_and_composite_conditions() {
        let far = Condition::Custom(CustomCondition::new("far", |bb| bb.distance_to_player > 5.0));
        let both = Condition::All(vec![Condition::PlayerInSight, far.clone()]);
        let either = Condition::Any(vec![Condition::PlayerInSight, far.clone().negate()]);

        let mut bb = Blackboard::default();
        bb.is_player_in_sight = true;
        bb.distance_to_player = 2.0;
        assert!(!both.holds(&bb));
        assert!(either.holds(&bb));
        assert_eq!(format!("{far:?}"), "Custom(CustomCondition(\"far\"))");
    }
}
