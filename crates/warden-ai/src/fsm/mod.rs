//! Finite state machines.
//!
//! Two variants share the [`State`] and [`StateCondition`] contracts:
//! - [`StateMachine`]: built from [`StateData`] records (authored in code or
//!   loaded from a [`StateGraphAsset`]), validated once at construction.
//! - [`StateGraph`]: states keyed by value with explicit transitions.
//!
//! `M` is the model the states act on, usually the agent's own data.

pub mod asset;
pub mod condition;
pub mod graph;
pub mod machine;

pub use asset::*;
pub use condition::*;
pub use graph::*;
pub use machine::*;

/// Behavior attached to a state.
pub trait State<M> {
    /// Called when the state becomes active.
    fn enter(&mut self, _model: &mut M) {}
    /// Called on every tick the state stays active.
    fn execute(&mut self, model: &mut M);
    /// Called when the state is left.
    fn exit(&mut self, _model: &mut M) {}
}

/// Transition predicate over the model.
pub trait StateCondition<M> {
    /// Whether the transition should fire.
    fn check(&self, model: &M) -> bool;
}

impl<M, F> StateCondition<M> for F
where
    F: Fn(&M) -> bool,
{
    fn check(&self, model: &M) -> bool {
        self(model)
    }
}
