//! # Warden AI
//!
//! Decision making and locomotion for non-player characters.
//!
//! This crate provides:
//! - Blackboard facts and binary decision trees with preset personalities
//! - Weighted random selection (roulette wheel)
//! - Weighted steering behaviors and a kinematic steering agent
//! - Finite state machines (authored data-driven graphs and keyed graphs)
//! - Orchestrators for patrolling NPCs, civilians and guards
//! - A tick dispatcher with deferred registration and removal
//!
//! Everything is single-threaded and driven by explicit `update(dt)` calls.
//! Randomised code takes a caller-supplied [`fastrand::Rng`].

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod agent;
pub mod blackboard;
pub mod civilian;
pub mod config;
pub mod decision;
pub mod dispatcher;
pub mod fsm;
pub mod guard;
pub mod patrol;
pub mod presets;
pub mod roulette;
pub mod sensing;
pub mod steering;
pub mod throttle;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::agent::*;
    pub use crate::blackboard::*;
    pub use crate::civilian::*;
    pub use crate::config::*;
    pub use crate::decision::*;
    pub use crate::dispatcher::*;
    pub use crate::fsm::*;
    pub use crate::guard::*;
    pub use crate::patrol::*;
    pub use crate::presets::*;
    pub use crate::roulette::*;
    pub use crate::sensing::*;
    pub use crate::steering::*;
    pub use crate::throttle::*;
}

pub use prelude::*;
