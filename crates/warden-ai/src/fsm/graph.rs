//! State machine with states keyed by value and explicit transitions.

use super::condition::BoxedCondition;
use super::{State, StateCondition};
use ahash::AHashMap;
use std::fmt::{self, Debug};
use std::hash::Hash;
use tracing::debug;
use warden_common::{ConfigError, ConfigResult};

struct Transition<K, M> {
    from: K,
    to: K,
    condition: BoxedCondition<M>,
}

/// State graph wired in code.
///
/// Each tick executes the current state, then takes the first transition
/// leaving it whose condition holds. Unknown keys are rejected when wired.
pub struct StateGraph<K, M> {
    states: AHashMap<K, Box<dyn State<M>>>,
    transitions: Vec<Transition<K, M>>,
    current: Option<K>,
}

impl<K, M> StateGraph<K, M>
where
    K: Copy + Eq + Hash + Debug,
{
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: AHashMap::new(),
            transitions: Vec::new(),
            current: None,
        }
    }

    /// Registers a state, replacing any previous state under the same key.
    pub fn add_state(&mut self, key: K, state: impl State<M> + 'static) {
        self.states.insert(key, Box::new(state));
    }

    /// Adds a transition. Both endpoints must already be registered.
    pub fn add_transition(
        &mut self,
        from: K,
        to: K,
        condition: impl StateCondition<M> + 'static,
    ) -> ConfigResult<()> {
        self.require(from)?;
        self.require(to)?;
        self.transitions.push(Transition {
            from,
            to,
            condition: Box::new(condition),
        });
        Ok(())
    }

    /// Enters the initial state.
    pub fn start(&mut self, key: K, model: &mut M) -> ConfigResult<()> {
        self.change_state(key, model)
    }

    /// Executes the current state, then checks its transitions in order.
    pub fn update(&mut self, model: &mut M) {
        let Some(current) = self.current else {
            return;
        };
        if let Some(state) = self.states.get_mut(&current) {
            state.execute(model);
        }

        let next = self
            .transitions
            .iter()
            .find(|t| t.from == current && t.condition.check(model))
            .map(|t| t.to);
        if let Some(next) = next {
            self.enter(next, model);
        }
    }

    /// Switches to `key` immediately, bypassing conditions.
    pub fn force_transition(&mut self, key: K, model: &mut M) -> ConfigResult<()> {
        self.change_state(key, model)
    }

    /// Key of the active state.
    #[must_use]
    pub fn current(&self) -> Option<K> {
        self.current
    }

    /// Number of registered states.
    #[must_use]
    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    fn require(&self, key: K) -> ConfigResult<()> {
        if self.states.contains_key(&key) {
            Ok(())
        } else {
            Err(ConfigError::UnknownState(format!("{key:?}")))
        }
    }

    fn change_state(&mut self, key: K, model: &mut M) -> ConfigResult<()> {
        self.require(key)?;
        self.enter(key, model);
        Ok(())
    }

    fn enter(&mut self, key: K, model: &mut M) {
        if let Some(previous) = self.current {
            if let Some(state) = self.states.get_mut(&previous) {
                state.exit(model);
            }
        }
        self.current = Some(key);
        if let Some(state) = self.states.get_mut(&key) {
            state.enter(model);
        }
        debug!(state = ?key, "State changed");
    }
}

impl<K, M> Default for StateGraph<K, M>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Debug, M> fmt::Debug for StateGraph<K, M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateGraph")
            .field("current", &self.current)
            .field("states", &self.states.len())
            .field("transitions", &self.transitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    enum Light {
        Red,
        Green,
        Broken,
    }

    #[derive(Default)]
    struct Model {
        ticks: u32,
        log: Vec<&'static str>,
    }

    struct Lamp(&'static str);

    impl State<Model> for Lamp {
        fn enter(&mut self, model: &mut Model) {
            model.log.push(self.0);
        }

        fn execute(&mut self, model: &mut Model) {
            model.ticks += 1;
        }
    }

    fn graph() -> StateGraph<Light, Model> {
        let mut graph = StateGraph::new();
        graph.add_state(Light::Red, Lamp("red"));
        graph.add_state(Light::Green, Lamp("green"));
        graph
            .add_transition(Light::Red, Light::Green, |m: &Model| m.ticks >= 2)
            .expect("known states");
        graph
            .add_transition(Light::Green, Light::Red, |m: &Model| m.ticks >= 3)
            .expect("known states");
        graph
    }

    #[test]
    fn test_update_executes_then_transitions() {
        let mut model = Model::default();
        let mut graph = graph();
        assert_eq!(graph.current(), None);
        graph.update(&mut model);
        assert_eq!(model.ticks, 0);

        graph.start(Light::Red, &mut model).expect("known state");
        graph.update(&mut model);
        assert_eq!(graph.current(), Some(Light::Red));
        graph.update(&mut model);
        assert_eq!(graph.current(), Some(Light::Green));
        assert_eq!(model.ticks, 2);

        graph.update(&mut model);
        assert_eq!(graph.current(), Some(Light::Red));
        assert_eq!(model.log, vec!["red", "green", "red"]);
    }

    #[test]
    fn test_unknown_keys_fail_fast() {
        let mut model = Model::default();
        let mut graph = graph();
        assert!(matches!(
            graph.add_transition(Light::Red, Light::Broken, |_: &Model| true),
            Err(ConfigError::UnknownState(_))
        ));
        assert!(graph.start(Light::Broken, &mut model).is_err());

        graph.start(Light::Green, &mut model).expect("known state");
        assert_eq!(
            graph.force_transition(Light::Broken, &mut model),
            Err(ConfigError::UnknownState("Broken".into()))
        );
        assert_eq!(graph.current(), Some(Light::Green));
    }

    #[test]
    fn test_force_transition() {
        let mut model = Model::default();
        let mut graph = graph();
        graph.start(Light::Red, &mut model).expect("known state");
        graph.force_transition(Light::Green, &mut model).expect("known state");
        assert_eq!(graph.current(), Some(Light::Green));
        assert_eq!(graph.state_count(), 2);
    }
}
