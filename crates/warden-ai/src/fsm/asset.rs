//! Authored state graph documents and the registry that instantiates them.

use super::condition::{And, BoxedCondition, Not, Or};
use super::machine::{StateData, StateMachine};
use super::State;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use tracing::info;
use warden_common::{ConfigError, ConfigResult, SchemaVersion, WardenError, WardenResult};

/// Condition expression in an authored graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionAsset {
    /// Registered condition by name
    Named(String),
    /// Negation
    Not(Box<ConditionAsset>),
    /// Both hold
    And(Box<ConditionAsset>, Box<ConditionAsset>),
    /// Either holds
    Or(Box<ConditionAsset>, Box<ConditionAsset>),
}

impl ConditionAsset {
    /// Registered condition by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

/// One authored state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateAsset {
    /// Unique state name
    pub name: String,
    /// Registered behavior
    pub behavior: String,
    /// Exit conditions, parallel to `exits`
    #[serde(default)]
    pub conditions: Vec<ConditionAsset>,
    /// Exit state names
    #[serde(default)]
    pub exits: Vec<String>,
}

/// Authored state graph. The first state is the start state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateGraphAsset {
    /// Document schema version
    #[serde(default)]
    pub version: SchemaVersion,
    /// Graph name
    pub name: String,
    /// States in authored order
    pub states: Vec<StateAsset>,
}

impl StateGraphAsset {
    /// Parses a RON document and checks its schema version.
    pub fn from_ron(text: &str) -> WardenResult<Self> {
        let asset: Self =
            ron::from_str(text).map_err(|e| WardenError::Serialization(e.to_string()))?;
        if !SchemaVersion::STATE_GRAPH.can_read(&asset.version) {
            return Err(WardenError::VersionMismatch {
                expected: SchemaVersion::STATE_GRAPH.to_string(),
                actual: asset.version.to_string(),
            });
        }
        Ok(asset)
    }

    /// Reads and parses a RON document from disk.
    pub fn load(path: &Path) -> WardenResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let asset = Self::from_ron(&text)?;
        info!(
            path = %path.display(),
            graph = %asset.name,
            states = asset.states.len(),
            "Loaded state graph"
        );
        Ok(asset)
    }

    /// Serializes to pretty RON.
    pub fn to_ron(&self) -> WardenResult<String> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
            .map_err(|e| WardenError::Serialization(e.to_string()))
    }
}

type StateFactory<M> = Box<dyn Fn() -> Box<dyn State<M>>>;
type ConditionFactory<M> = Box<dyn Fn() -> BoxedCondition<M>>;

/// Named factories for the behaviors and conditions an asset may reference.
pub struct BehaviorRegistry<M> {
    states: AHashMap<String, StateFactory<M>>,
    conditions: AHashMap<String, ConditionFactory<M>>,
}

impl<M: 'static> BehaviorRegistry<M> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            states: AHashMap::new(),
            conditions: AHashMap::new(),
        }
    }

    /// Registers a behavior factory.
    pub fn register_state<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn State<M>> + 'static,
    {
        self.states.insert(name.into(), Box::new(factory));
    }

    /// Registers a condition factory.
    pub fn register_condition<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> BoxedCondition<M> + 'static,
    {
        self.conditions.insert(name.into(), Box::new(factory));
    }

    /// Whether a behavior name is registered.
    #[must_use]
    pub fn has_state(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    /// Whether a condition name is registered.
    #[must_use]
    pub fn has_condition(&self, name: &str) -> bool {
        self.conditions.contains_key(name)
    }

    /// Resolves every behavior and condition of the asset.
    pub fn instantiate(&self, asset: &StateGraphAsset) -> ConfigResult<Vec<StateData<M>>> {
        asset
            .states
            .iter()
            .map(|state| -> ConfigResult<StateData<M>> {
                let factory =
                    self.states
                        .get(&state.behavior)
                        .ok_or_else(|| ConfigError::UnknownBehavior {
                            state: state.name.clone(),
                            behavior: state.behavior.clone(),
                        })?;
                let conditions = state
                    .conditions
                    .iter()
                    .map(|expr| self.build_condition(&state.name, expr))
                    .collect::<ConfigResult<Vec<_>>>()?;
                Ok(StateData::from_parts(
                    state.name.clone(),
                    factory(),
                    conditions,
                    state.exits.clone(),
                ))
            })
            .collect()
    }

    /// Instantiates the asset and builds a validated machine.
    pub fn build_machine(
        &self,
        asset: &StateGraphAsset,
        model: &mut M,
    ) -> ConfigResult<StateMachine<M>> {
        StateMachine::new(self.instantiate(asset)?, model)
    }

    fn build_condition(&self, state: &str, expr: &ConditionAsset) -> ConfigResult<BoxedCondition<M>> {
        let condition: BoxedCondition<M> = match expr {
            ConditionAsset::Named(name) => {
                let factory =
                    self.conditions
                        .get(name)
                        .ok_or_else(|| ConfigError::UnknownCondition {
                            state: state.to_string(),
                            name: name.clone(),
                        })?;
                factory()
            }
            ConditionAsset::Not(inner) => Box::new(Not(self.build_condition(state, inner)?)),
            ConditionAsset::And(a, b) => Box::new(And(
                self.build_condition(state, a)?,
                self.build_condition(state, b)?,
            )),
            ConditionAsset::Or(a, b) => Box::new(Or(
                self.build_condition(state, a)?,
                self.build_condition(state, b)?,
            )),
        };
        Ok(condition)
    }
}

impl<M: 'static> Default for BehaviorRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for BehaviorRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Counter {
        value: i32,
    }

    struct Increment;

    impl State<Counter> for Increment {
        fn execute(&mut self, model: &mut Counter) {
            model.value += 1;
        }
    }

    struct Decrement;

    impl State<Counter> for Decrement {
        fn execute(&mut self, model: &mut Counter) {
            model.value -= 1;
        }
    }

    const DOCUMENT: &str = r#"(
        version: (major: 1, minor: 0, patch: 0),
        name: "counter",
        states: [
            (
                name: "up",
                behavior: "increment",
                conditions: [And(Named("high"), Not(Named("negative")))],
                exits: ["down"],
            ),
            (
                name: "down",
                behavior: "decrement",
                conditions: [Or(Named("negative"), Named("zero"))],
                exits: ["up"],
            ),
        ],
    )"#;

    fn registry() -> BehaviorRegistry<Counter> {
        let mut registry = BehaviorRegistry::new();
        registry.register_state("increment", || Box::new(Increment) as Box<dyn State<Counter>>);
        registry.register_state("decrement", || Box::new(Decrement) as Box<dyn State<Counter>>);
        registry.register_condition("high", || {
            Box::new(|c: &Counter| c.value >= 3) as BoxedCondition<Counter>
        });
        registry.register_condition("negative", || {
            Box::new(|c: &Counter| c.value < 0) as BoxedCondition<Counter>
        });
        registry.register_condition("zero", || {
            Box::new(|c: &Counter| c.value == 0) as BoxedCondition<Counter>
        });
        registry
    }

    #[test]
    fn test_document_builds_running_machine() {
        let asset = StateGraphAsset::from_ron(DOCUMENT).expect("valid document");
        assert_eq!(asset.states.len(), 2);

        let mut counter = Counter::default();
        let mut machine = registry()
            .build_machine(&asset, &mut counter)
            .expect("registered names");
        for _ in 0..3 {
            machine.run(&mut counter);
        }
        assert_eq!(counter.value, 3);
        machine.run(&mut counter);
        assert_eq!(machine.current_state_name(), "down");
        for _ in 0..3 {
            machine.run(&mut counter);
        }
        assert_eq!(counter.value, 0);
        machine.run(&mut counter);
        assert_eq!(machine.current_state_name(), "up");
    }

    #[test]
    fn test_unknown_names_rejected() {
        let mut asset = StateGraphAsset::from_ron(DOCUMENT).expect("valid document");
        asset.states[1].conditions = vec![ConditionAsset::named("missing")];
        assert_eq!(
            registry().instantiate(&asset).err(),
            Some(ConfigError::UnknownCondition {
                state: "down".into(),
                name: "missing".into(),
            })
        );

        asset.states[0].behavior = "teleport".into();
        assert!(matches!(
            registry().instantiate(&asset),
            Err(ConfigError::UnknownBehavior { .. })
        ));
    }

    #[test]
    fn test_version_mismatch_rejected() {
        let document = DOCUMENT.replace("major: 1", "major: 2");
        assert!(matches!(
            StateGraphAsset::from_ron(&document),
            Err(WardenError::VersionMismatch { .. })
        ));
        assert!(matches!(
            StateGraphAsset::from_ron("(name: "),
            Err(WardenError::Serialization(_))
        ));
    }

    #[test]
    fn test_pretty_output_parses_back() {
        let asset = StateGraphAsset::from_ron(DOCUMENT).expect("valid document");
        let text = asset.to_ron().expect("serializable");
        assert_eq!(StateGraphAsset::from_ron(&text).expect("valid document"), asset);
    }
}
