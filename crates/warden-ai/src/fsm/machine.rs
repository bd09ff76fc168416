//! Data-driven state machine.

use super::condition::BoxedCondition;
use super::{State, StateCondition};
use ahash::AHashMap;
use std::fmt;
use tracing::{debug, info};
use warden_common::{ConfigError, ConfigResult};

/// Authored record for one state: its behavior and its outgoing transitions.
///
/// `conditions[i]` leads to the state named `exits[i]`. Earlier entries win.
pub struct StateData<M> {
    name: String,
    state: Box<dyn State<M>>,
    conditions: Vec<BoxedCondition<M>>,
    exits: Vec<String>,
}

impl<M> StateData<M> {
    /// Record with no transitions.
    pub fn new(name: impl Into<String>, state: impl State<M> + 'static) -> Self {
        Self::from_boxed(name, Box::new(state))
    }

    /// Record around an already boxed state.
    pub fn from_boxed(name: impl Into<String>, state: Box<dyn State<M>>) -> Self {
        Self {
            name: name.into(),
            state,
            conditions: Vec::new(),
            exits: Vec::new(),
        }
    }

    /// Record from parallel condition and exit lists, unchecked until the
    /// machine is built.
    pub fn from_parts(
        name: impl Into<String>,
        state: Box<dyn State<M>>,
        conditions: Vec<BoxedCondition<M>>,
        exits: Vec<String>,
    ) -> Self {
        Self {
            name: name.into(),
            state,
            conditions,
            exits,
        }
    }

    /// Appends a transition.
    #[must_use]
    pub fn transition(
        mut self,
        condition: impl StateCondition<M> + 'static,
        exit: impl Into<String>,
    ) -> Self {
        self.conditions.push(Box::new(condition));
        self.exits.push(exit.into());
        self
    }

    /// Appends a transition with a boxed condition.
    #[must_use]
    pub fn transition_boxed(mut self, condition: BoxedCondition<M>, exit: impl Into<String>) -> Self {
        self.conditions.push(condition);
        self.exits.push(exit.into());
        self
    }

    /// State name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Exit names in declaration order.
    #[must_use]
    pub fn exits(&self) -> &[String] {
        &self.exits
    }
}

impl<M> fmt::Debug for StateData<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateData")
            .field("name", &self.name)
            .field("conditions", &self.conditions.len())
            .field("exits", &self.exits)
            .finish_non_exhaustive()
    }
}

struct Node<M> {
    name: String,
    state: Box<dyn State<M>>,
    transitions: Vec<(BoxedCondition<M>, usize)>,
}

/// State machine over authored [`StateData`] records.
///
/// The first record is the start state. Every exit resolves to a record index
/// at construction, so an unknown destination cannot be reached at runtime.
pub struct StateMachine<M> {
    nodes: Vec<Node<M>>,
    current: usize,
}

impl<M> StateMachine<M> {
    /// Validates the records and enters the first state.
    pub fn new(records: Vec<StateData<M>>, model: &mut M) -> ConfigResult<Self> {
        if records.is_empty() {
            return Err(ConfigError::EmptyStateGraph);
        }

        let mut index = AHashMap::with_capacity(records.len());
        for (i, record) in records.iter().enumerate() {
            if index.insert(record.name.clone(), i).is_some() {
                return Err(ConfigError::DuplicateState(record.name.clone()));
            }
        }

        for record in &records {
            if record.conditions.len() != record.exits.len() {
                return Err(ConfigError::TransitionCountMismatch {
                    state: record.name.clone(),
                    conditions: record.conditions.len(),
                    exits: record.exits.len(),
                });
            }
            if let Some(exit) = record.exits.iter().find(|e| !index.contains_key(*e)) {
                return Err(ConfigError::UnknownExitState {
                    state: record.name.clone(),
                    exit: exit.clone(),
                });
            }
        }

        let nodes: Vec<Node<M>> = records
            .into_iter()
            .map(|record| {
                let targets = record.exits.iter().map(|exit| index[exit]);
                Node {
                    transitions: record.conditions.into_iter().zip(targets).collect(),
                    name: record.name,
                    state: record.state,
                }
            })
            .collect();

        let mut machine = Self { nodes, current: 0 };
        machine.nodes[0].state.enter(model);
        info!(
            start = %machine.current_state_name(),
            states = machine.nodes.len(),
            "State machine started"
        );
        Ok(machine)
    }

    /// Advances one tick.
    ///
    /// If a transition of the current state fires, the current state exits and
    /// the destination enters; nothing executes on that tick. Otherwise the
    /// current state executes. Returns whether a transition happened.
    pub fn run(&mut self, model: &mut M) -> bool {
        let next = self.nodes[self.current]
            .transitions
            .iter()
            .find(|(condition, _)| condition.check(model))
            .map(|&(_, target)| target);

        match next {
            Some(target) => {
                let from = self.current;
                self.nodes[from].state.exit(model);
                self.current = target;
                self.nodes[target].state.enter(model);
                debug!(
                    from = %self.nodes[from].name,
                    to = %self.nodes[target].name,
                    "State transition"
                );
                true
            }
            None => {
                self.nodes[self.current].state.execute(model);
                false
            }
        }
    }

    /// Name of the active state.
    #[must_use]
    pub fn current_state_name(&self) -> &str {
        &self.nodes[self.current].name
    }

    /// Authored state names in order.
    pub fn state_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Number of states.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false for a constructed machine.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

impl<M> fmt::Debug for StateMachine<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateMachine")
            .field("current", &self.current_state_name())
            .field("states", &self.state_names().collect::<Vec<_>>())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[derive(Debug, Default)]
    struct Model {
        flag_a: bool,
        flag_b: bool,
        log: Vec<String>,
    }

    struct Recorder(&'static str);

    impl State<Model> for Recorder {
        fn enter(&mut self, model: &mut Model) {
            model.log.push(format!("enter {}", self.0));
        }

        fn execute(&mut self, model: &mut Model) {
            model.log.push(format!("execute {}", self.0));
        }

        fn exit(&mut self, model: &mut Model) {
            model.log.push(format!("exit {}", self.0));
        }
    }

    fn flag_a(m: &Model) -> bool {
        m.flag_a
    }

    fn flag_b(m: &Model) -> bool {
        m.flag_b
    }

    fn three_states() -> Vec<StateData<Model>> {
        vec![
            StateData::new("start", Recorder("start"))
                .transition(flag_a, "first")
                .transition(flag_b, "second"),
            StateData::new("first", Recorder("first")),
            StateData::new("second", Recorder("second")),
        ]
    }

    #[test]
    fn test_first_record_is_entered() {
        let mut model = Model::default();
        let machine = StateMachine::new(three_states(), &mut model).expect("valid graph");
        assert_eq!(machine.current_state_name(), "start");
        assert_eq!(model.log, vec!["enter start"]);
        assert_eq!(
            machine.state_names().collect::<Vec<_>>(),
            vec!["start", "first", "second"]
        );
    }

    #[test]
    fn test_executes_when_no_condition_fires() {
        let mut model = Model::default();
        let mut machine = StateMachine::new(three_states(), &mut model).expect("valid graph");
        assert!(!machine.run(&mut model));
        assert!(!machine.run(&mut model));
        assert_eq!(model.log, vec!["enter start", "execute start", "execute start"]);
    }

    #[test]
    fn test_transition_skips_execute() {
        let mut model = Model::default();
        let mut machine = StateMachine::new(three_states(), &mut model).expect("valid graph");
        model.flag_b = true;
        assert!(machine.run(&mut model));
        assert_eq!(machine.current_state_name(), "second");
        assert_eq!(model.log, vec!["enter start", "exit start", "enter second"]);

        machine.run(&mut model);
        assert_eq!(model.log.last().map(String::as_str), Some("execute second"));
    }

    #[test]
    fn test_declaration_order_wins() {
        for _ in 0..10 {
            let mut model = Model::default();
            let mut machine = StateMachine::new(three_states(), &mut model).expect("valid graph");
            model.flag_a = true;
            model.flag_b = true;
            machine.run(&mut model);
            assert_eq!(machine.current_state_name(), "first");
        }
    }

    #[test]
    fn test_empty_graph_rejected() {
        let mut model = Model::default();
        assert_eq!(
            StateMachine::<Model>::new(Vec::new(), &mut model).err(),
            Some(ConfigError::EmptyStateGraph)
        );
    }

    #[test]
    fn test_duplicate_and_unknown_states_rejected() {
        let mut model = Model::default();
        let duplicate = vec![
            StateData::new("a", Recorder("a")),
            StateData::new("a", Recorder("a")),
        ];
        assert_eq!(
            StateMachine::new(duplicate, &mut model).err(),
            Some(ConfigError::DuplicateState("a".into()))
        );

        let dangling = vec![StateData::new("a", Recorder("a")).transition(flag_a, "missing")];
        assert_eq!(
            StateMachine::new(dangling, &mut model).err(),
            Some(ConfigError::UnknownExitState {
                state: "a".into(),
                exit: "missing".into()
            })
        );
        assert!(model.log.is_empty());
    }

    proptest! {
        #[test]
        fn test_length_mismatch_always_rejected(conditions in 0usize..6, exits in 0usize..6) {
            prop_assume!(conditions != exits);
            let mut model = Model::default();
            let boxed: Vec<BoxedCondition<Model>> = (0..conditions)
                .map(|_| Box::new(flag_a) as BoxedCondition<Model>)
                .collect();
            let records = vec![StateData::from_parts(
                "only",
                Box::new(Recorder("only")),
                boxed,
                vec!["only".to_string(); exits],
            )];
            prop_assert_eq!(
                StateMachine::new(records, &mut model).err(),
                Some(ConfigError::TransitionCountMismatch {
                    state: "only".into(),
                    conditions,
                    exits,
                })
            );
        }
    }
}
