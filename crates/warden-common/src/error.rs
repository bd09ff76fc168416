//! Error types for Warden.
//!
//! Configuration mistakes are reported once, when a tree, wheel, or state
//! graph is built. Nothing in the per-tick path returns these errors.

use thiserror::Error;

/// Top-level error type for Warden operations.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Authoring/configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Schema version mismatch
    #[error("Schema version mismatch: expected {expected}, got {actual}")]
    VersionMismatch {
        /// Expected version
        expected: String,
        /// Actual version found
        actual: String,
    },
}

/// Errors raised while building decision trees, selectors, and state machines.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// State graph has no states
    #[error("State graph has no states assigned")]
    EmptyStateGraph,

    /// Two states share a name
    #[error("Duplicate state: {0}")]
    DuplicateState(String),

    /// Parallel condition/exit lists differ in length
    #[error("State {state} has {conditions} conditions but {exits} exit states")]
    TransitionCountMismatch {
        /// State name
        state: String,
        /// Number of exit conditions
        conditions: usize,
        /// Number of exit states
        exits: usize,
    },

    /// Exit refers to a state that is not part of the graph
    #[error("State {state} has an invalid exit state: {exit}")]
    UnknownExitState {
        /// State name
        state: String,
        /// Referenced exit
        exit: String,
    },

    /// Condition name is not registered
    #[error("State {state} has an invalid exit condition: {name}")]
    UnknownCondition {
        /// State name
        state: String,
        /// Condition name
        name: String,
    },

    /// State behavior name is not registered
    #[error("State {state} uses unknown behavior: {behavior}")]
    UnknownBehavior {
        /// State name
        state: String,
        /// Behavior name
        behavior: String,
    },

    /// State key is not registered
    #[error("State not found in state machine: {0}")]
    UnknownState(String),

    /// Decision node built without one of its branches
    #[error("Decision node {node} is missing a branch")]
    MissingBranch {
        /// Node description
        node: String,
    },

    /// Decision tree exceeds the evaluation depth bound
    #[error("Decision tree depth {depth} exceeds maximum {max}")]
    TreeTooDeep {
        /// Measured depth
        depth: usize,
        /// Allowed depth
        max: usize,
    },

    /// Weighted selector has nothing to draw from
    #[error("Weighted selector has no entries")]
    EmptyWeights,

    /// Weight is zero, negative, or not finite
    #[error("Invalid weight {weight} for {label}")]
    InvalidWeight {
        /// Label description
        label: String,
        /// Offending weight
        weight: f32,
    },

    /// Tunable parameter out of range
    #[error("Invalid parameter {name} = {value}")]
    InvalidParameter {
        /// Parameter name
        name: &'static str,
        /// Offending value
        value: f32,
    },
}

impl ConfigError {
    /// Fails with [`ConfigError::InvalidParameter`] unless `value` is finite and non-negative.
    pub fn check_non_negative(name: &'static str, value: f32) -> ConfigResult<()> {
        if value.is_finite() && value >= 0.0 {
            Ok(())
        } else {
            Err(Self::InvalidParameter { name, value })
        }
    }

    /// Fails with [`ConfigError::InvalidParameter`] unless `value` is finite and positive.
    pub fn check_positive(name: &'static str, value: f32) -> ConfigResult<()> {
        if value.is_finite() && value > 0.0 {
            Ok(())
        } else {
            Err(Self::InvalidParameter { name, value })
        }
    }
}

/// Result type alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Result type alias for Warden operations.
pub type WardenResult<T> = Result<T, WardenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_checks() {
        assert!(ConfigError::check_non_negative("speed", 0.0).is_ok());
        assert!(ConfigError::check_positive("speed", 0.0).is_err());
        assert!(ConfigError::check_non_negative("speed", f32::NAN).is_err());
        assert!(matches!(
            ConfigError::check_positive("speed", -1.0),
            Err(ConfigError::InvalidParameter { name: "speed", .. })
        ));
    }

    #[test]
    fn test_config_error_converts_to_warden_error() {
        let err: WardenError = ConfigError::EmptyStateGraph.into();
        assert!(matches!(err, WardenError::Config(ConfigError::EmptyStateGraph)));
        assert_eq!(
            err.to_string(),
            "Configuration error: State graph has no states assigned"
        );
    }
}
