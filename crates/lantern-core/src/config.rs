//! Tester configuration.
//!
//! Every field has a default, so a partial JSON object is a valid
//! configuration.

use serde::{Deserialize, Serialize};

/// Settings for a [`crate::tester::ModelTester`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TesterConfig {
    /// Abandon a run when any check fails to bind. Otherwise the
    /// offending checks never hold and the run goes on.
    pub halt_on_binding_error: bool,
    /// Steps a failing effect gets to come true before it is reported.
    pub effect_recheck_steps: u32,
    /// Log lines emitted for one identical message.
    pub max_repeated_outputs: u32,
    /// Seed for probabilistic checks; run `n` uses `random_seed + n`.
    pub random_seed: u64,
}

impl Default for TesterConfig {
    fn default() -> Self {
        Self {
            halt_on_binding_error: true,
            effect_recheck_steps: 1,
            max_repeated_outputs: 10,
            random_seed: 0,
        }
    }
}

impl TesterConfig {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TesterConfig::default();
        assert!(config.halt_on_binding_error);
        assert_eq!(config.effect_recheck_steps, 1);
        assert_eq!(config.max_repeated_outputs, 10);
        assert_eq!(config.random_seed, 0);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = TesterConfig::from_json(r#"{"random_seed": 42, "halt_on_binding_error": false}"#).unwrap();
        assert_eq!(
            config,
            TesterConfig {
                halt_on_binding_error: false,
                random_seed: 42,
                ..Default::default()
            }
        );
    }

    #[test]
    fn test_unknown_field_type_is_rejected() {
        assert!(TesterConfig::from_json(r#"{"effect_recheck_steps": "two"}"#).is_err());
    }
}
