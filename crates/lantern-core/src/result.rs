//! Consolidated outcome of one test run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use lantern_model::check_utility::EffectReport;

/// Edges taken in one run by one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageSummary {
    pub covered: usize,
    pub total: usize,
}

/// Edges taken by one model across all runs since the last reset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TotalCoverage {
    pub covered: Vec<String>,
    pub total: usize,
    pub missed: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelResult {
    /// Binding and evaluation errors.
    pub errors: Vec<String>,
    /// Failed effects and expired force thresholds.
    pub failures: Vec<String>,
    /// Effects excluded from judgment because they contradict each other.
    pub contradictions: Vec<String>,
    pub log: Vec<String>,
    pub edge_trace: Vec<String>,
    pub coverage: BTreeMap<String, CoverageSummary>,
    /// `Sprite.variable = value`, one line per variable.
    pub final_state: Vec<String>,
    /// How often each error, failure or contradiction was raised.
    pub occurrences: BTreeMap<String, u32>,
    #[serde(skip)]
    max_repeated_outputs: u32,
}

fn ordinal(n: u32) -> String {
    let suffix = match (n % 10, n % 100) {
        (_, 11..=13) => "th",
        (1, _) => "st",
        (2, _) => "nd",
        (3, _) => "rd",
        _ => "th",
    };
    format!("{n}{suffix}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Error,
    Failure,
    Contradiction,
}

impl ModelResult {
    pub fn new(max_repeated_outputs: u32) -> Self {
        Self {
            max_repeated_outputs,
            ..Default::default()
        }
    }

    /// No errors and no failures.
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.failures.is_empty()
    }

    pub fn add_error(&mut self, message: impl Into<String>) {
        self.add(Kind::Error, message.into());
    }

    pub fn add_failure(&mut self, message: impl Into<String>) {
        self.add(Kind::Failure, message.into());
    }

    pub fn add_contradiction(&mut self, message: impl Into<String>) {
        self.add(Kind::Contradiction, message.into());
    }

    pub fn add_log(&mut self, message: impl Into<String>) {
        let message = message.into();
        tracing::info!(%message, "model log");
        self.log.push(message);
    }

    pub fn add_trace(&mut self, entry: impl Into<String>) {
        self.edge_trace.push(entry.into());
    }

    pub fn absorb(&mut self, report: EffectReport) {
        for message in report.contradictions {
            self.add_contradiction(message);
        }
        for message in report.failures {
            self.add_failure(message);
        }
        for message in report.errors {
            self.add_error(message);
        }
    }

    fn add(&mut self, kind: Kind, message: String) {
        let count = self.occurrences.entry(message.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        if count == 1 {
            match kind {
                Kind::Error => self.errors.push(message.clone()),
                Kind::Failure => self.failures.push(message.clone()),
                Kind::Contradiction => self.contradictions.push(message.clone()),
            }
        }
        if let Some(line) = self.rate_limited(&message, count) {
            match kind {
                Kind::Contradiction => tracing::warn!(message = %line, "contradicting effects"),
                Kind::Error | Kind::Failure => tracing::error!(message = %line, ?kind, "model check"),
            }
        }
    }

    /// The log line for the `count`-th occurrence of `message`, if any.
    fn rate_limited(&self, message: &str, count: u32) -> Option<String> {
        let max = self.max_repeated_outputs;
        if count < max {
            Some(message.to_string())
        } else if count == max {
            Some(format!("{message} ({} time, no more outputs for this)", ordinal(max)))
        } else {
            None
        }
    }
}
