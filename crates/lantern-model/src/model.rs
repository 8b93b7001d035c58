//! Runtime state of one model graph.
//!
//! A model sits on exactly one node. Each step it scans the outgoing edges
//! of that node in declaration order and takes the first whose conditions
//! all hold. Program models then have their effects checked; user models
//! inject their input effects into the program.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use lantern_compiler::graph::{ModelEdge, ModelGraph, ModelNode, FORCE_DISABLED};

use crate::bind::{BoundCheck, EvalContext, Timing};
use crate::check_utility::{opposite_arrow, CheckUtility, EventFlags};
use crate::driver::{InputEvent, RuntimeDriver};
use crate::error::BindError;

/// A transition taken during one step.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub edge_id: String,
    pub from: String,
    pub to: String,
    /// Human readable edge summary for the trace.
    pub trace: String,
    /// Timing seen by the effects of the edge.
    pub timing: Timing,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub taken: Option<Transition>,
    /// Conditions that could not be evaluated.
    pub errors: Vec<String>,
    /// Forced edges whose conditions did not hold.
    pub failures: Vec<String>,
}

fn force_due(edge: &ModelEdge, run_step: u64, since_transition: u64) -> bool {
    let at = edge.force_test_at;
    let after = edge.force_test_after;
    (at > FORCE_DISABLED && run_step >= at as u64) || (after > FORCE_DISABLED && since_transition > after as u64)
}

pub struct ModelState {
    graph: Rc<ModelGraph>,
    current: String,
    coverage_run: BTreeSet<String>,
    coverage_total: BTreeSet<String>,
    run_start_step: u64,
    last_transition_step: u64,
    second_last_transition_step: u64,
    program_end_step: Option<u64>,
    disabled: HashSet<String>,
    conditions: HashMap<String, Vec<BoundCheck>>,
    halted: bool,
}

impl ModelState {
    pub fn new(graph: Rc<ModelGraph>) -> Self {
        let current = graph.start_node().id.clone();
        Self {
            graph,
            current,
            coverage_run: BTreeSet::new(),
            coverage_total: BTreeSet::new(),
            run_start_step: 0,
            last_transition_step: 0,
            second_last_transition_step: 0,
            program_end_step: None,
            disabled: HashSet::new(),
            conditions: HashMap::new(),
            halted: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.graph.id
    }

    pub fn graph(&self) -> &ModelGraph {
        &self.graph
    }

    pub fn current_node(&self) -> &ModelNode {
        self.graph
            .node(&self.current)
            .unwrap_or_else(|| self.graph.start_node())
    }

    pub fn current_node_id(&self) -> &str {
        &self.current
    }

    /// On a stop node, or halted from outside.
    pub fn stopped(&self) -> bool {
        self.halted || self.current_node().is_stop
    }

    pub fn stopped_all(&self) -> bool {
        self.current_node().is_stop_all
    }

    pub fn halt(&mut self) {
        self.halted = true;
    }

    /// Edges taken in the current run.
    pub fn coverage(&self) -> &BTreeSet<String> {
        &self.coverage_run
    }

    /// Edges taken in any run since the last coverage reset.
    pub fn total_coverage(&self) -> &BTreeSet<String> {
        &self.coverage_total
    }

    pub fn reset_total_coverage(&mut self) {
        self.coverage_total.clear();
    }

    pub fn set_program_end(&mut self, step: u64) {
        self.program_end_step.get_or_insert(step);
    }

    /// Back to the start node for a new run. Total coverage is kept.
    pub fn reset(&mut self) {
        self.current = self.graph.start_node().id.clone();
        self.coverage_run.clear();
        self.run_start_step = 0;
        self.last_transition_step = 0;
        self.second_last_transition_step = 0;
        self.program_end_step = None;
        self.disabled.clear();
        self.conditions.clear();
        self.halted = false;
    }

    /// Bind every edge condition. Unbindable conditions become checks
    /// that never hold; their errors are returned.
    pub fn bind_conditions(
        &mut self,
        utility: &mut CheckUtility,
        driver: &mut dyn RuntimeDriver,
        run_start: u64,
    ) -> Vec<BindError> {
        self.run_start_step = run_start;
        self.last_transition_step = run_start;
        self.second_last_transition_step = run_start;

        let mut errors = Vec::new();
        let graph = Rc::clone(&self.graph);
        for edge in graph.edges() {
            let bound = edge
                .conditions
                .iter()
                .map(|c| {
                    utility.bind_check(&c.check, driver).unwrap_or_else(|e| {
                        errors.push(e);
                        BoundCheck::always_false(&c.check.id)
                    })
                })
                .collect();
            self.conditions.insert(edge.id.clone(), bound);
        }
        errors
    }

    fn timing(&self, step: u64) -> Timing {
        Timing {
            steps_since_start: step.saturating_sub(self.run_start_step),
            steps_since_transition: step.saturating_sub(self.last_transition_step),
            steps_since_end: self.program_end_step.map(|end| step.saturating_sub(end)),
        }
    }

    /// Try the outgoing edges of the current node and take the first whose
    /// conditions all hold.
    ///
    /// An edge is only tried when it polls, one of its events fired, or its
    /// force deadline passed. A forced edge whose conditions fail is
    /// reported and disabled for the rest of the run.
    pub fn test_edge_conditions(&mut self, driver: &dyn RuntimeDriver, flags: &EventFlags, step: u64) -> StepOutcome {
        let mut outcome = StepOutcome::default();
        if self.stopped() {
            return outcome;
        }
        let graph = Rc::clone(&self.graph);
        let Some(node) = graph.node(&self.current) else {
            return outcome;
        };
        let timing = self.timing(step);

        for edge in &node.edges {
            if self.disabled.contains(&edge.id) {
                continue;
            }
            let Some(bound) = self.conditions.get_mut(&edge.id) else {
                continue;
            };
            let forced = force_due(edge, timing.steps_since_start, timing.steps_since_transition);
            let candidate = forced || bound.iter().any(|b| b.trigger.is_poll() || b.trigger.fired(flags));
            if !candidate {
                continue;
            }

            let ctx = EvalContext { driver, flags, timing };
            let mut failed = None;
            for (i, check) in bound.iter_mut().enumerate() {
                match check.evaluate(&ctx) {
                    Ok(true) => {}
                    Ok(false) => {
                        failed = Some(i);
                        break;
                    }
                    Err(e) => {
                        outcome.errors.push(format!(
                            "Model={}. Edge={}. Condition={}: {e}",
                            graph.id, edge.id, edge.conditions[i]
                        ));
                        failed = Some(i);
                        break;
                    }
                }
            }

            match failed {
                None => {
                    self.second_last_transition_step = self.last_transition_step;
                    self.last_transition_step = step;
                    self.current = edge.to.clone();
                    self.coverage_run.insert(edge.id.clone());
                    self.coverage_total.insert(edge.id.clone());
                    outcome.taken = Some(Transition {
                        edge_id: edge.id.clone(),
                        from: edge.from.clone(),
                        to: edge.to.clone(),
                        trace: edge.describe(),
                        timing: Timing {
                            steps_since_transition: step.saturating_sub(self.second_last_transition_step),
                            ..timing
                        },
                    });
                    return outcome;
                }
                Some(i) if forced => {
                    self.disabled.insert(edge.id.clone());
                    outcome.failures.push(format!(
                        "Time limit exceeded! Model={}. Edge={}. Condition={} did not hold (forceTestAt={}, forceTestAfter={})",
                        graph.id, edge.id, edge.conditions[i], edge.force_test_at, edge.force_test_after
                    ));
                }
                Some(_) => {}
            }
        }
        outcome
    }
}

// ── Program models ───────────────────────────────────────────────────

/// A model of the program's own behaviour. Its edges assert effects.
pub struct ProgramModel {
    state: ModelState,
}

impl ProgramModel {
    pub fn new(graph: Rc<ModelGraph>) -> Self {
        Self {
            state: ModelState::new(graph),
        }
    }

    /// Bind conditions and register effect checks for a run.
    pub fn bind(&mut self, utility: &mut CheckUtility, driver: &mut dyn RuntimeDriver, run_start: u64) -> Vec<BindError> {
        let mut errors = self.state.bind_conditions(utility, driver, run_start);
        let graph = Rc::clone(&self.state.graph);
        for edge in graph.edges() {
            errors.extend(utility.register_effect_checks(&graph.id, edge, driver));
        }
        errors
    }

    /// Transition if possible and queue the taken edge's effects.
    pub fn step(&mut self, driver: &dyn RuntimeDriver, utility: &mut CheckUtility, step: u64) -> StepOutcome {
        let outcome = {
            let flags = utility.flags();
            self.state.test_edge_conditions(driver, &flags, step)
        };
        if let Some(t) = &outcome.taken {
            utility.effect_taken(&self.state.graph.id, &t.edge_id, t.timing);
        }
        outcome
    }
}

impl Deref for ProgramModel {
    type Target = ModelState;

    fn deref(&self) -> &ModelState {
        &self.state
    }
}

impl DerefMut for ProgramModel {
    fn deref_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}

// ── User models ──────────────────────────────────────────────────────

/// A model of user behaviour. Its edges inject input into the program.
pub struct UserModel {
    state: ModelState,
    inputs: HashMap<String, Vec<InputEvent>>,
}

impl UserModel {
    pub fn new(graph: Rc<ModelGraph>) -> Self {
        Self {
            state: ModelState::new(graph),
            inputs: HashMap::new(),
        }
    }

    /// Bind conditions and resolve input effects for a run.
    pub fn bind(&mut self, utility: &mut CheckUtility, driver: &mut dyn RuntimeDriver, run_start: u64) -> Vec<BindError> {
        let mut errors = self.state.bind_conditions(utility, driver, run_start);
        self.inputs.clear();
        let graph = Rc::clone(&self.state.graph);
        for edge in graph.edges() {
            let mut events = Vec::new();
            for input in edge.input_effects() {
                match utility.bind_input(input, driver) {
                    Ok(event) => events.push(event),
                    Err(e) => errors.push(e),
                }
            }
            self.inputs.insert(edge.id.clone(), events);
        }
        errors
    }

    pub fn inputs_for(&self, edge_id: &str) -> &[InputEvent] {
        self.inputs.get(edge_id).map_or(&[], |v| v.as_slice())
    }

    /// Transition if possible and inject the taken edge's input.
    pub fn step(&mut self, driver: &mut dyn RuntimeDriver, utility: &CheckUtility, step: u64) -> StepOutcome {
        let outcome = {
            let flags = utility.flags();
            self.state.test_edge_conditions(&*driver, &flags, step)
        };
        if let Some(t) = &outcome.taken {
            self.apply_inputs(&t.edge_id, driver);
        }
        outcome
    }

    fn apply_inputs(&self, edge_id: &str, driver: &mut dyn RuntimeDriver) {
        for event in self.inputs_for(edge_id) {
            if let InputEvent::Key { key, down: true } = event {
                if let Some(opposite) = opposite_arrow(key) {
                    driver.input_immediate(InputEvent::Key {
                        key: opposite.to_string(),
                        down: false,
                    });
                }
            }
            tracing::trace!(model = %self.state.graph.id, edge = %edge_id, ?event, "injecting input");
            driver.input_immediate(event.clone());
        }
    }
}

impl Deref for UserModel {
    type Target = ModelState;

    fn deref(&self) -> &ModelState {
        &self.state
    }
}

impl DerefMut for UserModel {
    fn deref_mut(&mut self) -> &mut ModelState {
        &mut self.state
    }
}
