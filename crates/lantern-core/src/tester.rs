//! Orchestration of all models of a loaded graph set over one test run.
//!
//! [`ModelTester::prepare`] binds every model to the driver and registers
//! two step callbacks. The before-step callback lets user models inject
//! input and captures key state. The after-step callback drives program
//! models, checks their effects and, once the program is over, runs the
//! end models before removing both callbacks.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use lantern_compiler::load::{LoadError, LoadWarning};
use lantern_ir::types::Usage;
use lantern_model::driver::{CallbackId, RuntimeDriver, StepPhase};
use lantern_model::model::{ModelState, StepOutcome};
use lantern_model::{CheckUtility, ProgramModel, UserModel};

use crate::config::TesterConfig;
use crate::result::{CoverageSummary, ModelResult, TotalCoverage};

#[derive(Debug, thiserror::Error)]
pub enum TesterError {
    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("No graph set loaded")]
    NotLoaded,
}

/// What [`ModelTester::load`] found.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub program_models: usize,
    pub user_models: usize,
    pub end_models: usize,
    pub warnings: Vec<LoadWarning>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Program,
    End,
    /// Waiting for pending effect re-checks before detaching.
    Settling { remaining: u32 },
    Done,
}

struct TesterState {
    config: TesterConfig,
    loaded: bool,
    program: Vec<ProgramModel>,
    user: Vec<UserModel>,
    end: Vec<ProgramModel>,
    utility: Option<CheckUtility>,
    result: ModelResult,
    phase: Phase,
    callbacks: Vec<CallbackId>,
    runs: u64,
}

fn record(result: &mut ModelResult, model: &str, outcome: StepOutcome, step: u64) {
    if let Some(t) = outcome.taken {
        tracing::debug!(%model, edge = %t.edge_id, step, "transition");
        result.add_trace(format!("{model}: {}", t.trace));
    }
    for message in outcome.errors {
        result.add_error(message);
    }
    for message in outcome.failures {
        result.add_failure(message);
    }
}

fn stop_message(model: &ModelState) -> String {
    if model.stopped() {
        format!("Model {} stopped at node {}", model.id(), model.current_node_id())
    } else {
        format!("Model {} did not stop, last node {}", model.id(), model.current_node_id())
    }
}

impl TesterState {
    fn models(&self) -> impl Iterator<Item = &ModelState> {
        self.program
            .iter()
            .map(|m| &**m)
            .chain(self.user.iter().map(|m| &**m))
            .chain(self.end.iter().map(|m| &**m))
    }

    fn before_step(&mut self, driver: &mut dyn RuntimeDriver) {
        if self.phase != Phase::Program {
            return;
        }
        let Some(utility) = self.utility.as_mut() else {
            return;
        };
        let step = driver.total_steps();
        utility.capture_keys(&*driver);
        for model in &mut self.user {
            let outcome = model.step(driver, utility, step);
            record(&mut self.result, model.id(), outcome, step);
        }
        if self.user.iter().any(|m| m.stopped_all()) {
            for model in &mut self.user {
                model.halt();
            }
        }
        // Keys pressed by user models count for this step.
        utility.capture_keys(&*driver);
    }

    fn after_step(&mut self, driver: &mut dyn RuntimeDriver) {
        let Some(utility) = self.utility.as_mut() else {
            return;
        };
        let step = driver.total_steps();
        self.result.absorb(utility.check_failed_effects(&*driver));

        match self.phase {
            Phase::Program => {
                for model in &mut self.program {
                    let outcome = model.step(&*driver, utility, step);
                    record(&mut self.result, model.id(), outcome, step);
                }
                self.result.absorb(utility.check_effects(&*driver));

                let all_stopped = !self.program.is_empty() && self.program.iter().all(|m| m.stopped());
                let stop_all = self.program.iter().any(|m| m.stopped_all());
                if stop_all || all_stopped {
                    self.begin_end_phase(step);
                }
            }
            Phase::End => {
                for model in &mut self.end {
                    let outcome = model.step(&*driver, utility, step);
                    record(&mut self.result, model.id(), outcome, step);
                }
                self.result.absorb(utility.check_effects(&*driver));
                if self.end.iter().all(|m| m.stopped()) {
                    self.phase = Phase::Settling {
                        remaining: self.config.effect_recheck_steps,
                    };
                }
            }
            Phase::Settling { remaining } => {
                self.phase = Phase::Settling {
                    remaining: remaining.saturating_sub(1),
                };
            }
            Phase::Idle | Phase::Done => {}
        }

        if let Some(utility) = self.utility.as_mut() {
            utility.reset();
            if let Phase::Settling { remaining } = self.phase {
                if remaining == 0 || !utility.has_pending() {
                    self.finish(driver);
                }
            }
        }
    }

    /// Stop the program phase and hand over to the end models.
    fn begin_end_phase(&mut self, step: u64) {
        if !matches!(self.phase, Phase::Program) {
            return;
        }
        tracing::debug!(step, "program phase over");
        for model in &mut self.program {
            model.halt();
        }
        for model in &mut self.user {
            model.halt();
        }
        for model in &mut self.end {
            model.set_program_end(step);
        }
        if let Some(utility) = self.utility.as_mut() {
            utility.set_program_end(step);
        }
        self.phase = if self.end.is_empty() {
            Phase::Settling {
                remaining: self.config.effect_recheck_steps,
            }
        } else {
            Phase::End
        };
    }

    fn finish(&mut self, driver: &mut dyn RuntimeDriver) {
        for id in self.callbacks.drain(..) {
            driver.remove_step_callback(id);
        }
        self.phase = Phase::Done;
        tracing::info!("test run finished");
    }

    fn detach(&mut self, driver: &mut dyn RuntimeDriver) {
        for id in self.callbacks.drain(..) {
            driver.remove_step_callback(id);
        }
        if let Some(mut utility) = self.utility.take() {
            utility.teardown(driver);
        }
        if self.phase != Phase::Idle {
            self.phase = Phase::Done;
        }
    }
}

/// Runs a loaded graph set against a program, one run per
/// [`ModelTester::prepare`].
pub struct ModelTester {
    state: Rc<RefCell<TesterState>>,
}

impl ModelTester {
    pub fn new() -> Self {
        Self::with_config(TesterConfig::default())
    }

    pub fn with_config(config: TesterConfig) -> Self {
        let result = ModelResult::new(config.max_repeated_outputs);
        Self {
            state: Rc::new(RefCell::new(TesterState {
                config,
                loaded: false,
                program: Vec::new(),
                user: Vec::new(),
                end: Vec::new(),
                utility: None,
                result,
                phase: Phase::Idle,
                callbacks: Vec::new(),
                runs: 0,
            })),
        }
    }

    pub fn config(&self) -> TesterConfig {
        self.state.borrow().config.clone()
    }

    /// Load a graph-set description, replacing any previous one.
    pub fn load(&mut self, json: &str) -> Result<LoadReport, TesterError> {
        let loaded = lantern_compiler::load(json)?;
        let mut state = self.state.borrow_mut();
        state.program.clear();
        state.user.clear();
        state.end.clear();
        for graph in loaded.graphs {
            let usage = graph.usage;
            let graph = Rc::new(graph);
            match usage {
                Usage::Program => state.program.push(ProgramModel::new(graph)),
                Usage::User => state.user.push(UserModel::new(graph)),
                Usage::End => state.end.push(ProgramModel::new(graph)),
            }
        }
        state.loaded = true;
        let report = LoadReport {
            program_models: state.program.len(),
            user_models: state.user.len(),
            end_models: state.end.len(),
            warnings: loaded.warnings,
        };
        tracing::info!(
            program = report.program_models,
            user = report.user_models,
            end = report.end_models,
            "graph set loaded"
        );
        Ok(report)
    }

    /// Reset all models, bind them to `driver` and register the step
    /// callbacks for a new run.
    ///
    /// Binding errors are recorded in the run's result. With
    /// `halt_on_binding_error` set, such a run registers no callbacks.
    pub fn prepare(&mut self, driver: &mut dyn RuntimeDriver, case_sensitive: bool) -> Result<(), TesterError> {
        let mut state = self.state.borrow_mut();
        if !state.loaded {
            return Err(TesterError::NotLoaded);
        }
        state.detach(driver);

        let config = state.config.clone();
        let seed = config.random_seed.wrapping_add(state.runs);
        state.runs += 1;
        let mut utility = CheckUtility::new(case_sensitive, seed, config.effect_recheck_steps);
        state.result = ModelResult::new(config.max_repeated_outputs);
        let start = driver.total_steps();
        utility.start_run(start);

        let mut errors = Vec::new();
        let st = &mut *state;
        for model in &mut st.program {
            model.reset();
            errors.extend(model.bind(&mut utility, driver, start));
        }
        for model in &mut st.user {
            model.reset();
            errors.extend(model.bind(&mut utility, driver, start));
        }
        for model in &mut st.end {
            model.reset();
            errors.extend(model.bind(&mut utility, driver, start));
        }
        for error in &errors {
            st.result.add_error(error.to_string());
        }

        if !errors.is_empty() && config.halt_on_binding_error {
            tracing::error!(errors = errors.len(), "binding failed, run abandoned");
            utility.teardown(driver);
            st.phase = Phase::Done;
            return Ok(());
        }

        st.utility = Some(utility);
        st.phase = Phase::Program;
        let before = Rc::downgrade(&self.state);
        let after = Rc::downgrade(&self.state);
        st.callbacks = vec![
            driver.add_step_callback(
                StepPhase::Before,
                Box::new(move |driver: &mut dyn RuntimeDriver| with_state(&before, |s| s.before_step(driver))),
            ),
            driver.add_step_callback(
                StepPhase::After,
                Box::new(move |driver: &mut dyn RuntimeDriver| with_state(&after, |s| s.after_step(driver))),
            ),
        ];
        tracing::info!(run = st.runs, start, "test run prepared");
        Ok(())
    }

    /// Tell the tester that the program itself ended. Program models stop
    /// and the end models take over from the next step on.
    pub fn on_program_end(&mut self, driver: &dyn RuntimeDriver) {
        self.state.borrow_mut().begin_end_phase(driver.total_steps());
    }

    /// Whether the current run still has callbacks registered.
    pub fn running(&self) -> bool {
        matches!(
            self.state.borrow().phase,
            Phase::Program | Phase::End | Phase::Settling { .. }
        )
    }

    /// Finish the run and return its result.
    ///
    /// Pending effect re-checks are reported, every listener and callback
    /// is removed from `driver`.
    pub fn get_model_states(&mut self, driver: &mut dyn RuntimeDriver) -> ModelResult {
        let mut state = self.state.borrow_mut();
        let st = &mut *state;
        if let Some(utility) = st.utility.as_mut() {
            st.result.absorb(utility.flush(&*driver));
        }

        let messages: Vec<String> = st.models().map(stop_message).collect();
        for message in messages {
            st.result.add_log(message);
        }

        let mut final_state = Vec::new();
        for sprite in driver.sprites().into_iter().filter(|s| s.is_original) {
            for name in driver.variable_names(sprite.id) {
                if let Some(value) = driver.variable(sprite.id, &name) {
                    final_state.push(format!("{}.{} = {}", sprite.name, name, value));
                }
            }
        }
        st.result.final_state = final_state;

        let coverage: BTreeMap<String, CoverageSummary> = st
            .models()
            .map(|m| {
                (
                    m.id().to_string(),
                    CoverageSummary {
                        covered: m.coverage().len(),
                        total: m.graph().edge_count(),
                    },
                )
            })
            .collect();
        st.result.coverage = coverage;

        st.detach(driver);
        st.result.clone()
    }

    /// Coverage of every model across all runs since the last reset.
    pub fn get_total_coverage(&self) -> BTreeMap<String, TotalCoverage> {
        let state = self.state.borrow();
        let coverage: BTreeMap<String, TotalCoverage> = state
            .models()
            .map(|m| {
                let covered: Vec<String> = m.total_coverage().iter().cloned().collect();
                let missed = m
                    .graph()
                    .edge_ids()
                    .into_iter()
                    .filter(|id| !m.total_coverage().contains(id))
                    .collect();
                (
                    m.id().to_string(),
                    TotalCoverage {
                        covered,
                        total: m.graph().edge_count(),
                        missed,
                    },
                )
            })
            .collect();
        coverage
    }

    pub fn reset_total_coverage(&mut self) {
        let mut state = self.state.borrow_mut();
        let st = &mut *state;
        for model in &mut st.program {
            model.reset_total_coverage();
        }
        for model in &mut st.user {
            model.reset_total_coverage();
        }
        for model in &mut st.end {
            model.reset_total_coverage();
        }
    }

    pub fn program_models_loaded(&self) -> bool {
        !self.state.borrow().program.is_empty()
    }

    pub fn user_models_loaded(&self) -> bool {
        !self.state.borrow().user.is_empty()
    }

    pub fn end_models_loaded(&self) -> bool {
        !self.state.borrow().end.is_empty()
    }
}

impl Default for ModelTester {
    fn default() -> Self {
        Self::new()
    }
}

/// Run `f` on the tester state if the tester is still alive and not
/// already borrowed.
fn with_state(state: &Weak<RefCell<TesterState>>, f: impl FnOnce(&mut TesterState)) {
    let Some(shared) = state.upgrade() else {
        return;
    };
    let Ok(mut guard) = shared.try_borrow_mut() else {
        return;
    };
    f(&mut guard);
}
