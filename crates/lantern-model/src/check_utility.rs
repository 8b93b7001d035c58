//! Event-driven check state and effect verification for one test run.
//!
//! Listeners are registered on the driver at most once per
//! (event kind, sprite) and removed together by [`CheckUtility::teardown`].
//! Effects of edges taken in a step are screened for contradictions, then
//! checked; failing ones get a delayed re-check before they are reported.

use std::cell::{Ref, RefCell};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::rc::Rc;

use lantern_compiler::check::{Check, Effect, InputEffect};
use lantern_compiler::contradiction::find_contradictions;
use lantern_compiler::graph::ModelEdge;

use crate::bind::{BoundCheck, CheckGenerator, EvalContext, Timing};
use crate::driver::{InputEvent, RuntimeDriver, RuntimeEvent, RuntimeEventKind, SpriteId, SubscriptionId};
use crate::error::BindError;
use crate::value::Rgb;

/// Canonical key name: trimmed, lower case.
pub fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

/// The arrow key that cancels `key`, if any.
pub fn opposite_arrow(key: &str) -> Option<&'static str> {
    match key {
        "left arrow" => Some("right arrow"),
        "right arrow" => Some("left arrow"),
        "up arrow" => Some("down arrow"),
        "down arrow" => Some("up arrow"),
        _ => None,
    }
}

/// Something that can make an event-triggered edge a candidate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventKey {
    Key(String),
    Moved(SpriteId),
    Visual(SpriteId),
    Said(SpriteId),
}

// ── Flags ────────────────────────────────────────────────────────────

/// Flags raised by listeners during one step, plus the interest lists the
/// listeners consult. Flags are cleared by [`EventFlags::clear`]; interest
/// lives for the whole run.
#[derive(Debug, Default)]
pub struct EventFlags {
    touch_pairs: Vec<(SpriteId, SpriteId)>,
    colors: Vec<(SpriteId, Rgb)>,
    keys: BTreeSet<String>,

    moved: HashSet<SpriteId>,
    visual: HashSet<SpriteId>,
    said: HashMap<SpriteId, Vec<String>>,
    touching: HashSet<(SpriteId, SpriteId)>,
    touching_color: HashSet<(SpriteId, Rgb)>,
    keys_captured: HashSet<String>,
}

impl EventFlags {
    pub fn fired(&self, key: &EventKey) -> bool {
        match key {
            EventKey::Key(k) => self.keys_captured.contains(k),
            EventKey::Moved(s) => self.moved.contains(s),
            EventKey::Visual(s) => self.visual.contains(s),
            EventKey::Said(s) => self.said.contains_key(s),
        }
    }

    /// Captured down before the step and not cancelled by a captured
    /// opposite arrow key.
    pub fn is_key_down(&self, key: &str) -> bool {
        self.keys_captured.contains(key) && opposite_arrow(key).map_or(true, |o| !self.keys_captured.contains(o))
    }

    /// `a` touched `b` when it moved, or `b` touched `a` when it moved and
    /// they still touch.
    pub fn are_touching(&self, a: SpriteId, b: SpriteId, driver: &dyn RuntimeDriver) -> bool {
        self.touching.contains(&(a, b)) || (self.touching.contains(&(b, a)) && driver.is_touching_sprite(a, b))
    }

    pub fn is_touching_color(&self, sprite: SpriteId, color: Rgb, driver: &dyn RuntimeDriver) -> bool {
        self.touching_color.contains(&(sprite, color)) || driver.is_touching_color(sprite, color)
    }

    /// Texts said or thought by `sprite` during this step.
    pub fn said(&self, sprite: SpriteId) -> &[String] {
        self.said.get(&sprite).map_or(&[], |v| v.as_slice())
    }

    fn on_event(&mut self, event: &RuntimeEvent, driver: &dyn RuntimeDriver) {
        let sprite = event.sprite();
        match event {
            RuntimeEvent::SpriteMoved { .. } | RuntimeEvent::VisualChanged { .. } => {
                if matches!(event, RuntimeEvent::SpriteMoved { .. }) {
                    self.moved.insert(sprite);
                    for &(a, b) in &self.touch_pairs {
                        if a == sprite && driver.is_touching_sprite(a, b) {
                            self.touching.insert((a, b));
                        } else if b == sprite && driver.is_touching_sprite(b, a) {
                            self.touching.insert((b, a));
                        }
                    }
                } else {
                    self.visual.insert(sprite);
                }
                for &(s, color) in &self.colors {
                    if s == sprite && driver.is_touching_color(s, color) {
                        self.touching_color.insert((s, color));
                    }
                }
            }
            RuntimeEvent::SayOrThink { text, .. } => {
                self.said.entry(sprite).or_default().push(text.clone());
            }
            RuntimeEvent::VariableChanged { .. } => {}
        }
    }

    fn capture_keys(&mut self, driver: &dyn RuntimeDriver) {
        for key in &self.keys {
            if driver.is_key_down(key) {
                self.keys_captured.insert(key.clone());
            }
        }
    }

    pub fn clear(&mut self) {
        self.moved.clear();
        self.visual.clear();
        self.said.clear();
        self.touching.clear();
        self.touching_color.clear();
        self.keys_captured.clear();
    }
}

// ── Listener registry ────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum ListenerKey {
    Moved(SpriteId),
    Visual(SpriteId),
    Said(SpriteId),
}

/// Owns every subscription made for one run.
#[derive(Debug, Default)]
pub struct ListenerRegistry {
    flags: Rc<RefCell<EventFlags>>,
    subscriptions: HashMap<ListenerKey, SubscriptionId>,
}

impl ListenerRegistry {
    fn ensure(&mut self, key: ListenerKey, driver: &mut dyn RuntimeDriver) {
        if self.subscriptions.contains_key(&key) {
            return;
        }
        let (kind, target) = match key {
            ListenerKey::Moved(s) => (RuntimeEventKind::SpriteMoved, s),
            ListenerKey::Visual(s) => (RuntimeEventKind::VisualChanged, s),
            ListenerKey::Said(s) => (RuntimeEventKind::SayOrThink, s),
        };
        let flags = Rc::clone(&self.flags);
        let id = driver.subscribe(
            kind,
            Box::new(move |event: &RuntimeEvent, driver: &dyn RuntimeDriver| {
                if event.sprite() != target {
                    return;
                }
                if let Ok(mut flags) = flags.try_borrow_mut() {
                    flags.on_event(event, driver);
                }
            }),
        );
        self.subscriptions.insert(key, id);
    }

    pub fn watch_key(&mut self, key: &str) {
        let key = normalize_key(key);
        let mut flags = self.flags.borrow_mut();
        if let Some(opposite) = opposite_arrow(&key) {
            flags.keys.insert(opposite.to_string());
        }
        flags.keys.insert(key);
    }

    pub fn watch_touching(&mut self, a: SpriteId, b: SpriteId, driver: &mut dyn RuntimeDriver) {
        {
            let mut flags = self.flags.borrow_mut();
            if !flags.touch_pairs.contains(&(a, b)) {
                flags.touch_pairs.push((a, b));
            }
        }
        self.ensure(ListenerKey::Moved(a), driver);
        self.ensure(ListenerKey::Moved(b), driver);
    }

    pub fn watch_color(&mut self, sprite: SpriteId, color: Rgb, driver: &mut dyn RuntimeDriver) {
        {
            let mut flags = self.flags.borrow_mut();
            if !flags.colors.contains(&(sprite, color)) {
                flags.colors.push((sprite, color));
            }
        }
        self.ensure(ListenerKey::Moved(sprite), driver);
        self.ensure(ListenerKey::Visual(sprite), driver);
    }

    pub fn watch_output(&mut self, sprite: SpriteId, driver: &mut dyn RuntimeDriver) {
        self.ensure(ListenerKey::Said(sprite), driver);
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn flags(&self) -> Ref<'_, EventFlags> {
        self.flags.borrow()
    }

    fn teardown(&mut self, driver: &mut dyn RuntimeDriver) {
        for (_, id) in self.subscriptions.drain() {
            driver.unsubscribe(id);
        }
        *self.flags.borrow_mut() = EventFlags::default();
    }
}

// ── Effects ──────────────────────────────────────────────────────────

struct BoundEffect {
    effect: Effect,
    bound: BoundCheck,
}

struct TakenEdge {
    model: String,
    edge: String,
    timing: Timing,
}

struct PendingEffect {
    model: String,
    edge: String,
    index: usize,
    timing: Timing,
    remaining: u32,
}

/// Outcome of one effect-checking pass.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectReport {
    pub contradictions: Vec<String>,
    pub failures: Vec<String>,
    pub errors: Vec<String>,
}

impl EffectReport {
    pub fn is_empty(&self) -> bool {
        self.contradictions.is_empty() && self.failures.is_empty() && self.errors.is_empty()
    }
}

fn failure_message(model: &str, edge: &str, effect: &Effect) -> String {
    format!("Effect failed! Model={model}. Edge={edge}. Effect={effect}")
}

pub struct CheckUtility {
    registry: ListenerRegistry,
    generator: CheckGenerator,
    effects: HashMap<(String, String), Vec<BoundEffect>>,
    taken: Vec<TakenEdge>,
    pending: Vec<PendingEffect>,
    recheck_steps: u32,
    case_sensitive: bool,
    run_start: u64,
    program_end: Option<u64>,
}

impl CheckUtility {
    pub fn new(case_sensitive: bool, seed: u64, recheck_steps: u32) -> Self {
        Self {
            registry: ListenerRegistry::default(),
            generator: CheckGenerator::new(case_sensitive, seed),
            effects: HashMap::new(),
            taken: Vec::new(),
            pending: Vec::new(),
            recheck_steps,
            case_sensitive,
            run_start: 0,
            program_end: None,
        }
    }

    /// Driver step at which the run began. Re-checked effects measure
    /// elapsed time from here.
    pub fn start_run(&mut self, step: u64) {
        self.run_start = step;
        self.program_end = None;
    }

    /// Driver step at which the program ended. Only the first call counts.
    pub fn set_program_end(&mut self, step: u64) {
        self.program_end.get_or_insert(step);
    }

    /// Timing of a re-check at driver step `now`. The transition interval
    /// stays the one seen when the edge was taken.
    fn recheck_timing(&self, queued: Timing, now: u64) -> Timing {
        Timing {
            steps_since_start: now.saturating_sub(self.run_start),
            steps_since_end: self.program_end.map(|end| now.saturating_sub(end)),
            ..queued
        }
    }

    pub fn bind_check(&mut self, check: &Check, driver: &mut dyn RuntimeDriver) -> Result<BoundCheck, BindError> {
        self.generator.bind(check, driver, &mut self.registry)
    }

    pub fn bind_input(&self, input: &InputEffect, driver: &dyn RuntimeDriver) -> Result<InputEvent, BindError> {
        self.generator.bind_input(input, driver)
    }

    /// Bind the effects of a program edge. A check that cannot be bound is
    /// replaced by one that always fails and its error is returned.
    pub fn register_effect_checks(
        &mut self,
        model: &str,
        edge: &ModelEdge,
        driver: &mut dyn RuntimeDriver,
    ) -> Vec<BindError> {
        let mut errors = Vec::new();
        let mut bound_effects = Vec::new();
        for effect in edge.effects() {
            let bound = match self.bind_check(&effect.check, driver) {
                Ok(bound) => bound,
                Err(e) => {
                    errors.push(e);
                    BoundCheck::always_false(&effect.check.id)
                }
            };
            bound_effects.push(BoundEffect {
                effect: effect.clone(),
                bound,
            });
        }
        if !bound_effects.is_empty() {
            self.effects.insert((model.to_string(), edge.id.clone()), bound_effects);
        }
        errors
    }

    /// Mark the effects of `edge` as asserted in the current step.
    pub fn effect_taken(&mut self, model: &str, edge: &str, timing: Timing) {
        if self.effects.contains_key(&(model.to_string(), edge.to_string())) {
            self.taken.push(TakenEdge {
                model: model.to_string(),
                edge: edge.to_string(),
                timing,
            });
        }
    }

    pub fn capture_keys(&mut self, driver: &dyn RuntimeDriver) {
        self.registry.flags.borrow_mut().capture_keys(driver);
    }

    pub fn flags(&self) -> Ref<'_, EventFlags> {
        self.registry.flags()
    }

    /// Clear per-step flags.
    pub fn reset(&mut self) {
        self.registry.flags.borrow_mut().clear();
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn subscription_count(&self) -> usize {
        self.registry.subscription_count()
    }

    /// Screen this step's effects for contradictions and check the rest.
    /// Failures are queued for [`CheckUtility::check_failed_effects`].
    pub fn check_effects(&mut self, driver: &dyn RuntimeDriver) -> EffectReport {
        let mut report = EffectReport::default();
        let taken = std::mem::take(&mut self.taken);

        let mut entries: Vec<(usize, usize)> = Vec::new();
        for (t, edge) in taken.iter().enumerate() {
            if let Some(effects) = self.effects.get(&(edge.model.clone(), edge.edge.clone())) {
                entries.extend((0..effects.len()).map(|i| (t, i)));
            }
        }

        let mut excluded = HashSet::new();
        {
            let effect_at = |&(t, i): &(usize, usize)| -> Option<&Effect> {
                let edge = &taken[t];
                self.effects
                    .get(&(edge.model.clone(), edge.edge.clone()))
                    .map(|effects| &effects[i].effect)
            };
            let effects: Vec<&Effect> = entries.iter().filter_map(effect_at).collect();
            for (x, y) in find_contradictions(&effects, self.case_sensitive) {
                excluded.insert(x);
                excluded.insert(y);
                let (ex, ey) = (&taken[entries[x].0], &taken[entries[y].0]);
                report.contradictions.push(format!(
                    "Contradicting effects: Model={}. Edge={}. Effect={} and Model={}. Edge={}. Effect={}",
                    ex.model, ex.edge, effects[x], ey.model, ey.edge, effects[y]
                ));
            }
        }

        let flags = self.registry.flags.borrow();
        for (n, &(t, i)) in entries.iter().enumerate() {
            if excluded.contains(&n) {
                continue;
            }
            let edge = &taken[t];
            let Some(effects) = self.effects.get_mut(&(edge.model.clone(), edge.edge.clone())) else {
                continue;
            };
            let ctx = EvalContext {
                driver,
                flags: &flags,
                timing: edge.timing,
            };
            let slot = &mut effects[i];
            match slot.bound.evaluate(&ctx) {
                Ok(true) => {}
                Ok(false) if self.recheck_steps == 0 => {
                    report.failures.push(failure_message(&edge.model, &edge.edge, &slot.effect));
                }
                Ok(false) => self.pending.push(PendingEffect {
                    model: edge.model.clone(),
                    edge: edge.edge.clone(),
                    index: i,
                    timing: edge.timing,
                    remaining: self.recheck_steps,
                }),
                Err(e) => report.errors.push(format!(
                    "Model={}. Edge={}. Effect={}: {e}",
                    edge.model, edge.edge, slot.effect
                )),
            }
        }
        report
    }

    /// Re-check effects that failed earlier; report those whose re-check
    /// budget is used up.
    pub fn check_failed_effects(&mut self, driver: &dyn RuntimeDriver) -> EffectReport {
        self.recheck(driver, false)
    }

    /// Re-check every pending effect once more and report all that still
    /// fail.
    pub fn flush(&mut self, driver: &dyn RuntimeDriver) -> EffectReport {
        self.recheck(driver, true)
    }

    fn recheck(&mut self, driver: &dyn RuntimeDriver, force: bool) -> EffectReport {
        let mut report = EffectReport::default();
        let pending = std::mem::take(&mut self.pending);
        let now = driver.total_steps();
        let flags = self.registry.flags.borrow();
        for mut p in pending {
            let timing = self.recheck_timing(p.timing, now);
            let Some(slot) = self
                .effects
                .get_mut(&(p.model.clone(), p.edge.clone()))
                .and_then(|effects| effects.get_mut(p.index))
            else {
                continue;
            };
            let ctx = EvalContext {
                driver,
                flags: &flags,
                timing,
            };
            match slot.bound.evaluate(&ctx) {
                Ok(true) => {}
                Ok(false) => {
                    p.remaining = p.remaining.saturating_sub(1);
                    if force || p.remaining == 0 {
                        report.failures.push(failure_message(&p.model, &p.edge, &slot.effect));
                    } else {
                        self.pending.push(p);
                    }
                }
                Err(e) => report.errors.push(format!(
                    "Model={}. Edge={}. Effect={}: {e}",
                    p.model, p.edge, slot.effect
                )),
            }
        }
        report
    }

    /// Remove every listener from the driver and drop all run state.
    pub fn teardown(&mut self, driver: &mut dyn RuntimeDriver) {
        self.registry.teardown(driver);
        self.effects.clear();
        self.taken.clear();
        self.pending.clear();
    }
}
