//! Narrow interface to the running program.
//!
//! The engine never executes programs itself; everything it observes or
//! injects goes through [`RuntimeDriver`]. Callbacks registered here are
//! invoked by the driver's own stepping loop, single-threaded.

use serde::{Deserialize, Serialize};

pub use lantern_compiler::check::EdgeAxis;

use crate::value::{Attribute, Rgb, Value};

/// Handle to one sprite or clone instance. Stable for the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SpriteId(pub u32);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpriteInfo {
    pub id: SpriteId,
    pub name: String,
    /// `false` for clones.
    pub is_original: bool,
    pub visible: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    Key { key: String, down: bool },
    MouseMove { x: f64, y: f64 },
    MouseDown { down: bool },
    ClickSprite { sprite: SpriteId },
    ClickStage,
    Text { answer: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeEventKind {
    SpriteMoved,
    VisualChanged,
    SayOrThink,
    VariableChanged,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuntimeEvent {
    SpriteMoved { sprite: SpriteId },
    VisualChanged { sprite: SpriteId },
    SayOrThink { sprite: SpriteId, text: String },
    VariableChanged { sprite: SpriteId, name: String },
}

impl RuntimeEvent {
    pub fn kind(&self) -> RuntimeEventKind {
        match self {
            RuntimeEvent::SpriteMoved { .. } => RuntimeEventKind::SpriteMoved,
            RuntimeEvent::VisualChanged { .. } => RuntimeEventKind::VisualChanged,
            RuntimeEvent::SayOrThink { .. } => RuntimeEventKind::SayOrThink,
            RuntimeEvent::VariableChanged { .. } => RuntimeEventKind::VariableChanged,
        }
    }

    pub fn sprite(&self) -> SpriteId {
        match self {
            RuntimeEvent::SpriteMoved { sprite }
            | RuntimeEvent::VisualChanged { sprite }
            | RuntimeEvent::SayOrThink { sprite, .. }
            | RuntimeEvent::VariableChanged { sprite, .. } => *sprite,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepPhase {
    Before,
    After,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

pub type StepCallback = Box<dyn FnMut(&mut dyn RuntimeDriver)>;
pub type EventListener = Box<dyn FnMut(&RuntimeEvent, &dyn RuntimeDriver)>;

pub trait RuntimeDriver {
    // ── Sprites ──────────────────────────────────────────────────────

    /// All live sprites and clones, stage included, in layer order.
    fn sprites(&self) -> Vec<SpriteInfo>;
    fn attribute(&self, sprite: SpriteId, attribute: Attribute) -> Option<Value>;
    /// Value at the start of the current step.
    fn previous_attribute(&self, sprite: SpriteId, attribute: Attribute) -> Option<Value>;
    fn variable_names(&self, sprite: SpriteId) -> Vec<String>;
    fn variable(&self, sprite: SpriteId, name: &str) -> Option<Value>;
    fn previous_variable(&self, sprite: SpriteId, name: &str) -> Option<Value>;
    /// Returns `false` if the variable does not exist.
    fn set_variable(&mut self, sprite: SpriteId, name: &str, value: Value) -> bool;

    // ── Rendering queries ────────────────────────────────────────────

    fn is_touching_sprite(&self, sprite: SpriteId, other: SpriteId) -> bool;
    fn is_touching_color(&self, sprite: SpriteId, color: Rgb) -> bool;
    fn is_touching_edge(&self, sprite: SpriteId, axis: EdgeAxis) -> bool;
    fn is_touching_mouse(&self, sprite: SpriteId) -> bool;
    fn backdrop(&self) -> String;
    fn previous_backdrop(&self) -> String;

    // ── Input ────────────────────────────────────────────────────────

    fn is_key_down(&self, key: &str) -> bool;
    fn is_mouse_down(&self) -> bool;
    fn input_immediate(&mut self, event: InputEvent);

    // ── Time ─────────────────────────────────────────────────────────

    fn total_steps(&self) -> u64;
    fn time_to_steps(&self, millis: f64) -> u64;
    fn steps_to_time(&self, steps: u64) -> f64;

    // ── Callbacks ────────────────────────────────────────────────────

    fn add_step_callback(&mut self, phase: StepPhase, callback: StepCallback) -> CallbackId;
    /// Safe to call from inside a running callback.
    fn remove_step_callback(&mut self, id: CallbackId);
    fn subscribe(&mut self, kind: RuntimeEventKind, listener: EventListener) -> SubscriptionId;
    fn unsubscribe(&mut self, id: SubscriptionId);
}
