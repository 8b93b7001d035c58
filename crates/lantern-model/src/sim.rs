//! In-memory [`RuntimeDriver`] for tests and dry runs.
//!
//! `SimDriver` holds sprite state directly; the "program" is whatever the
//! caller does between steps through [`SimDriver::step_with`].

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use crate::driver::{
    CallbackId, EdgeAxis, EventListener, InputEvent, RuntimeDriver, RuntimeEvent, RuntimeEventKind, SpriteId,
    SpriteInfo, StepCallback, StepPhase, SubscriptionId,
};
use crate::value::{Attribute, Rgb, Value};

/// Default frame time of the block runtime (30 fps).
pub const DEFAULT_STEP_MILLIS: f64 = 1000.0 / 30.0;

struct SimSprite {
    info: SpriteInfo,
    attributes: HashMap<Attribute, Value>,
    previous_attributes: HashMap<Attribute, Value>,
    variables: BTreeMap<String, Value>,
    previous_variables: BTreeMap<String, Value>,
}

struct CallbackEntry {
    id: CallbackId,
    phase: StepPhase,
    callback: StepCallback,
}

struct ListenerEntry {
    id: SubscriptionId,
    kind: RuntimeEventKind,
    listener: EventListener,
}

pub struct SimDriver {
    sprites: Vec<SimSprite>,
    backdrop: String,
    previous_backdrop: String,
    keys_down: BTreeSet<String>,
    mouse_down: bool,
    mouse: (f64, f64),
    mouse_over: HashSet<SpriteId>,
    touching: HashSet<(SpriteId, SpriteId)>,
    touching_colors: HashSet<(SpriteId, Rgb)>,
    touching_edges: HashSet<(SpriteId, EdgeAxis)>,
    steps: u64,
    step_millis: f64,
    callbacks: Vec<CallbackEntry>,
    cancelled: HashSet<CallbackId>,
    listeners: Vec<ListenerEntry>,
    next_id: u64,
    inputs: Vec<InputEvent>,
}

fn key_name(key: &str) -> String {
    key.trim().to_lowercase()
}

fn pair(a: SpriteId, b: SpriteId) -> (SpriteId, SpriteId) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

impl SimDriver {
    /// A driver with only the stage.
    pub fn new() -> Self {
        let mut driver = Self {
            sprites: Vec::new(),
            backdrop: "backdrop1".to_string(),
            previous_backdrop: "backdrop1".to_string(),
            keys_down: BTreeSet::new(),
            mouse_down: false,
            mouse: (0.0, 0.0),
            mouse_over: HashSet::new(),
            touching: HashSet::new(),
            touching_colors: HashSet::new(),
            touching_edges: HashSet::new(),
            steps: 0,
            step_millis: DEFAULT_STEP_MILLIS,
            callbacks: Vec::new(),
            cancelled: HashSet::new(),
            listeners: Vec::new(),
            next_id: 0,
            inputs: Vec::new(),
        };
        driver.add_sprite("Stage");
        driver
    }

    pub fn with_step_millis(mut self, millis: f64) -> Self {
        self.step_millis = millis;
        self
    }

    pub fn stage(&self) -> SpriteId {
        SpriteId(0)
    }

    pub fn add_sprite(&mut self, name: &str) -> SpriteId {
        let id = SpriteId(self.sprites.len() as u32);
        let attributes = HashMap::from([
            (Attribute::X, Value::Number(0.0)),
            (Attribute::Y, Value::Number(0.0)),
            (Attribute::Direction, Value::Number(90.0)),
            (Attribute::Visible, Value::Bool(true)),
            (Attribute::Size, Value::Number(100.0)),
            (Attribute::Costume, Value::from("costume1")),
            (Attribute::Volume, Value::Number(100.0)),
            (Attribute::LayerOrder, Value::Number(f64::from(id.0))),
            (Attribute::SayText, Value::from("")),
            (Attribute::RotationStyle, Value::from("all around")),
        ]);
        self.sprites.push(SimSprite {
            info: SpriteInfo {
                id,
                name: name.to_string(),
                is_original: true,
                visible: true,
            },
            attributes,
            previous_attributes: HashMap::new(),
            variables: BTreeMap::new(),
            previous_variables: BTreeMap::new(),
        });
        id
    }

    /// Clone a sprite, copying its attributes and variables.
    pub fn add_clone(&mut self, of: SpriteId) -> Option<SpriteId> {
        let id = SpriteId(self.sprites.len() as u32);
        let source = self.sprite(of)?;
        let clone = SimSprite {
            info: SpriteInfo {
                id,
                name: source.info.name.clone(),
                is_original: false,
                visible: source.info.visible,
            },
            attributes: source.attributes.clone(),
            previous_attributes: HashMap::new(),
            variables: source.variables.clone(),
            previous_variables: BTreeMap::new(),
        };
        self.sprites.push(clone);
        Some(id)
    }

    pub fn add_variable(&mut self, sprite: SpriteId, name: &str, value: impl Into<Value>) {
        if let Some(s) = self.sprite_mut(sprite) {
            s.variables.insert(name.to_string(), value.into());
        }
    }

    /// Set an attribute and fire the event a renderer would fire for it.
    pub fn set_attribute(&mut self, sprite: SpriteId, attribute: Attribute, value: impl Into<Value>) {
        let value = value.into();
        let Some(s) = self.sprite_mut(sprite) else {
            return;
        };
        if attribute == Attribute::Visible {
            s.info.visible = value.truthy();
        }
        s.attributes.insert(attribute, value.clone());
        let event = match attribute {
            Attribute::X | Attribute::Y => RuntimeEvent::SpriteMoved { sprite },
            Attribute::SayText => RuntimeEvent::SayOrThink {
                sprite,
                text: value.to_string(),
            },
            _ => RuntimeEvent::VisualChanged { sprite },
        };
        self.emit(event);
    }

    pub fn move_to(&mut self, sprite: SpriteId, x: f64, y: f64) {
        if let Some(s) = self.sprite_mut(sprite) {
            s.attributes.insert(Attribute::X, Value::Number(x));
            s.attributes.insert(Attribute::Y, Value::Number(y));
            self.emit(RuntimeEvent::SpriteMoved { sprite });
        }
    }

    pub fn say(&mut self, sprite: SpriteId, text: &str) {
        self.set_attribute(sprite, Attribute::SayText, text);
    }

    pub fn set_backdrop(&mut self, name: &str) {
        self.backdrop = name.to_string();
    }

    pub fn set_touching(&mut self, a: SpriteId, b: SpriteId, touching: bool) {
        if touching {
            self.touching.insert(pair(a, b));
        } else {
            self.touching.remove(&pair(a, b));
        }
    }

    pub fn set_touching_color(&mut self, sprite: SpriteId, color: Rgb, touching: bool) {
        if touching {
            self.touching_colors.insert((sprite, color));
        } else {
            self.touching_colors.remove(&(sprite, color));
        }
    }

    /// `axis` must be `Vertical` or `Horizontal`.
    pub fn set_touching_edge(&mut self, sprite: SpriteId, axis: EdgeAxis, touching: bool) {
        if touching {
            self.touching_edges.insert((sprite, axis));
        } else {
            self.touching_edges.remove(&(sprite, axis));
        }
    }

    pub fn set_mouse_over(&mut self, sprite: SpriteId, over: bool) {
        if over {
            self.mouse_over.insert(sprite);
        } else {
            self.mouse_over.remove(&sprite);
        }
    }

    pub fn mouse_position(&self) -> (f64, f64) {
        self.mouse
    }

    /// Every input injected so far, in order.
    pub fn inputs(&self) -> &[InputEvent] {
        &self.inputs
    }

    pub fn step_callback_count(&self) -> usize {
        self.callbacks.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    /// Run one step in which the program does nothing.
    pub fn step(&mut self) {
        self.step_with(|_| {});
    }

    /// Run one step: snapshot, before-step callbacks, `program`, after-step
    /// callbacks.
    pub fn step_with(&mut self, program: impl FnOnce(&mut SimDriver)) {
        for s in &mut self.sprites {
            s.previous_attributes = s.attributes.clone();
            s.previous_variables = s.variables.clone();
        }
        self.previous_backdrop = self.backdrop.clone();
        self.run_callbacks(StepPhase::Before);
        program(self);
        self.steps += 1;
        self.run_callbacks(StepPhase::After);
    }

    pub fn run_steps(&mut self, n: usize) {
        for _ in 0..n {
            self.step();
        }
    }

    fn sprite(&self, id: SpriteId) -> Option<&SimSprite> {
        self.sprites.iter().find(|s| s.info.id == id)
    }

    fn sprite_mut(&mut self, id: SpriteId) -> Option<&mut SimSprite> {
        self.sprites.iter_mut().find(|s| s.info.id == id)
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn run_callbacks(&mut self, phase: StepPhase) {
        let mut callbacks = std::mem::take(&mut self.callbacks);
        for entry in callbacks.iter_mut() {
            if entry.phase != phase || self.cancelled.contains(&entry.id) {
                continue;
            }
            (entry.callback)(self);
        }
        // Callbacks registered while dispatching landed in `self.callbacks`.
        callbacks.append(&mut self.callbacks);
        callbacks.retain(|e| !self.cancelled.contains(&e.id));
        self.cancelled.clear();
        self.callbacks = callbacks;
    }

    fn emit(&mut self, event: RuntimeEvent) {
        let mut listeners = std::mem::take(&mut self.listeners);
        let kind = event.kind();
        for entry in listeners.iter_mut().filter(|l| l.kind == kind) {
            (entry.listener)(&event, &*self);
        }
        self.listeners = listeners;
    }
}

impl Default for SimDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl RuntimeDriver for SimDriver {
    fn sprites(&self) -> Vec<SpriteInfo> {
        self.sprites.iter().map(|s| s.info.clone()).collect()
    }

    fn attribute(&self, sprite: SpriteId, attribute: Attribute) -> Option<Value> {
        self.sprite(sprite)?.attributes.get(&attribute).cloned()
    }

    fn previous_attribute(&self, sprite: SpriteId, attribute: Attribute) -> Option<Value> {
        self.sprite(sprite)?.previous_attributes.get(&attribute).cloned()
    }

    fn variable_names(&self, sprite: SpriteId) -> Vec<String> {
        self.sprite(sprite)
            .map(|s| s.variables.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn variable(&self, sprite: SpriteId, name: &str) -> Option<Value> {
        self.sprite(sprite)?.variables.get(name).cloned()
    }

    fn previous_variable(&self, sprite: SpriteId, name: &str) -> Option<Value> {
        self.sprite(sprite)?.previous_variables.get(name).cloned()
    }

    fn set_variable(&mut self, sprite: SpriteId, name: &str, value: Value) -> bool {
        let Some(slot) = self.sprite_mut(sprite).and_then(|s| s.variables.get_mut(name)) else {
            return false;
        };
        *slot = value;
        self.emit(RuntimeEvent::VariableChanged {
            sprite,
            name: name.to_string(),
        });
        true
    }

    fn is_touching_sprite(&self, sprite: SpriteId, other: SpriteId) -> bool {
        self.touching.contains(&pair(sprite, other))
    }

    fn is_touching_color(&self, sprite: SpriteId, color: Rgb) -> bool {
        self.touching_colors.contains(&(sprite, color))
    }

    fn is_touching_edge(&self, sprite: SpriteId, axis: EdgeAxis) -> bool {
        match axis {
            EdgeAxis::Any => self.touching_edges.iter().any(|(s, _)| *s == sprite),
            _ => self.touching_edges.contains(&(sprite, axis)),
        }
    }

    fn is_touching_mouse(&self, sprite: SpriteId) -> bool {
        self.mouse_over.contains(&sprite)
    }

    fn backdrop(&self) -> String {
        self.backdrop.clone()
    }

    fn previous_backdrop(&self) -> String {
        self.previous_backdrop.clone()
    }

    fn is_key_down(&self, key: &str) -> bool {
        self.keys_down.contains(&key_name(key))
    }

    fn is_mouse_down(&self) -> bool {
        self.mouse_down
    }

    fn input_immediate(&mut self, event: InputEvent) {
        match &event {
            InputEvent::Key { key, down: true } => {
                self.keys_down.insert(key_name(key));
            }
            InputEvent::Key { key, down: false } => {
                self.keys_down.remove(&key_name(key));
            }
            InputEvent::MouseMove { x, y } => self.mouse = (*x, *y),
            InputEvent::MouseDown { down } => self.mouse_down = *down,
            InputEvent::ClickSprite { sprite } => {
                self.mouse_over.insert(*sprite);
                self.mouse_down = true;
            }
            InputEvent::ClickStage => {
                self.mouse_over.clear();
                self.mouse_down = true;
            }
            InputEvent::Text { .. } => {}
        }
        self.inputs.push(event);
    }

    fn total_steps(&self) -> u64 {
        self.steps
    }

    fn time_to_steps(&self, millis: f64) -> u64 {
        (millis / self.step_millis).round().max(0.0) as u64
    }

    fn steps_to_time(&self, steps: u64) -> f64 {
        steps as f64 * self.step_millis
    }

    fn add_step_callback(&mut self, phase: StepPhase, callback: StepCallback) -> CallbackId {
        let id = CallbackId(self.next_id());
        self.callbacks.push(CallbackEntry { id, phase, callback });
        id
    }

    fn remove_step_callback(&mut self, id: CallbackId) {
        self.callbacks.retain(|e| e.id != id);
        self.cancelled.insert(id);
    }

    fn subscribe(&mut self, kind: RuntimeEventKind, listener: EventListener) -> SubscriptionId {
        let id = SubscriptionId(self.next_id());
        self.listeners.push(ListenerEntry { id, kind, listener });
        id
    }

    fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|l| l.id != id);
    }
}
