//! Binding of compiled checks to a running program.
//!
//! Binding resolves sprite, variable and attribute names against the
//! driver once, validates the textual operands, registers whatever event
//! listeners the check needs and returns a [`BoundCheck`]: a predicate plus
//! a [`Trigger`] telling the model whether the check needs polling every
//! step or only when one of its events fired.

use std::fmt;

use rand::Rng;
use regex::{Regex, RegexBuilder};

use lantern_compiler::check::{Check, CheckKind, InputEffect, InputEffectKind, OutputText};
use lantern_compiler::ops::{Change, Comparison};
use lantern_ir::expr::{BinaryOp, Expr, Literal, UnaryOp};

use crate::check_utility::{normalize_key, EventFlags, EventKey, ListenerRegistry};
use crate::driver::{EdgeAxis, InputEvent, RuntimeDriver, SpriteId};
use crate::error::{BindError, EvalError};
use crate::rng::check_rng;
use crate::value::{Attribute, Rgb, Value};

/// Step counts a check may refer to, all measured at evaluation time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timing {
    pub steps_since_start: u64,
    pub steps_since_transition: u64,
    /// `None` until the program has ended.
    pub steps_since_end: Option<u64>,
}

pub struct EvalContext<'a> {
    pub driver: &'a dyn RuntimeDriver,
    pub flags: &'a EventFlags,
    pub timing: Timing,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Trigger {
    /// Evaluated on every step.
    Poll,
    /// Only a candidate when one of these fired during the step.
    Events(Vec<EventKey>),
}

impl Trigger {
    pub fn is_poll(&self) -> bool {
        matches!(self, Trigger::Poll)
    }

    pub fn fired(&self, flags: &EventFlags) -> bool {
        match self {
            Trigger::Poll => false,
            Trigger::Events(keys) => keys.iter().any(|k| flags.fired(k)),
        }
    }
}

type Predicate = Box<dyn FnMut(&EvalContext<'_>) -> Result<bool, EvalError>>;

pub struct BoundCheck {
    pub check_id: String,
    pub trigger: Trigger,
    negated: bool,
    predicate: Predicate,
}

impl BoundCheck {
    /// Evaluate the predicate, applying negation.
    pub fn evaluate(&mut self, ctx: &EvalContext<'_>) -> Result<bool, EvalError> {
        (self.predicate)(ctx).map(|holds| holds != self.negated)
    }

    /// Stand-in for a check that could not be bound.
    pub fn always_false(check_id: &str) -> Self {
        Self {
            check_id: check_id.to_string(),
            trigger: Trigger::Poll,
            negated: false,
            predicate: Box::new(|_| Ok(false)),
        }
    }
}

impl fmt::Debug for BoundCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoundCheck")
            .field("check_id", &self.check_id)
            .field("trigger", &self.trigger)
            .field("negated", &self.negated)
            .finish_non_exhaustive()
    }
}

fn poll<F>(f: F) -> (Trigger, Predicate)
where
    F: FnMut(&EvalContext<'_>) -> Result<bool, EvalError> + 'static,
{
    (Trigger::Poll, Box::new(f))
}

fn on_events<F>(keys: Vec<EventKey>, f: F) -> (Trigger, Predicate)
where
    F: FnMut(&EvalContext<'_>) -> Result<bool, EvalError> + 'static,
{
    (Trigger::Events(keys), Box::new(f))
}

// ── Name resolution ──────────────────────────────────────────────────

/// Matches names literally first, then as an anchored regular expression.
struct NameMatcher {
    literal: String,
    regex: Option<Regex>,
    case_sensitive: bool,
}

impl NameMatcher {
    fn new(pattern: &str, case_sensitive: bool) -> Self {
        let regex = RegexBuilder::new(&format!("^(?:{pattern})$"))
            .case_insensitive(!case_sensitive)
            .build()
            .ok();
        Self {
            literal: pattern.to_string(),
            regex,
            case_sensitive,
        }
    }

    fn literal_match(&self, name: &str) -> bool {
        if self.case_sensitive {
            self.literal == name
        } else {
            self.literal.to_lowercase() == name.to_lowercase()
        }
    }

    fn regex_match(&self, name: &str) -> bool {
        self.regex.as_ref().is_some_and(|re| re.is_match(name))
    }

    /// First candidate matching literally, else the first matching the regex.
    fn find<'a, T>(&self, candidates: &'a [T], name: impl Fn(&T) -> &str) -> Option<&'a T> {
        candidates
            .iter()
            .find(|c| self.literal_match(name(*c)))
            .or_else(|| candidates.iter().find(|c| self.regex_match(name(*c))))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct SpriteRef {
    id: SpriteId,
    name: String,
}

impl SpriteRef {
    fn gone(&self) -> EvalError {
        EvalError::SpriteGone {
            sprite: self.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct VariableRef {
    owner: SpriteRef,
    name: String,
}

impl VariableRef {
    fn read(&self, driver: &dyn RuntimeDriver) -> Result<Value, EvalError> {
        driver.variable(self.owner.id, &self.name).ok_or_else(|| EvalError::VariableGone {
            sprite: self.owner.name.clone(),
            variable: self.name.clone(),
        })
    }
}

// ── Resolved expressions ─────────────────────────────────────────────

#[derive(Debug, Clone)]
enum Operand {
    Const(Value),
    Attr(SpriteRef, Attribute),
    Var(VariableRef),
    Unary(UnaryOp, Box<Operand>),
    Binary(BinaryOp, Box<Operand>, Box<Operand>),
}

fn numeric(v: &Value) -> Result<f64, EvalError> {
    v.as_number().ok_or_else(|| EvalError::NotNumeric { value: v.to_string() })
}

impl Operand {
    fn eval(&self, driver: &dyn RuntimeDriver) -> Result<Value, EvalError> {
        match self {
            Operand::Const(v) => Ok(v.clone()),
            Operand::Attr(sprite, attr) => driver.attribute(sprite.id, *attr).ok_or_else(|| sprite.gone()),
            Operand::Var(var) => var.read(driver),
            Operand::Unary(UnaryOp::Not, inner) => Ok(Value::Bool(!inner.eval(driver)?.truthy())),
            Operand::Unary(UnaryOp::Neg, inner) => Ok(Value::Number(-numeric(&inner.eval(driver)?)?)),
            Operand::Binary(BinaryOp::And, lhs, rhs) => {
                Ok(Value::Bool(lhs.eval(driver)?.truthy() && rhs.eval(driver)?.truthy()))
            }
            Operand::Binary(BinaryOp::Or, lhs, rhs) => {
                Ok(Value::Bool(lhs.eval(driver)?.truthy() || rhs.eval(driver)?.truthy()))
            }
            Operand::Binary(op, lhs, rhs) => {
                let (l, r) = (lhs.eval(driver)?, rhs.eval(driver)?);
                apply_binary(*op, &l, &r)
            }
        }
    }
}

fn apply_binary(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    let value = match op {
        BinaryOp::Eq => Value::Bool(l.loose_eq(r)),
        BinaryOp::Neq => Value::Bool(!l.loose_eq(r)),
        BinaryOp::Add => match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => Value::Number(a + b),
            _ => Value::Text(format!("{l}{r}")),
        },
        BinaryOp::Lt => Value::Bool(numeric(l)? < numeric(r)?),
        BinaryOp::Lte => Value::Bool(numeric(l)? <= numeric(r)?),
        BinaryOp::Gt => Value::Bool(numeric(l)? > numeric(r)?),
        BinaryOp::Gte => Value::Bool(numeric(l)? >= numeric(r)?),
        BinaryOp::Sub => Value::Number(numeric(l)? - numeric(r)?),
        BinaryOp::Mul => Value::Number(numeric(l)? * numeric(r)?),
        BinaryOp::Div => Value::Number(numeric(l)? / numeric(r)?),
        BinaryOp::Rem => Value::Number(numeric(l)? % numeric(r)?),
        BinaryOp::And => Value::Bool(l.truthy() && r.truthy()),
        BinaryOp::Or => Value::Bool(l.truthy() || r.truthy()),
    };
    Ok(value)
}

fn compare(op: Comparison, actual: &Value, expected: &Value) -> Result<bool, EvalError> {
    match op {
        Comparison::Eq => Ok(actual.loose_eq(expected)),
        Comparison::Neq => Ok(!actual.loose_eq(expected)),
        _ => Ok(op.holds(numeric(actual)?, numeric(expected)?)),
    }
}

fn change_holds(change: Change, old: &Value, new: &Value) -> Result<bool, EvalError> {
    if change == Change::Unchanged {
        return Ok(old.loose_eq(new));
    }
    Ok(change.admits(numeric(new)? - numeric(old)?))
}

/// A position change blocked by the stage border still counts as the
/// asserted movement.
fn pinned(driver: &dyn RuntimeDriver, sprite: SpriteId, attr: Attribute, change: Change, old: &Value, new: &Value) -> bool {
    let axis = match attr {
        Attribute::X => EdgeAxis::Vertical,
        Attribute::Y => EdgeAxis::Horizontal,
        _ => return false,
    };
    let moving = match change {
        Change::Increase | Change::Decrease => true,
        Change::By(d) => d != 0.0,
        _ => false,
    };
    let still = matches!((old.as_number(), new.as_number()), (Some(a), Some(b)) if a == b);
    moving && still && driver.is_touching_edge(sprite, axis)
}

// ── Generator ────────────────────────────────────────────────────────

/// Turns checks into bound predicates for one run.
pub struct CheckGenerator {
    case_sensitive: bool,
    seed: u64,
    sampled: u64,
}

impl CheckGenerator {
    pub fn new(case_sensitive: bool, seed: u64) -> Self {
        Self {
            case_sensitive,
            seed,
            sampled: 0,
        }
    }

    fn sprite(&self, driver: &dyn RuntimeDriver, pattern: &str, check: &str) -> Result<SpriteRef, BindError> {
        let originals: Vec<_> = driver.sprites().into_iter().filter(|s| s.is_original).collect();
        NameMatcher::new(pattern, self.case_sensitive)
            .find(&originals, |s| s.name.as_str())
            .map(|s| SpriteRef {
                id: s.id,
                name: s.name.clone(),
            })
            .ok_or_else(|| BindError::SpriteNotFound {
                check: check.to_string(),
                pattern: pattern.to_string(),
            })
    }

    /// A variable of `owner`, falling back to the stage's globals.
    fn variable(
        &self,
        driver: &dyn RuntimeDriver,
        owner: &SpriteRef,
        pattern: &str,
        check: &str,
    ) -> Result<VariableRef, BindError> {
        let matcher = NameMatcher::new(pattern, self.case_sensitive);
        let mut owners = vec![owner.clone()];
        if let Some(stage) = driver.sprites().into_iter().find(|s| s.is_original && s.name == "Stage") {
            if stage.id != owner.id {
                owners.push(SpriteRef {
                    id: stage.id,
                    name: stage.name,
                });
            }
        }
        for candidate in owners {
            let names = driver.variable_names(candidate.id);
            if let Some(name) = matcher.find(&names, |n| n.as_str()) {
                return Ok(VariableRef {
                    name: name.clone(),
                    owner: candidate,
                });
            }
        }
        Err(BindError::VariableNotFound {
            check: check.to_string(),
            sprite: owner.name.clone(),
            pattern: pattern.to_string(),
        })
    }

    fn member(&self, driver: &dyn RuntimeDriver, sprite: &str, member: &str, check: &str) -> Result<Operand, BindError> {
        let owner = self.sprite(driver, sprite, check)?;
        if let Some(attr) = Attribute::from_name(member) {
            return Ok(Operand::Attr(owner, attr));
        }
        match self.variable(driver, &owner, member, check) {
            Ok(var) => Ok(Operand::Var(var)),
            Err(_) => Err(BindError::MemberNotFound {
                check: check.to_string(),
                sprite: owner.name,
                member: member.to_string(),
            }),
        }
    }

    fn operand(&self, driver: &dyn RuntimeDriver, expr: &Expr, check: &str) -> Result<Operand, BindError> {
        Ok(match expr {
            Expr::Literal(Literal::Bool(b)) => Operand::Const(Value::Bool(*b)),
            Expr::Literal(Literal::Number(n)) => Operand::Const(Value::Number(*n)),
            Expr::Literal(Literal::Text(s)) => Operand::Const(Value::Text(s.clone())),
            Expr::Member { sprite, member } => self.member(driver, sprite, member, check)?,
            Expr::Unary { op, operand } => Operand::Unary(*op, Box::new(self.operand(driver, operand, check)?)),
            Expr::Binary { op, lhs, rhs } => Operand::Binary(
                *op,
                Box::new(self.operand(driver, lhs, check)?),
                Box::new(self.operand(driver, rhs, check)?),
            ),
        })
    }

    /// Bind `check` against the current program state.
    pub fn bind(
        &mut self,
        check: &Check,
        driver: &mut dyn RuntimeDriver,
        registry: &mut ListenerRegistry,
    ) -> Result<BoundCheck, BindError> {
        let id = check.id.as_str();
        let (trigger, predicate) = match &check.kind {
            CheckKind::AttrChange {
                sprite,
                attribute,
                change,
            } => {
                let s = self.sprite(driver, sprite, id)?;
                let attr = parse_attribute(attribute, id)?;
                let change = parse_change(change, id)?;
                poll(move |ctx| {
                    let Some(old) = ctx.driver.previous_attribute(s.id, attr) else {
                        return Ok(true);
                    };
                    let new = ctx.driver.attribute(s.id, attr).ok_or_else(|| s.gone())?;
                    Ok(change_holds(change, &old, &new)? || pinned(ctx.driver, s.id, attr, change, &old, &new))
                })
            }
            CheckKind::AttrComp {
                sprite,
                attribute,
                comparison,
                value,
            } => {
                let s = self.sprite(driver, sprite, id)?;
                let attr = parse_attribute(attribute, id)?;
                let (op, expected) = parse_comparison(comparison, value, id)?;
                poll(move |ctx| {
                    let actual = ctx.driver.attribute(s.id, attr).ok_or_else(|| s.gone())?;
                    compare(op, &actual, &expected)
                })
            }
            CheckKind::BackgroundChange { backdrop } => {
                let expected = Value::Text(backdrop.clone());
                poll(move |ctx| {
                    let (now, before) = (ctx.driver.backdrop(), ctx.driver.previous_backdrop());
                    Ok(now != before && expected.loose_eq(&Value::Text(now)))
                })
            }
            CheckKind::Click { sprite } => {
                let s = self.sprite(driver, sprite, id)?;
                poll(move |ctx| Ok(ctx.driver.is_mouse_down() && ctx.driver.is_touching_mouse(s.id)))
            }
            CheckKind::Function { expr } | CheckKind::Expr { expr } => {
                let operand = self.operand(driver, expr, id)?;
                poll(move |ctx| Ok(operand.eval(ctx.driver)?.truthy()))
            }
            CheckKind::Key { key } => {
                let key = normalize_key(key);
                registry.watch_key(&key);
                on_events(vec![EventKey::Key(key.clone())], move |ctx| {
                    Ok(ctx.flags.is_key_down(&key))
                })
            }
            CheckKind::Output { sprite, text } => {
                let s = self.sprite(driver, sprite, id)?;
                let expected = match text {
                    OutputText::Literal(t) => Operand::Const(Value::Text(t.clone())),
                    OutputText::Expression(e) => self.operand(driver, e, id)?,
                };
                registry.watch_output(s.id, driver);
                on_events(vec![EventKey::Said(s.id)], move |ctx| {
                    let expected = expected.eval(ctx.driver)?.to_string();
                    let current = ctx
                        .driver
                        .attribute(s.id, Attribute::SayText)
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    let shows = |text: &str| !text.is_empty() && text.contains(&expected);
                    Ok(shows(current.as_str()) || ctx.flags.said(s.id).iter().any(|t| shows(t.as_str())))
                })
            }
            CheckKind::SpriteColor { sprite, r, g, b } => {
                let s = self.sprite(driver, sprite, id)?;
                let color = Rgb::new(parse_channel(r, id)?, parse_channel(g, id)?, parse_channel(b, id)?);
                registry.watch_color(s.id, color, driver);
                on_events(vec![EventKey::Moved(s.id), EventKey::Visual(s.id)], move |ctx| {
                    Ok(ctx.flags.is_touching_color(s.id, color, ctx.driver))
                })
            }
            CheckKind::SpriteTouching { sprite, other } => {
                let a = self.sprite(driver, sprite, id)?;
                let b = self.sprite(driver, other, id)?;
                registry.watch_touching(a.id, b.id, driver);
                on_events(vec![EventKey::Moved(a.id), EventKey::Moved(b.id)], move |ctx| {
                    Ok(ctx.flags.are_touching(a.id, b.id, ctx.driver))
                })
            }
            CheckKind::VarChange {
                sprite,
                variable,
                change,
            } => {
                let s = self.sprite(driver, sprite, id)?;
                let var = self.variable(driver, &s, variable, id)?;
                let change = parse_change(change, id)?;
                poll(move |ctx| {
                    let Some(old) = ctx.driver.previous_variable(var.owner.id, &var.name) else {
                        return Ok(true);
                    };
                    change_holds(change, &old, &var.read(ctx.driver)?)
                })
            }
            CheckKind::VarComp {
                sprite,
                variable,
                comparison,
                value,
            } => {
                let s = self.sprite(driver, sprite, id)?;
                let var = self.variable(driver, &s, variable, id)?;
                let (op, expected) = parse_comparison(comparison, value, id)?;
                poll(move |ctx| compare(op, &var.read(ctx.driver)?, &expected))
            }
            CheckKind::Probability { probability } => {
                let p = parse_number(probability, id, "probability")?;
                if !(0.0..=1.0).contains(&p) {
                    return Err(BindError::InvalidNumber {
                        check: id.to_string(),
                        value: probability.clone(),
                        what: "probability",
                    });
                }
                let mut rng = check_rng(self.seed, self.sampled);
                self.sampled += 1;
                poll(move |_| Ok(rng.gen::<f64>() < p))
            }
            CheckKind::TimeElapsed { millis } => {
                let steps = self.steps(driver, millis, id)?;
                poll(move |ctx| Ok(ctx.timing.steps_since_start >= steps))
            }
            CheckKind::TimeBetween { millis } => {
                let steps = self.steps(driver, millis, id)?;
                poll(move |ctx| Ok(ctx.timing.steps_since_transition >= steps))
            }
            CheckKind::TimeAfterEnd { millis } => {
                let steps = self.steps(driver, millis, id)?;
                poll(move |ctx| Ok(ctx.timing.steps_since_end.is_some_and(|n| n >= steps)))
            }
            CheckKind::NbrOfClones {
                sprite,
                comparison,
                value,
                visible_only,
            } => {
                let s = self.sprite(driver, sprite, id)?;
                let op = Comparison::parse(comparison).ok_or_else(|| BindError::UnknownComparison {
                    check: id.to_string(),
                    op: comparison.clone(),
                })?;
                let expected = parse_number(value, id, "clone count")?;
                let visible_only = *visible_only;
                poll(move |ctx| {
                    let count = ctx
                        .driver
                        .sprites()
                        .iter()
                        .filter(|c| !c.is_original && c.name == s.name && (c.visible || !visible_only))
                        .count();
                    Ok(op.holds(count as f64, expected))
                })
            }
            CheckKind::TouchingEdge { sprite, axis } => {
                let s = self.sprite(driver, sprite, id)?;
                let axis = *axis;
                poll(move |ctx| Ok(ctx.driver.is_touching_edge(s.id, axis)))
            }
            CheckKind::RandomValue { sprite, member } => {
                let operand = self.member(driver, sprite, member, id)?;
                let mut last: Option<Value> = None;
                poll(move |ctx| {
                    let value = operand.eval(ctx.driver)?;
                    let changed = last.as_ref().map_or(true, |prev| !prev.loose_eq(&value));
                    last = Some(value);
                    Ok(changed)
                })
            }
        };
        Ok(BoundCheck {
            check_id: check.id.clone(),
            trigger,
            negated: check.negated,
            predicate,
        })
    }

    /// Resolve an input effect to the event it injects.
    pub fn bind_input(&self, input: &InputEffect, driver: &dyn RuntimeDriver) -> Result<InputEvent, BindError> {
        let id = input.id.as_str();
        Ok(match &input.kind {
            InputEffectKind::ClickSprite { sprite } => InputEvent::ClickSprite {
                sprite: self.sprite(driver, sprite, id)?.id,
            },
            InputEffectKind::ClickStage => InputEvent::ClickStage,
            InputEffectKind::Key { key } => InputEvent::Key {
                key: normalize_key(key),
                down: true,
            },
            InputEffectKind::MouseDown { down } => {
                let down = match down.trim().to_lowercase().as_str() {
                    "true" | "1" => true,
                    "false" | "0" => false,
                    _ => {
                        return Err(BindError::InvalidNumber {
                            check: id.to_string(),
                            value: down.clone(),
                            what: "boolean",
                        })
                    }
                };
                InputEvent::MouseDown { down }
            }
            InputEffectKind::MouseMove { x, y } => InputEvent::MouseMove {
                x: parse_number(x, id, "coordinate")?,
                y: parse_number(y, id, "coordinate")?,
            },
            InputEffectKind::Text { answer } => InputEvent::Text { answer: answer.clone() },
        })
    }

    fn steps(&self, driver: &dyn RuntimeDriver, millis: &str, check: &str) -> Result<u64, BindError> {
        let ms = parse_number(millis, check, "duration")?;
        if ms < 0.0 {
            return Err(BindError::InvalidNumber {
                check: check.to_string(),
                value: millis.to_string(),
                what: "duration",
            });
        }
        Ok(driver.time_to_steps(ms))
    }
}

// ── Operand parsing ──────────────────────────────────────────────────

fn parse_number(text: &str, check: &str, what: &'static str) -> Result<f64, BindError> {
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|n| n.is_finite())
        .ok_or_else(|| BindError::InvalidNumber {
            check: check.to_string(),
            value: text.to_string(),
            what,
        })
}

fn parse_channel(text: &str, check: &str) -> Result<u8, BindError> {
    let n = parse_number(text, check, "colour component")?;
    if !(0.0..=255.0).contains(&n) || n.fract() != 0.0 {
        return Err(BindError::ColorOutOfRange {
            check: check.to_string(),
            value: text.to_string(),
        });
    }
    Ok(n as u8)
}

fn parse_attribute(name: &str, check: &str) -> Result<Attribute, BindError> {
    Attribute::from_name(name).ok_or_else(|| BindError::UnknownAttribute {
        check: check.to_string(),
        name: name.to_string(),
    })
}

fn parse_change(text: &str, check: &str) -> Result<Change, BindError> {
    Change::parse(text).ok_or_else(|| BindError::UnknownChange {
        check: check.to_string(),
        change: text.to_string(),
    })
}

/// Operator plus expected value; ordering operators need a number.
fn parse_comparison(op: &str, value: &str, check: &str) -> Result<(Comparison, Value), BindError> {
    let comparison = Comparison::parse(op).ok_or_else(|| BindError::UnknownComparison {
        check: check.to_string(),
        op: op.to_string(),
    })?;
    let expected = match comparison {
        Comparison::Eq | Comparison::Neq => match value.trim().parse::<f64>() {
            Ok(n) if n.is_finite() => Value::Number(n),
            _ => Value::Text(value.to_string()),
        },
        _ => Value::Number(parse_number(value, check, "number")?),
    };
    Ok((comparison, expected))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_matcher_prefers_literal() {
        let names = vec!["a.b".to_string(), "axb".to_string()];
        let m = NameMatcher::new("axb", true);
        assert_eq!(m.find(&names, |n| n.as_str()), Some(&names[1]));
        let m = NameMatcher::new("a.b", true);
        assert_eq!(m.find(&names, |n| n.as_str()), Some(&names[0]));
    }

    #[test]
    fn test_name_matcher_regex_anchored() {
        let names = vec!["Apple2".to_string(), "Apple".to_string()];
        let m = NameMatcher::new("App.*", true);
        assert_eq!(m.find(&names, |n| n.as_str()), Some(&names[0]));
        let m = NameMatcher::new("pple", true);
        assert_eq!(m.find(&names, |n| n.as_str()), None);
    }

    #[test]
    fn test_invalid_regex_falls_back_to_literal() {
        let names = vec!["(".to_string()];
        let m = NameMatcher::new("(", true);
        assert_eq!(m.find(&names, |n| n.as_str()), Some(&names[0]));
    }

    #[test]
    fn test_text_addition_concatenates() {
        let v = apply_binary(BinaryOp::Add, &Value::from("a"), &Value::from(1.0)).unwrap();
        assert_eq!(v, Value::Text("a1".into()));
        assert!(apply_binary(BinaryOp::Sub, &Value::from("a"), &Value::from(1.0)).is_err());
    }

    #[test]
    fn test_comparison_values() {
        let (op, v) = parse_comparison("=", "hello", "c").unwrap();
        assert_eq!(op, Comparison::Eq);
        assert_eq!(v, Value::Text("hello".into()));
        assert!(parse_comparison(">", "hello", "c").is_err());
        assert!(parse_comparison("~", "1", "c").is_err());
    }
}
