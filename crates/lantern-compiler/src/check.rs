use std::fmt;

use lantern_ir::expr::{has_reference, parse_expr, Expr, ExprParseError};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum CheckError {
    #[error("Unknown check name '{name}' in check '{check}'")]
    UnknownName { check: String, name: String },

    #[error("Check '{check}' ({name}) expects {expected} argument(s), got {found}")]
    Arity {
        check: String,
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Check '{check}' has an invalid expression '{text}': {source}")]
    Expression {
        check: String,
        text: String,
        source: ExprParseError,
    },

    #[error("Unknown input effect name '{name}' in '{effect}'")]
    UnknownInputEffect { effect: String, name: String },

    #[error("Edge '{edge}' is a {kind} edge and cannot carry {what}")]
    WrongEdgeKind {
        edge: String,
        kind: &'static str,
        what: &'static str,
    },
}

// ── Names ────────────────────────────────────────────────────────────

/// Closed vocabulary of check names, spelled as in graph descriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CheckName {
    AttrChange,
    AttrComp,
    BackgroundChange,
    Click,
    Function,
    Key,
    Output,
    SpriteColor,
    SpriteTouching,
    VarChange,
    VarComp,
    Expr,
    Probability,
    TimeElapsed,
    TimeBetween,
    TimeAfterEnd,
    NbrOfClones,
    NbrOfVisibleClones,
    TouchingEdge,
    TouchingVerticalEdge,
    TouchingHorizEdge,
    RandomValue,
}

impl CheckName {
    pub const ALL: [CheckName; 22] = [
        CheckName::AttrChange,
        CheckName::AttrComp,
        CheckName::BackgroundChange,
        CheckName::Click,
        CheckName::Function,
        CheckName::Key,
        CheckName::Output,
        CheckName::SpriteColor,
        CheckName::SpriteTouching,
        CheckName::VarChange,
        CheckName::VarComp,
        CheckName::Expr,
        CheckName::Probability,
        CheckName::TimeElapsed,
        CheckName::TimeBetween,
        CheckName::TimeAfterEnd,
        CheckName::NbrOfClones,
        CheckName::NbrOfVisibleClones,
        CheckName::TouchingEdge,
        CheckName::TouchingVerticalEdge,
        CheckName::TouchingHorizEdge,
        CheckName::RandomValue,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CheckName::AttrChange => "AttrChange",
            CheckName::AttrComp => "AttrComp",
            CheckName::BackgroundChange => "BackgroundChange",
            CheckName::Click => "Click",
            CheckName::Function => "Function",
            CheckName::Key => "Key",
            CheckName::Output => "Output",
            CheckName::SpriteColor => "SpriteColor",
            CheckName::SpriteTouching => "SpriteTouching",
            CheckName::VarChange => "VarChange",
            CheckName::VarComp => "VarComp",
            CheckName::Expr => "Expr",
            CheckName::Probability => "Probability",
            CheckName::TimeElapsed => "TimeElapsed",
            CheckName::TimeBetween => "TimeBetween",
            CheckName::TimeAfterEnd => "TimeAfterEnd",
            CheckName::NbrOfClones => "NbrOfClones",
            CheckName::NbrOfVisibleClones => "NbrOfVisibleClones",
            CheckName::TouchingEdge => "TouchingEdge",
            CheckName::TouchingVerticalEdge => "TouchingVerticalEdge",
            CheckName::TouchingHorizEdge => "TouchingHorizEdge",
            CheckName::RandomValue => "RandomValue",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|n| n.as_str() == name)
    }

    pub fn arity(self) -> usize {
        match self {
            CheckName::BackgroundChange
            | CheckName::Click
            | CheckName::Function
            | CheckName::Key
            | CheckName::Expr
            | CheckName::Probability
            | CheckName::TimeElapsed
            | CheckName::TimeBetween
            | CheckName::TimeAfterEnd
            | CheckName::TouchingEdge
            | CheckName::TouchingVerticalEdge
            | CheckName::TouchingHorizEdge => 1,
            CheckName::Output | CheckName::SpriteTouching | CheckName::RandomValue => 2,
            CheckName::AttrChange
            | CheckName::VarChange
            | CheckName::NbrOfClones
            | CheckName::NbrOfVisibleClones => 3,
            CheckName::AttrComp | CheckName::VarComp | CheckName::SpriteColor => 4,
        }
    }
}

impl fmt::Display for CheckName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Which stage borders a touching-edge check looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeAxis {
    Any,
    /// Left or right border.
    Vertical,
    /// Top or bottom border.
    Horizontal,
}

// ── Typed arguments ──────────────────────────────────────────────────

/// Text asserted by an `Output` check.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputText {
    Literal(String),
    Expression(Expr),
}

/// A check with its arguments split into named fields.
///
/// Operators, numbers and names stay textual here; they are validated when
/// the check is bound to a running program.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckKind {
    AttrChange {
        sprite: String,
        attribute: String,
        change: String,
    },
    AttrComp {
        sprite: String,
        attribute: String,
        comparison: String,
        value: String,
    },
    BackgroundChange {
        backdrop: String,
    },
    Click {
        sprite: String,
    },
    Function {
        expr: Expr,
    },
    Key {
        key: String,
    },
    Output {
        sprite: String,
        text: OutputText,
    },
    SpriteColor {
        sprite: String,
        r: String,
        g: String,
        b: String,
    },
    SpriteTouching {
        sprite: String,
        other: String,
    },
    VarChange {
        sprite: String,
        variable: String,
        change: String,
    },
    VarComp {
        sprite: String,
        variable: String,
        comparison: String,
        value: String,
    },
    Expr {
        expr: Expr,
    },
    Probability {
        probability: String,
    },
    TimeElapsed {
        millis: String,
    },
    TimeBetween {
        millis: String,
    },
    TimeAfterEnd {
        millis: String,
    },
    NbrOfClones {
        sprite: String,
        comparison: String,
        value: String,
        visible_only: bool,
    },
    TouchingEdge {
        sprite: String,
        axis: EdgeAxis,
    },
    RandomValue {
        sprite: String,
        member: String,
    },
}

impl CheckKind {
    fn from_args(check_id: &str, name: CheckName, args: &[String]) -> Result<Self, CheckError> {
        if args.len() != name.arity() {
            return Err(CheckError::Arity {
                check: check_id.to_string(),
                name: name.to_string(),
                expected: name.arity(),
                found: args.len(),
            });
        }
        let a = |i: usize| args[i].clone();
        let expr = |text: &str| {
            parse_expr(text).map_err(|source| CheckError::Expression {
                check: check_id.to_string(),
                text: text.to_string(),
                source,
            })
        };
        let kind = match name {
            CheckName::AttrChange => CheckKind::AttrChange {
                sprite: a(0),
                attribute: a(1),
                change: a(2),
            },
            CheckName::AttrComp => CheckKind::AttrComp {
                sprite: a(0),
                attribute: a(1),
                comparison: a(2),
                value: a(3),
            },
            CheckName::BackgroundChange => CheckKind::BackgroundChange { backdrop: a(0) },
            CheckName::Click => CheckKind::Click { sprite: a(0) },
            CheckName::Function => CheckKind::Function { expr: expr(&args[0])? },
            CheckName::Key => CheckKind::Key { key: a(0) },
            CheckName::Output => {
                let text = if has_reference(&args[1]) {
                    OutputText::Expression(expr(&args[1])?)
                } else {
                    OutputText::Literal(a(1))
                };
                CheckKind::Output { sprite: a(0), text }
            }
            CheckName::SpriteColor => CheckKind::SpriteColor {
                sprite: a(0),
                r: a(1),
                g: a(2),
                b: a(3),
            },
            CheckName::SpriteTouching => CheckKind::SpriteTouching {
                sprite: a(0),
                other: a(1),
            },
            CheckName::VarChange => CheckKind::VarChange {
                sprite: a(0),
                variable: a(1),
                change: a(2),
            },
            CheckName::VarComp => CheckKind::VarComp {
                sprite: a(0),
                variable: a(1),
                comparison: a(2),
                value: a(3),
            },
            CheckName::Expr => CheckKind::Expr { expr: expr(&args[0])? },
            CheckName::Probability => CheckKind::Probability { probability: a(0) },
            CheckName::TimeElapsed => CheckKind::TimeElapsed { millis: a(0) },
            CheckName::TimeBetween => CheckKind::TimeBetween { millis: a(0) },
            CheckName::TimeAfterEnd => CheckKind::TimeAfterEnd { millis: a(0) },
            CheckName::NbrOfClones | CheckName::NbrOfVisibleClones => CheckKind::NbrOfClones {
                sprite: a(0),
                comparison: a(1),
                value: a(2),
                visible_only: name == CheckName::NbrOfVisibleClones,
            },
            CheckName::TouchingEdge => CheckKind::TouchingEdge {
                sprite: a(0),
                axis: EdgeAxis::Any,
            },
            CheckName::TouchingVerticalEdge => CheckKind::TouchingEdge {
                sprite: a(0),
                axis: EdgeAxis::Vertical,
            },
            CheckName::TouchingHorizEdge => CheckKind::TouchingEdge {
                sprite: a(0),
                axis: EdgeAxis::Horizontal,
            },
            CheckName::RandomValue => CheckKind::RandomValue {
                sprite: a(0),
                member: a(1),
            },
        };
        Ok(kind)
    }
}

// ── Checks ───────────────────────────────────────────────────────────

/// Shape shared by conditions and effects.
#[derive(Debug, Clone, PartialEq)]
pub struct Check {
    pub id: String,
    pub edge_id: String,
    pub name: CheckName,
    pub args: Vec<String>,
    pub negated: bool,
    pub kind: CheckKind,
}

impl Check {
    /// Validate name, arity and expression syntax.
    pub fn new(
        id: impl Into<String>,
        edge_id: impl Into<String>,
        name: &str,
        args: Vec<String>,
        negated: bool,
    ) -> Result<Self, CheckError> {
        let id = id.into();
        let check_name = CheckName::from_name(name).ok_or_else(|| CheckError::UnknownName {
            check: id.clone(),
            name: name.to_string(),
        })?;
        let kind = CheckKind::from_args(&id, check_name, &args)?;
        Ok(Self {
            id,
            edge_id: edge_id.into(),
            name: check_name,
            args,
            negated,
            kind,
        })
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negated {
            write!(f, "!")?;
        }
        write!(f, "{}({})", self.name, self.args.join(","))
    }
}

/// A guard evaluated before an edge is taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub check: Check,
}

impl Condition {
    pub fn new(check: Check) -> Self {
        Self { check }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.check.fmt(f)
    }
}

/// An assertion evaluated after an edge was taken.
#[derive(Debug, Clone, PartialEq)]
pub struct Effect {
    pub check: Check,
}

impl Effect {
    pub fn new(check: Check) -> Self {
        Self { check }
    }

    /// Whether both effects can never hold at the same time.
    pub fn contradicts(&self, other: &Effect) -> bool {
        crate::contradiction::contradicts(&self.check, &other.check)
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.check.fmt(f)
    }
}

// ── Input effects ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum InputEffectKind {
    ClickSprite { sprite: String },
    ClickStage,
    Key { key: String },
    MouseDown { down: String },
    MouseMove { x: String, y: String },
    Text { answer: String },
}

/// Input injected into the program when a user edge is taken.
#[derive(Debug, Clone, PartialEq)]
pub struct InputEffect {
    pub id: String,
    pub edge_id: String,
    pub name: String,
    pub args: Vec<String>,
    pub kind: InputEffectKind,
}

impl InputEffect {
    pub fn new(
        id: impl Into<String>,
        edge_id: impl Into<String>,
        name: &str,
        args: Vec<String>,
    ) -> Result<Self, CheckError> {
        let id = id.into();
        let expected = match name {
            "InputClickStage" => 0,
            "InputClickSprite" | "InputKey" | "InputMouseDown" | "InputText" => 1,
            "InputMouseMove" => 2,
            _ => {
                return Err(CheckError::UnknownInputEffect {
                    effect: id,
                    name: name.to_string(),
                })
            }
        };
        if args.len() != expected {
            return Err(CheckError::Arity {
                check: id,
                name: name.to_string(),
                expected,
                found: args.len(),
            });
        }
        let kind = match name {
            "InputClickStage" => InputEffectKind::ClickStage,
            "InputClickSprite" => InputEffectKind::ClickSprite {
                sprite: args[0].clone(),
            },
            "InputKey" => InputEffectKind::Key { key: args[0].clone() },
            "InputMouseDown" => InputEffectKind::MouseDown { down: args[0].clone() },
            "InputText" => InputEffectKind::Text {
                answer: args[0].clone(),
            },
            _ => InputEffectKind::MouseMove {
                x: args[0].clone(),
                y: args[1].clone(),
            },
        };
        Ok(Self {
            id,
            edge_id: edge_id.into(),
            name: name.to_string(),
            args,
            kind,
        })
    }
}

impl fmt::Display for InputEffect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.args.join(","))
    }
}
