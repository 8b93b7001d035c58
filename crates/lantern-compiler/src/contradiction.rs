//! Contradiction relation between effects asserted in the same step.
//!
//! Two effects contradict when no program state can satisfy both. The
//! relation is symmetric and only ever relates checks of the same kind on
//! the same target; anything it cannot decide is treated as consistent.

use crate::check::{Check, CheckKind, CheckName, Effect, OutputText};
use crate::ops::{Change, Comparison};

/// Whether two checks can never hold together, with names matched the way
/// the default case-insensitive binding matches them.
pub fn contradicts(a: &Check, b: &Check) -> bool {
    contradicts_with(a, b, false)
}

/// Whether two checks can never hold together. `case_sensitive` decides how
/// sprite, attribute and variable names are matched; compared values always
/// match loosely, as evaluation does.
pub fn contradicts_with(a: &Check, b: &Check, case_sensitive: bool) -> bool {
    if a.name != b.name {
        return false;
    }
    let same = |x: &str, y: &str| same_name(x, y, case_sensitive);
    // Output text is matched case-sensitively, so it never takes the loose path.
    let loose_args = a.name != CheckName::Output && a.args.len() == b.args.len();
    if a.args == b.args || (loose_args && a.args.iter().zip(&b.args).all(|(x, y)| same(x, y))) {
        // Independent draws may disagree with themselves.
        let sampled = matches!(a.name, CheckName::Probability | CheckName::RandomValue);
        return a.negated != b.negated && !sampled;
    }
    match (&a.kind, &b.kind) {
        (CheckKind::Click { .. }, CheckKind::Click { .. }) => !a.negated && !b.negated,
        (CheckKind::Key { key: x }, CheckKind::Key { key: y }) => {
            x.trim().eq_ignore_ascii_case(y.trim()) && a.negated != b.negated
        }
        (CheckKind::BackgroundChange { backdrop: x }, CheckKind::BackgroundChange { backdrop: y }) => {
            if loose_eq(x, y) {
                a.negated != b.negated
            } else {
                !a.negated && !b.negated
            }
        }
        (
            CheckKind::Output {
                sprite: sa,
                text: OutputText::Literal(ta),
            },
            CheckKind::Output {
                sprite: sb,
                text: OutputText::Literal(tb),
            },
        ) => {
            same(sa, sb)
                && if ta == tb {
                    a.negated != b.negated
                } else {
                    !a.negated && !b.negated
                }
        }
        (
            CheckKind::SpriteTouching { sprite: a1, other: a2 },
            CheckKind::SpriteTouching { sprite: b1, other: b2 },
        ) => same(a1, b2) && same(a2, b1) && a.negated != b.negated,
        (
            CheckKind::AttrChange {
                sprite: sa,
                attribute: ta,
                change: ca,
            },
            CheckKind::AttrChange {
                sprite: sb,
                attribute: tb,
                change: cb,
            },
        ) => same(sa, sb) && ta.trim().eq_ignore_ascii_case(tb.trim()) && changes_contradict(ca, a.negated, cb, b.negated),
        (
            CheckKind::VarChange {
                sprite: sa,
                variable: ta,
                change: ca,
            },
            CheckKind::VarChange {
                sprite: sb,
                variable: tb,
                change: cb,
            },
        ) => same(sa, sb) && same(ta, tb) && changes_contradict(ca, a.negated, cb, b.negated),
        (
            CheckKind::AttrComp {
                sprite: sa,
                attribute: ta,
                comparison: oa,
                value: va,
            },
            CheckKind::AttrComp {
                sprite: sb,
                attribute: tb,
                comparison: ob,
                value: vb,
            },
        ) => {
            same(sa, sb)
                && ta.trim().eq_ignore_ascii_case(tb.trim())
                && comparisons_contradict(oa, va, a.negated, ob, vb, b.negated)
        }
        (
            CheckKind::VarComp {
                sprite: sa,
                variable: ta,
                comparison: oa,
                value: va,
            },
            CheckKind::VarComp {
                sprite: sb,
                variable: tb,
                comparison: ob,
                value: vb,
            },
        ) => same(sa, sb) && same(ta, tb) && comparisons_contradict(oa, va, a.negated, ob, vb, b.negated),
        (
            CheckKind::NbrOfClones {
                sprite: sa,
                comparison: oa,
                value: va,
                ..
            },
            CheckKind::NbrOfClones {
                sprite: sb,
                comparison: ob,
                value: vb,
                ..
            },
        ) => same(sa, sb) && comparisons_contradict(oa, va, a.negated, ob, vb, b.negated),
        _ => false,
    }
}

/// Index pairs `(i, j)`, `i < j`, of mutually contradicting effects.
pub fn find_contradictions(effects: &[&Effect], case_sensitive: bool) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for i in 0..effects.len() {
        for j in (i + 1)..effects.len() {
            if contradicts_with(&effects[i].check, &effects[j].check, case_sensitive) {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

fn same_name(a: &str, b: &str, case_sensitive: bool) -> bool {
    if case_sensitive {
        a == b
    } else {
        a.to_lowercase() == b.to_lowercase()
    }
}

fn number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|n| !n.is_nan())
}

/// Numbers by value, anything else as case-insensitive text.
fn loose_eq(a: &str, b: &str) -> bool {
    match (number(a), number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a.to_lowercase() == b.to_lowercase(),
    }
}

// ── Changes ──────────────────────────────────────────────────────────

/// Admissible signs of a delta: negative, zero, positive.
type Signs = [bool; 3];

enum Admissible {
    Exactly(f64),
    Signs(Signs),
}

fn admissible(change: Change, negated: bool) -> Admissible {
    let signs = match change {
        Change::Increase => [false, false, true],
        Change::Decrease => [true, false, false],
        Change::Unchanged => [false, true, false],
        Change::NotDecreasing => [false, true, true],
        Change::NotIncreasing => [true, true, false],
        Change::By(d) if !negated => return Admissible::Exactly(d),
        Change::By(_) => [true, true, true],
    };
    if negated {
        Admissible::Signs(signs.map(|s| !s))
    } else {
        Admissible::Signs(signs)
    }
}

fn sign_index(d: f64) -> usize {
    if d < 0.0 {
        0
    } else if d == 0.0 {
        1
    } else {
        2
    }
}

fn changes_contradict(a: &str, a_negated: bool, b: &str, b_negated: bool) -> bool {
    let (Some(ca), Some(cb)) = (Change::parse(a), Change::parse(b)) else {
        return false;
    };
    match (admissible(ca, a_negated), admissible(cb, b_negated)) {
        (Admissible::Exactly(x), Admissible::Exactly(y)) => (x - y).abs() > 1e-9,
        (Admissible::Exactly(d), Admissible::Signs(s)) | (Admissible::Signs(s), Admissible::Exactly(d)) => {
            !s[sign_index(d)]
        }
        (Admissible::Signs(x), Admissible::Signs(y)) => !(0..3).any(|i| x[i] && y[i]),
    }
}

// ── Comparisons ──────────────────────────────────────────────────────

enum Constraint {
    Point(f64),
    Not(f64),
    Lower { bound: f64, strict: bool },
    Upper { bound: f64, strict: bool },
}

impl Constraint {
    fn new(op: Comparison, v: f64) -> Self {
        match op {
            Comparison::Eq => Constraint::Point(v),
            Comparison::Neq => Constraint::Not(v),
            Comparison::Gt => Constraint::Lower { bound: v, strict: true },
            Comparison::Gte => Constraint::Lower { bound: v, strict: false },
            Comparison::Lt => Constraint::Upper { bound: v, strict: true },
            Comparison::Lte => Constraint::Upper { bound: v, strict: false },
        }
    }

    fn admits(&self, x: f64) -> bool {
        match *self {
            Constraint::Point(v) => x == v,
            Constraint::Not(v) => x != v,
            Constraint::Lower { bound, strict } => x > bound || (!strict && x == bound),
            Constraint::Upper { bound, strict } => x < bound || (!strict && x == bound),
        }
    }
}

fn disjoint(a: &Constraint, b: &Constraint) -> bool {
    match (a, b) {
        (Constraint::Point(v), other) | (other, Constraint::Point(v)) => !other.admits(*v),
        (
            Constraint::Lower { bound: lo, strict: ls },
            Constraint::Upper { bound: hi, strict: hs },
        )
        | (
            Constraint::Upper { bound: hi, strict: hs },
            Constraint::Lower { bound: lo, strict: ls },
        ) => lo > hi || (lo == hi && (*ls || *hs)),
        _ => false,
    }
}

fn comparisons_contradict(
    a_op: &str,
    a_value: &str,
    a_negated: bool,
    b_op: &str,
    b_value: &str,
    b_negated: bool,
) -> bool {
    let (Some(mut oa), Some(mut ob)) = (Comparison::parse(a_op), Comparison::parse(b_op)) else {
        return false;
    };
    if a_negated {
        oa = oa.negate();
    }
    if b_negated {
        ob = ob.negate();
    }
    match (number(a_value), number(b_value)) {
        (Some(va), Some(vb)) => disjoint(&Constraint::new(oa, va), &Constraint::new(ob, vb)),
        // Textual values only support equality.
        _ => match (oa, ob) {
            (Comparison::Eq, Comparison::Eq) => !loose_eq(a_value, b_value),
            (Comparison::Eq, Comparison::Neq) | (Comparison::Neq, Comparison::Eq) => loose_eq(a_value, b_value),
            _ => false,
        },
    }
}
