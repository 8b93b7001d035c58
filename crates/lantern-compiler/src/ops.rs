use std::fmt;

use serde::{Deserialize, Serialize};

/// Comparison operator of `AttrComp`, `VarComp` and the clone-count checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Comparison {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl Comparison {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "=" | "==" => Some(Comparison::Eq),
            "!=" => Some(Comparison::Neq),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Lte),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Gte),
            _ => None,
        }
    }

    /// The operator that holds exactly when `self` does not.
    pub fn negate(self) -> Self {
        match self {
            Comparison::Eq => Comparison::Neq,
            Comparison::Neq => Comparison::Eq,
            Comparison::Lt => Comparison::Gte,
            Comparison::Lte => Comparison::Gt,
            Comparison::Gt => Comparison::Lte,
            Comparison::Gte => Comparison::Lt,
        }
    }

    pub fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Comparison::Eq => lhs == rhs,
            Comparison::Neq => lhs != rhs,
            Comparison::Lt => lhs < rhs,
            Comparison::Lte => lhs <= rhs,
            Comparison::Gt => lhs > rhs,
            Comparison::Gte => lhs >= rhs,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Comparison::Eq => "=",
            Comparison::Neq => "!=",
            Comparison::Lt => "<",
            Comparison::Lte => "<=",
            Comparison::Gt => ">",
            Comparison::Gte => ">=",
        };
        write!(f, "{s}")
    }
}

/// Expected change of a value between the previous and the current step.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Change {
    Increase,
    Decrease,
    Unchanged,
    NotDecreasing,
    NotIncreasing,
    By(f64),
}

impl Change {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "+" | "++" => Some(Change::Increase),
            "-" | "--" => Some(Change::Decrease),
            "=" | "==" => Some(Change::Unchanged),
            "+=" => Some(Change::NotDecreasing),
            "-=" => Some(Change::NotIncreasing),
            other => {
                let digits = other.strip_prefix('+').unwrap_or(other);
                digits.parse::<f64>().ok().filter(|d| d.is_finite()).map(Change::By)
            }
        }
    }

    /// Whether an observed delta satisfies this change.
    pub fn admits(self, delta: f64) -> bool {
        match self {
            Change::Increase => delta > 0.0,
            Change::Decrease => delta < 0.0,
            Change::Unchanged => delta == 0.0,
            Change::NotDecreasing => delta >= 0.0,
            Change::NotIncreasing => delta <= 0.0,
            Change::By(d) => (delta - d).abs() < 1e-9,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_parse_variants() {
        assert_eq!(Change::parse("++"), Some(Change::Increase));
        assert_eq!(Change::parse("-="), Some(Change::NotIncreasing));
        assert_eq!(Change::parse("+5"), Some(Change::By(5.0)));
        assert_eq!(Change::parse("-2.5"), Some(Change::By(-2.5)));
        assert_eq!(Change::parse("up"), None);
    }

    #[test]
    fn test_comparison_negate_is_involution() {
        for op in [
            Comparison::Eq,
            Comparison::Neq,
            Comparison::Lt,
            Comparison::Lte,
            Comparison::Gt,
            Comparison::Gte,
        ] {
            assert_eq!(op.negate().negate(), op);
            assert_ne!(op.holds(1.0, 2.0), op.negate().holds(1.0, 2.0));
        }
    }
}
