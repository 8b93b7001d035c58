use std::fmt;

use serde::{Deserialize, Serialize};

/// A value read from the running program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    /// Numeric reading; numeric text counts, booleans do not.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Number(_) | Value::Bool(_) => None,
            Value::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    None
                } else {
                    s.parse::<f64>().ok().filter(|n| !n.is_nan())
                }
            }
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Text(s) if s.eq_ignore_ascii_case("true") => Some(true),
            Value::Text(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    /// Equality as the block language sees it: numbers by value, booleans
    /// by truth, everything else as case-insensitive text.
    pub fn loose_eq(&self, other: &Value) -> bool {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a == b;
        }
        if let (Some(a), Some(b)) = (self.as_bool(), other.as_bool()) {
            return a == b;
        }
        self.to_string().to_lowercase() == other.to_string().to_lowercase()
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty() && !s.eq_ignore_ascii_case("false") && s != "0",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Value::Number(n) => write!(f, "{n}"),
            Value::Text(s) => write!(f, "{s}"),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

/// Observable sprite attributes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Attribute {
    X,
    Y,
    Direction,
    Visible,
    Size,
    Costume,
    Volume,
    LayerOrder,
    SayText,
    RotationStyle,
}

impl Attribute {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "x" => Some(Attribute::X),
            "y" => Some(Attribute::Y),
            "direction" => Some(Attribute::Direction),
            "visible" => Some(Attribute::Visible),
            "size" => Some(Attribute::Size),
            "costume" | "currentcostume" | "costumename" => Some(Attribute::Costume),
            "volume" => Some(Attribute::Volume),
            "layerorder" => Some(Attribute::LayerOrder),
            "saytext" => Some(Attribute::SayText),
            "rotationstyle" => Some(Attribute::RotationStyle),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Attribute::X => "x",
            Attribute::Y => "y",
            Attribute::Direction => "direction",
            Attribute::Visible => "visible",
            Attribute::Size => "size",
            Attribute::Costume => "costume",
            Attribute::Volume => "volume",
            Attribute::LayerOrder => "layerOrder",
            Attribute::SayText => "sayText",
            Attribute::RotationStyle => "rotationStyle",
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loose_eq_coercions() {
        assert!(Value::from("10").loose_eq(&Value::from(10.0)));
        assert!(Value::from("TRUE").loose_eq(&Value::from(true)));
        assert!(Value::from("Apple").loose_eq(&Value::from("apple")));
        assert!(!Value::from("10").loose_eq(&Value::from("10a")));
    }

    #[test]
    fn test_integral_numbers_display_without_fraction() {
        assert_eq!(Value::from(3.0).to_string(), "3");
        assert_eq!(Value::from(2.5).to_string(), "2.5");
    }
}
