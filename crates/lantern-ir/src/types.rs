use std::fmt;

use serde::{Deserialize, Serialize};

// ── Graphs ───────────────────────────────────────────────────────────

/// Which phase of a test run a graph takes part in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Usage {
    Program,
    User,
    End,
}

impl fmt::Display for Usage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Usage::Program => write!(f, "program"),
            Usage::User => write!(f, "user"),
            Usage::End => write!(f, "end"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StartNodeIds {
    One(String),
    Many(Vec<String>),
}

impl StartNodeIds {
    pub fn ids(&self) -> Vec<String> {
        match self {
            StartNodeIds::One(id) => vec![id.clone()],
            StartNodeIds::Many(ids) => ids.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub usage: Usage,
    #[serde(default)]
    pub start_node_id: Option<StartNodeIds>,
    #[serde(default)]
    pub stop_node_ids: Vec<String>,
    #[serde(default)]
    pub stop_all_node_ids: Vec<String>,
    #[serde(default)]
    pub node_ids: Vec<String>,
    #[serde(default)]
    pub nodes: Vec<NodeDescription>,
    #[serde(default)]
    pub edges: Vec<EdgeDescription>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeDescription {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub start_node: bool,
    #[serde(default)]
    pub stop_node: bool,
    #[serde(default)]
    pub stop_all_node: bool,
}

// ── Edges ────────────────────────────────────────────────────────────

fn disabled() -> i64 {
    -1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EdgeDescription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub label: Option<String>,
    pub from: String,
    pub to: String,
    #[serde(default = "disabled")]
    pub force_test_after: i64,
    #[serde(default = "disabled")]
    pub force_test_at: i64,
    /// `None` when the field is absent. Validation rejects that.
    #[serde(default)]
    pub conditions: Option<Vec<CheckDescription>>,
    #[serde(default)]
    pub effects: Vec<CheckDescription>,
    #[serde(default)]
    pub input_effects: Vec<CheckDescription>,
}

// ── Checks ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckDescription {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub negated: bool,
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

impl CheckDescription {
    pub fn arg_strings(&self) -> Vec<String> {
        self.args.iter().map(|a| a.to_string()).collect()
    }
}

/// Check arguments may be written as strings, numbers or booleans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArgValue {
    Text(String),
    Number(serde_json::Number),
    Bool(bool),
}

impl fmt::Display for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Text(s) => write!(f, "{s}"),
            ArgValue::Number(n) => write!(f, "{n}"),
            ArgValue::Bool(b) => write!(f, "{b}"),
        }
    }
}
