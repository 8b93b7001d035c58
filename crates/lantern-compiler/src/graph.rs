use std::collections::HashMap;
use std::fmt::Write as _;

use lantern_ir::types::Usage;

use crate::check::{CheckError, Condition, Effect, InputEffect};

/// Threshold value meaning "never force".
pub const FORCE_DISABLED: i64 = -1;

/// What taking an edge does besides moving the model.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeActions {
    /// Program edges assert effects on the observed program.
    Program(Vec<Effect>),
    /// User edges inject input into the program.
    User(Vec<InputEffect>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelEdge {
    pub id: String,
    pub label: Option<String>,
    pub graph_id: String,
    pub from: String,
    pub to: String,
    pub conditions: Vec<Condition>,
    pub actions: EdgeActions,
    pub force_test_after: i64,
    pub force_test_at: i64,
}

impl ModelEdge {
    pub fn program(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::with_actions(id, graph_id, from, to, EdgeActions::Program(Vec::new()))
    }

    pub fn user(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self::with_actions(id, graph_id, from, to, EdgeActions::User(Vec::new()))
    }

    fn with_actions(
        id: impl Into<String>,
        graph_id: impl Into<String>,
        from: impl Into<String>,
        to: impl Into<String>,
        actions: EdgeActions,
    ) -> Self {
        Self {
            id: id.into(),
            label: None,
            graph_id: graph_id.into(),
            from: from.into(),
            to: to.into(),
            conditions: Vec::new(),
            actions,
            force_test_after: FORCE_DISABLED,
            force_test_at: FORCE_DISABLED,
        }
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.conditions.push(condition);
    }

    pub fn add_effect(&mut self, effect: Effect) -> Result<(), CheckError> {
        match &mut self.actions {
            EdgeActions::Program(effects) => {
                effects.push(effect);
                Ok(())
            }
            EdgeActions::User(_) => Err(CheckError::WrongEdgeKind {
                edge: self.id.clone(),
                kind: "user",
                what: "effects",
            }),
        }
    }

    pub fn add_input_effect(&mut self, input: InputEffect) -> Result<(), CheckError> {
        match &mut self.actions {
            EdgeActions::User(inputs) => {
                inputs.push(input);
                Ok(())
            }
            EdgeActions::Program(_) => Err(CheckError::WrongEdgeKind {
                edge: self.id.clone(),
                kind: "program",
                what: "input effects",
            }),
        }
    }

    pub fn effects(&self) -> &[Effect] {
        match &self.actions {
            EdgeActions::Program(effects) => effects,
            EdgeActions::User(_) => &[],
        }
    }

    pub fn input_effects(&self) -> &[InputEffect] {
        match &self.actions {
            EdgeActions::User(inputs) => inputs,
            EdgeActions::Program(_) => &[],
        }
    }

    /// Human-readable trace line, e.g. `'e1': [0] Function(true) => [0] Key(space)`.
    pub fn describe(&self) -> String {
        let mut out = format!("'{}':", self.id);
        for (i, c) in self.conditions.iter().enumerate() {
            let _ = write!(out, " [{i}] {c}");
        }
        let actions: Vec<String> = match &self.actions {
            EdgeActions::Program(effects) => effects.iter().map(|e| e.to_string()).collect(),
            EdgeActions::User(inputs) => inputs.iter().map(|e| e.to_string()).collect(),
        };
        if !actions.is_empty() {
            out.push_str(" =>");
            for (i, a) in actions.iter().enumerate() {
                let _ = write!(out, " [{i}] {a}");
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModelNode {
    pub id: String,
    pub label: Option<String>,
    /// Outgoing edges in declaration order.
    pub edges: Vec<ModelEdge>,
    pub is_start: bool,
    pub is_stop: bool,
    pub is_stop_all: bool,
}

impl ModelNode {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            label: None,
            edges: Vec::new(),
            is_start: false,
            is_stop: false,
            is_stop_all: false,
        }
    }
}

/// One behavior graph. Immutable once loaded.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelGraph {
    pub id: String,
    pub label: Option<String>,
    pub usage: Usage,
    nodes: Vec<ModelNode>,
    index: HashMap<String, usize>,
    start: usize,
}

impl ModelGraph {
    /// Assemble a graph from nodes whose edges are already attached.
    /// Returns `None` unless exactly one node is flagged as start node.
    pub fn new(id: String, label: Option<String>, usage: Usage, nodes: Vec<ModelNode>) -> Option<Self> {
        let mut starts = nodes.iter().enumerate().filter(|(_, n)| n.is_start);
        let (start, _) = starts.next()?;
        if starts.next().is_some() {
            return None;
        }
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();
        Some(Self {
            id,
            label,
            usage,
            nodes,
            index,
            start,
        })
    }

    pub fn node(&self, id: &str) -> Option<&ModelNode> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn nodes(&self) -> &[ModelNode] {
        &self.nodes
    }

    pub fn start_node(&self) -> &ModelNode {
        &self.nodes[self.start]
    }

    pub fn edges(&self) -> impl Iterator<Item = &ModelEdge> {
        self.nodes.iter().flat_map(|n| n.edges.iter())
    }

    pub fn edge(&self, id: &str) -> Option<&ModelEdge> {
        self.edges().find(|e| e.id == id)
    }

    pub fn edge_ids(&self) -> Vec<String> {
        self.edges().map(|e| e.id.clone()).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.edges.len()).sum()
    }
}
