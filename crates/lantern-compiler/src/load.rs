use std::collections::{HashMap, HashSet};
use std::fmt;

use lantern_ir::parse::{parse_graph_set, ParseError};
use lantern_ir::types::{EdgeDescription, GraphDescription, Usage};

use crate::check::{Check, CheckError, Condition, Effect, InputEffect};
use crate::graph::{ModelEdge, ModelGraph, ModelNode};
use crate::validate::{validate_graphs, ValidationError};

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("Validation errors: {}", .0.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; "))]
    Validation(Vec<ValidationError>),

    #[error("Check error: {0}")]
    Check(#[from] CheckError),
}

/// Non-fatal findings of the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadWarning {
    RenamedGraph { from: String, to: String },
    RenamedNode { graph: String, from: String, to: String },
    RenamedEdge { graph: String, from: String, to: String },
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadWarning::RenamedGraph { from, to } => {
                write!(f, "Duplicate graph id '{from}' renamed to '{to}'")
            }
            LoadWarning::RenamedNode { graph, from, to } => {
                write!(f, "Duplicate node id '{from}' in graph '{graph}' renamed to '{to}'")
            }
            LoadWarning::RenamedEdge { graph, from, to } => {
                write!(f, "Duplicate edge id '{from}' in graph '{graph}' renamed to '{to}'")
            }
        }
    }
}

/// A loaded graph set, in description order.
#[derive(Debug, Clone)]
pub struct LoadedGraphs {
    pub graphs: Vec<ModelGraph>,
    pub warnings: Vec<LoadWarning>,
}

impl LoadedGraphs {
    pub fn by_usage(&self, usage: Usage) -> impl Iterator<Item = &ModelGraph> {
        self.graphs.iter().filter(move |g| g.usage == usage)
    }
}

// ── Normalization ────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub(crate) struct NodeDecl {
    pub id: String,
    pub label: Option<String>,
    pub start: bool,
    pub stop: bool,
    pub stop_all: bool,
}

/// A graph description with ids assigned and deduplicated.
#[derive(Debug, Clone)]
pub struct NormalizedGraph {
    pub(crate) id: String,
    pub(crate) label: Option<String>,
    pub(crate) usage: Usage,
    pub(crate) nodes: Vec<NodeDecl>,
    pub(crate) start_ids: Vec<String>,
    pub(crate) stop_ids: Vec<String>,
    pub(crate) stop_all_ids: Vec<String>,
    pub(crate) edges: Vec<(String, EdgeDescription)>,
}

/// `base` if unused, else `base_n` with the smallest free `n >= 1`.
fn unique_id(base: &str, used: &mut HashSet<String>) -> String {
    let id = if used.contains(base) {
        (1..)
            .map(|n| format!("{base}_{n}"))
            .find(|candidate| !used.contains(candidate))
            .unwrap_or_else(|| base.to_string())
    } else {
        base.to_string()
    };
    used.insert(id.clone());
    id
}

fn normalize(
    index: usize,
    desc: GraphDescription,
    graph_ids: &mut HashSet<String>,
    warnings: &mut Vec<LoadWarning>,
) -> NormalizedGraph {
    let base = desc.id.clone().unwrap_or_else(|| format!("graph{index}"));
    let id = unique_id(&base, graph_ids);
    if id != base {
        warnings.push(LoadWarning::RenamedGraph {
            from: base,
            to: id.clone(),
        });
    }

    let mut used = HashSet::new();
    let mut nodes: Vec<NodeDecl> = Vec::new();
    // Ids declared by `nodeIds` that a `nodes` entry may still merge into.
    let mut bare: HashMap<String, usize> = HashMap::new();
    for node_id in &desc.node_ids {
        let uid = unique_id(node_id, &mut used);
        if uid == *node_id {
            bare.insert(uid.clone(), nodes.len());
        } else {
            warnings.push(LoadWarning::RenamedNode {
                graph: id.clone(),
                from: node_id.clone(),
                to: uid.clone(),
            });
        }
        nodes.push(NodeDecl {
            id: uid,
            label: None,
            start: false,
            stop: false,
            stop_all: false,
        });
    }
    for node in &desc.nodes {
        let decl = match bare.remove(&node.id) {
            Some(i) => &mut nodes[i],
            None => {
                let uid = unique_id(&node.id, &mut used);
                if uid != node.id {
                    warnings.push(LoadWarning::RenamedNode {
                        graph: id.clone(),
                        from: node.id.clone(),
                        to: uid.clone(),
                    });
                }
                nodes.push(NodeDecl {
                    id: uid,
                    label: None,
                    start: false,
                    stop: false,
                    stop_all: false,
                });
                let last = nodes.len() - 1;
                &mut nodes[last]
            }
        };
        decl.label = node.label.clone().or(decl.label.take());
        decl.start |= node.start_node;
        decl.stop |= node.stop_node || node.stop_all_node;
        decl.stop_all |= node.stop_all_node;
    }

    let start_ids = desc.start_node_id.as_ref().map(|s| s.ids()).unwrap_or_default();
    for decl in nodes.iter_mut() {
        if start_ids.contains(&decl.id) {
            decl.start = true;
        }
        if desc.stop_node_ids.contains(&decl.id) {
            decl.stop = true;
        }
        if desc.stop_all_node_ids.contains(&decl.id) {
            decl.stop = true;
            decl.stop_all = true;
        }
    }

    let mut edge_ids = HashSet::new();
    let edges = desc
        .edges
        .into_iter()
        .enumerate()
        .map(|(i, edge)| {
            let base = edge.id.clone().unwrap_or_else(|| format!("{id}-edge{i}"));
            let uid = unique_id(&base, &mut edge_ids);
            if uid != base {
                warnings.push(LoadWarning::RenamedEdge {
                    graph: id.clone(),
                    from: base,
                    to: uid.clone(),
                });
            }
            (uid, edge)
        })
        .collect();

    NormalizedGraph {
        id,
        label: desc.label,
        usage: desc.usage,
        nodes,
        start_ids,
        stop_ids: desc.stop_node_ids,
        stop_all_ids: desc.stop_all_node_ids,
        edges,
    }
}

// ── Building ─────────────────────────────────────────────────────────

fn build_edge(graph: &NormalizedGraph, edge_id: &str, desc: &EdgeDescription) -> Result<ModelEdge, CheckError> {
    let mut edge = match graph.usage {
        Usage::User => ModelEdge::user(edge_id, &graph.id, &desc.from, &desc.to),
        Usage::Program | Usage::End => ModelEdge::program(edge_id, &graph.id, &desc.from, &desc.to),
    };
    edge.label = desc.label.clone();
    edge.force_test_after = desc.force_test_after;
    edge.force_test_at = desc.force_test_at;

    for (i, c) in desc.conditions.iter().flatten().enumerate() {
        let id = c.id.clone().unwrap_or_else(|| format!("{edge_id}-c{i}"));
        let check = Check::new(id, edge_id, &c.name, c.arg_strings(), c.negated)?;
        edge.add_condition(Condition::new(check));
    }
    for (i, e) in desc.effects.iter().enumerate() {
        let id = e.id.clone().unwrap_or_else(|| format!("{edge_id}-e{i}"));
        let check = Check::new(id, edge_id, &e.name, e.arg_strings(), e.negated)?;
        edge.add_effect(Effect::new(check))?;
    }
    for (i, e) in desc.input_effects.iter().enumerate() {
        let id = e.id.clone().unwrap_or_else(|| format!("{edge_id}-i{i}"));
        edge.add_input_effect(InputEffect::new(id, edge_id, &e.name, e.arg_strings())?)?;
    }
    Ok(edge)
}

fn build_graph(graph: NormalizedGraph) -> Result<ModelGraph, LoadError> {
    let mut nodes: Vec<ModelNode> = graph
        .nodes
        .iter()
        .map(|decl| ModelNode {
            id: decl.id.clone(),
            label: decl.label.clone(),
            edges: Vec::new(),
            is_start: decl.start,
            is_stop: decl.stop,
            is_stop_all: decl.stop_all,
        })
        .collect();
    for (edge_id, desc) in &graph.edges {
        let edge = build_edge(&graph, edge_id, desc)?;
        // Validation guarantees the source node exists.
        if let Some(node) = nodes.iter_mut().find(|n| n.id == edge.from) {
            node.edges.push(edge);
        }
    }
    ModelGraph::new(graph.id.clone(), graph.label, graph.usage, nodes)
        .ok_or_else(|| LoadError::Validation(vec![ValidationError::MissingStartNode { graph: graph.id }]))
}

/// Parse and load a graph-set description.
pub fn load(json: &str) -> Result<LoadedGraphs, LoadError> {
    let descriptions = parse_graph_set(json)?;
    load_descriptions(descriptions)
}

/// Load already parsed descriptions: assign ids, rename duplicates,
/// validate, then build the immutable graphs.
pub fn load_descriptions(descriptions: Vec<GraphDescription>) -> Result<LoadedGraphs, LoadError> {
    let mut graph_ids = HashSet::new();
    let mut warnings = Vec::new();
    let normalized: Vec<NormalizedGraph> = descriptions
        .into_iter()
        .enumerate()
        .map(|(i, desc)| normalize(i, desc, &mut graph_ids, &mut warnings))
        .collect();
    for warning in &warnings {
        tracing::warn!(%warning, "graph description contains duplicate id");
    }

    validate_graphs(&normalized).map_err(LoadError::Validation)?;

    let graphs = normalized
        .into_iter()
        .map(build_graph)
        .collect::<Result<Vec<_>, _>>()?;
    tracing::debug!(graphs = graphs.len(), "loaded graph set");
    Ok(LoadedGraphs { graphs, warnings })
}
