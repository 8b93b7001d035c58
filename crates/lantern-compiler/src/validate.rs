use std::collections::HashSet;

use lantern_ir::types::Usage;

use crate::load::NormalizedGraph;

#[derive(Debug, thiserror::Error)]
pub enum ValidationError {
    #[error("Graph '{graph}' has no start node")]
    MissingStartNode { graph: String },

    #[error("Graph '{graph}' has multiple start nodes: {}", .nodes.join(", "))]
    MultipleStartNodes { graph: String, nodes: Vec<String> },

    #[error("Dangling node reference: edge '{edge}' in graph '{graph}' references node '{node}' which doesn't exist")]
    DanglingNodeRef {
        graph: String,
        edge: String,
        node: String,
    },

    #[error("Graph '{graph}' lists unknown node '{node}' as {role} node")]
    UnknownRoleNode {
        graph: String,
        role: &'static str,
        node: String,
    },

    #[error("Edge '{edge}' in graph '{graph}' has no conditions")]
    MissingConditions { graph: String, edge: String },

    #[error("Edge '{edge}' in {usage} graph '{graph}' declares {what}")]
    MisplacedActions {
        graph: String,
        edge: String,
        usage: Usage,
        what: &'static str,
    },
}

/// Check the structural invariants of every graph.
pub fn validate_graphs(graphs: &[NormalizedGraph]) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();
    for graph in graphs {
        validate_start_node(graph, &mut errors);
        validate_role_lists(graph, &mut errors);
        validate_edges(graph, &mut errors);
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Exactly one distinct start node per graph.
fn validate_start_node(graph: &NormalizedGraph, errors: &mut Vec<ValidationError>) {
    let starts: Vec<String> = graph
        .nodes
        .iter()
        .filter(|n| n.start)
        .map(|n| n.id.clone())
        .collect();
    match starts.len() {
        0 => errors.push(ValidationError::MissingStartNode {
            graph: graph.id.clone(),
        }),
        1 => {}
        _ => errors.push(ValidationError::MultipleStartNodes {
            graph: graph.id.clone(),
            nodes: starts,
        }),
    }
}

/// Start/stop/stop-all lists must name declared nodes.
fn validate_role_lists(graph: &NormalizedGraph, errors: &mut Vec<ValidationError>) {
    let declared: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    let roles = [
        ("start", &graph.start_ids),
        ("stop", &graph.stop_ids),
        ("stop-all", &graph.stop_all_ids),
    ];
    for (role, ids) in roles {
        for id in ids.iter() {
            if !declared.contains(id.as_str()) {
                errors.push(ValidationError::UnknownRoleNode {
                    graph: graph.id.clone(),
                    role,
                    node: id.clone(),
                });
            }
        }
    }
}

fn validate_edges(graph: &NormalizedGraph, errors: &mut Vec<ValidationError>) {
    let declared: HashSet<&str> = graph.nodes.iter().map(|n| n.id.as_str()).collect();
    for (edge_id, edge) in &graph.edges {
        for node in [&edge.from, &edge.to] {
            if !declared.contains(node.as_str()) {
                errors.push(ValidationError::DanglingNodeRef {
                    graph: graph.id.clone(),
                    edge: edge_id.clone(),
                    node: node.clone(),
                });
            }
        }
        if edge.conditions.as_ref().map_or(true, |c| c.is_empty()) {
            errors.push(ValidationError::MissingConditions {
                graph: graph.id.clone(),
                edge: edge_id.clone(),
            });
        }
        let misplaced = match graph.usage {
            Usage::User if !edge.effects.is_empty() => Some("effects"),
            Usage::Program | Usage::End if !edge.input_effects.is_empty() => Some("input effects"),
            _ => None,
        };
        if let Some(what) = misplaced {
            errors.push(ValidationError::MisplacedActions {
                graph: graph.id.clone(),
                edge: edge_id.clone(),
                usage: graph.usage,
                what,
            });
        }
    }
}
