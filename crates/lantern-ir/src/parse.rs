use crate::types::GraphDescription;

#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Graph set is empty")]
    Empty,
}

/// Parse a graph-set description. Accepts an array of graphs or a single
/// graph object.
pub fn parse_graph_set(json: &str) -> Result<Vec<GraphDescription>, ParseError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let graphs: Vec<GraphDescription> = if value.is_array() {
        serde_json::from_value(value)?
    } else {
        vec![serde_json::from_value(value)?]
    };
    if graphs.is_empty() {
        return Err(ParseError::Empty);
    }
    Ok(graphs)
}
