pub mod expr;
pub mod parse;
pub mod types;

pub use parse::parse_graph_set;
