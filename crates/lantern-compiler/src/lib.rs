pub mod check;
pub mod contradiction;
pub mod graph;
pub mod load;
pub mod ops;
pub mod validate;

pub use load::load;
