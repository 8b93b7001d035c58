pub mod config;
pub mod result;
pub mod tester;

pub use config::TesterConfig;
pub use result::ModelResult;
pub use tester::{LoadReport, ModelTester, TesterError};
