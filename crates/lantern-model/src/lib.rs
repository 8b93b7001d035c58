pub mod bind;
pub mod check_utility;
pub mod driver;
pub mod error;
pub mod model;
pub mod rng;
pub mod sim;
pub mod value;

pub use check_utility::CheckUtility;
pub use driver::RuntimeDriver;
pub use model::{ProgramModel, UserModel};
pub use sim::SimDriver;
