pub mod fixtures;
pub mod mock_chain;

pub use fixtures::*;
pub use mock_chain::*;
