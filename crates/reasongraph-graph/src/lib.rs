pub mod analyzer;
pub mod pruner;

pub use analyzer::*;
pub use pruner::*;
