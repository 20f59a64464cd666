pub mod assignment;
pub mod children;
pub mod embedding;
pub mod error;
pub mod index;
pub mod providers;
pub mod similarity;

#[cfg(feature = "openai")]
pub mod openai_provider;

pub use assignment::*;
pub use children::*;
pub use embedding::*;
pub use error::*;
pub use index::*;
pub use providers::*;
pub use similarity::*;

#[cfg(feature = "openai")]
pub use openai_provider::*;
