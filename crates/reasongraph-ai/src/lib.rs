pub mod judge;
pub mod llm_factory;
pub mod llm_provider;

#[cfg(feature = "openai-llm")]
pub mod openai_llm_provider;

pub use judge::*;
pub use llm_factory::*;
pub use llm_provider::*;

#[cfg(feature = "openai-llm")]
pub use openai_llm_provider::*;
