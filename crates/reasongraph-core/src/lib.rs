pub mod config_manager;
pub mod error;
pub mod node;
pub mod store;
pub mod types;

pub use config_manager::*;
pub use error::*;
pub use node::*;
pub use store::*;
pub use types::*;
