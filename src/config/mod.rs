//! Engine configuration: types, loading, and hot reload

pub mod loader;
pub mod shared;
pub mod types;

pub use loader::{load_config, load_from_str};
pub use shared::SharedConfig;
pub use types::EngineConfig;
