pub mod config;
pub mod executor;
pub mod harvest;
pub mod logging;
pub mod model;
pub mod schema;
pub mod storage;
pub mod traits;

// Re-export common types for convenience
pub use config::{ConfigError, FailurePolicy, HarvestConfig, HarvestParams};
pub use executor::*;
pub use model::*;
pub use storage::{LocalBatchStore, MemoryBatchStore};
pub use traits::*;
