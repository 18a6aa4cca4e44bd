pub mod automation;
pub mod core;
pub mod ingest;
pub mod server;

// --- Primary core exports ---
pub use crate::core::types;
pub use crate::core::types::*;
pub use crate::core::AppState;

// --- Convenience module paths ---
pub use automation::{actuator, batch, driver, monitor, session};
