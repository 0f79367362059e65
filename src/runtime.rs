//! Runtime for executing the respond/act graph
//!
//! Drives the pure state machine for one run: performs the effects it asks
//! for and feeds the resulting events back in. Nothing is committed here.

mod executor;
pub mod traits;

#[cfg(test)]
pub mod testing;

pub use executor::{GraphRunner, RunError, RunLimits};
pub use traits::*;

use std::sync::Arc;

/// Runner over trait objects, as wired in `main`
pub type ProductionRunner = GraphRunner<Arc<dyn LlmClient>, Arc<dyn ToolExecutor>>;
