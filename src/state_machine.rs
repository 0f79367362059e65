//! Respond/act conversation graph
//!
//! Implements the Elm Architecture pattern with pure state transitions.

mod effect;
pub mod event;
pub mod state;
pub(crate) mod transition;

#[cfg(test)]
mod proptests;

pub use effect::Effect;
pub use event::Event;
#[allow(unused_imports)] // GraphState is matched on by store and runtime tests
pub use state::{Checkpoint, GraphState, RunContext, ToolCall, DEFAULT_MAX_CYCLES};
pub use transition::{build_model_input, transition, TransitionError};
