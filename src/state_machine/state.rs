//! Graph state types

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default bound on respond steps within a single run
pub const DEFAULT_MAX_CYCLES: u32 = 25;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// Position of the respond/act graph
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphState {
    /// Next step calls the model with the full history
    #[default]
    Respond,

    /// Next step executes the tool calls of the last assistant message
    Act { pending: Vec<ToolCall> },

    /// Last assistant message requested no tools
    Terminated,
}

impl GraphState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, GraphState::Terminated)
    }

    pub fn name(&self) -> &'static str {
        match self {
            GraphState::Respond => "respond",
            GraphState::Act { .. } => "act",
            GraphState::Terminated => "terminated",
        }
    }
}

/// Serialized position of a thread's graph, stored next to its history
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Checkpoint {
    pub state: GraphState,
    /// Respond steps taken in the current run
    #[serde(default)]
    pub step: u32,
    /// Runs started on this thread
    #[serde(default)]
    pub runs: u64,
}

impl Checkpoint {
    pub fn initial() -> Self {
        Self::default()
    }

    /// Start a new run from whatever was last committed.
    ///
    /// Only terminated checkpoints are ever committed, so resuming always
    /// restarts at `Respond` with the user's new message appended.
    pub fn begin_run(&self) -> Self {
        Self {
            state: GraphState::Respond,
            step: 0,
            runs: self.runs + 1,
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.state.is_terminated()
    }
}

/// Per-run configuration, immutable while the graph runs
#[derive(Debug, Clone)]
pub struct RunContext {
    pub thread_id: String,
    /// Maximum model calls in one run
    pub max_cycles: u32,
}

impl RunContext {
    pub fn new(thread_id: impl Into<String>, max_cycles: u32) -> Self {
        Self {
            thread_id: thread_id.into(),
            max_cycles,
        }
    }
}
