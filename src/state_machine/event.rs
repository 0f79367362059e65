//! Events that drive the graph

use crate::store::{Message, ToolResult};

/// Events that trigger state transitions
#[derive(Debug, Clone)]
pub enum Event {
    /// The model answered a respond step
    ModelReplied { message: Message },

    /// Every tool call of the act step finished, in any order
    ToolsCompleted { results: Vec<ToolResult> },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::ModelReplied { .. } => "model_replied",
            Event::ToolsCompleted { .. } => "tools_completed",
        }
    }
}
