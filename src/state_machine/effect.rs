//! Effects produced by state transitions

use crate::state_machine::state::ToolCall;
use crate::store::{Message, ToolResult};

/// Effects to be executed after a state transition, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Append a message to the run's staged history
    AppendMessage { message: Message },

    /// Call the model with the system instruction and full history
    RequestModel,

    /// Run every call; results come back as `Event::ToolsCompleted`
    ExecuteTools { calls: Vec<ToolCall> },
}

impl Effect {
    pub fn append(message: Message) -> Self {
        Effect::AppendMessage { message }
    }

    pub fn append_tool_result(result: &ToolResult) -> Self {
        Effect::AppendMessage {
            message: Message::tool(result),
        }
    }

    pub fn execute_tools(calls: Vec<ToolCall>) -> Self {
        Effect::ExecuteTools { calls }
    }
}
