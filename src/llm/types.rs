//! Common types for LLM interactions

use crate::state_machine::ToolCall;
use crate::store::Message;

/// LLM request: the full model input, system instruction first
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDefinition>,
    pub max_tokens: Option<u32>,
}

/// Tool definition bound to every request
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
}

/// LLM response
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub end_turn: bool,
    pub usage: Usage,
}

#[cfg(test)]
impl LlmResponse {
    /// Plain text answer
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tool_calls: Vec::new(),
            end_turn: true,
            usage: Usage::default(),
        }
    }

    /// Answer requesting tool calls
    pub fn with_tool_calls(text: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            text: text.into(),
            tool_calls,
            end_turn: false,
            usage: Usage::default(),
        }
    }
}

impl LlmResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// The assistant message appended to the thread
    pub fn into_message(self) -> Message {
        Message::assistant_with_tools(self.text, self.tool_calls)
    }
}

/// Usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Role;
    use serde_json::json;

    #[test]
    fn test_into_message_keeps_tool_calls() {
        let call = ToolCall::new("call_1", "tavily_search", json!({"query": "X"}));
        let response = LlmResponse::with_tool_calls("", vec![call.clone()]);
        assert!(response.has_tool_calls());

        let message = response.into_message();
        assert_eq!(message.role, Role::Assistant);
        assert_eq!(message.tool_calls, vec![call]);
    }

    #[test]
    fn test_text_response_has_no_tools() {
        let message = LlmResponse::text("4").into_message();
        assert_eq!(message.content, "4");
        assert!(!message.has_tool_calls());
    }
}
