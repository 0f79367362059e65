//! Graph runner: executes effects and feeds events back into the state machine

use super::traits::{LlmClient, ToolExecutor};
use crate::llm::{LlmError, LlmRequest};
use crate::state_machine::{
    build_model_input, transition, Checkpoint, Effect, Event, RunContext, ToolCall,
    TransitionError, DEFAULT_MAX_CYCLES,
};
use crate::store::{Message, ThreadSnapshot, ToolResult};
use crate::tools::ToolContext;
use futures::future::join_all;
use std::collections::VecDeque;
use std::time::Duration;
use thiserror::Error;

const MAX_OUTPUT_TOKENS: u32 = 4096;

/// Bounds applied to every run
#[derive(Debug, Clone, Copy)]
pub struct RunLimits {
    pub max_cycles: u32,
    pub model_timeout: Duration,
    pub tool_timeout: Duration,
}

impl Default for RunLimits {
    fn default() -> Self {
        Self {
            max_cycles: DEFAULT_MAX_CYCLES,
            model_timeout: Duration::from_secs(120),
            tool_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Error)]
pub enum RunError {
    #[error("Model request failed: {0}")]
    Model(#[from] LlmError),
    #[error("Model did not answer within {0:?}")]
    ModelTimeout(Duration),
    #[error("Tool {name} did not finish within {timeout:?}")]
    ToolTimeout { name: String, timeout: Duration },
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error("Run stopped in state {0} before terminating")]
    Incomplete(&'static str),
}

/// Everything a finished run produced, ready to commit
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Messages staged during the run, starting with the user's
    pub new_messages: Vec<Message>,
    /// Terminated checkpoint
    pub checkpoint: Checkpoint,
    /// History length after commit
    pub message_count: usize,
}

impl RunOutcome {
    /// Content of the final assistant message
    pub fn response(&self) -> &str {
        self.new_messages
            .last()
            .map_or("", |message| message.content.as_str())
    }
}

/// Runs the respond/act graph for one user message
pub struct GraphRunner<L, T> {
    llm: L,
    tools: T,
    system_prompt: String,
    limits: RunLimits,
}

impl<L: LlmClient, T: ToolExecutor> GraphRunner<L, T> {
    pub fn new(llm: L, tools: T, system_prompt: impl Into<String>, limits: RunLimits) -> Self {
        Self {
            llm,
            tools,
            system_prompt: system_prompt.into(),
            limits,
        }
    }

    /// Run from the committed snapshot until the graph terminates.
    ///
    /// Effects are executed in order. An error at any point abandons the
    /// staged messages so the caller commits nothing.
    pub async fn run(
        &self,
        thread_id: &str,
        snapshot: &ThreadSnapshot,
        user_text: &str,
    ) -> Result<RunOutcome, RunError> {
        let context = RunContext::new(thread_id, self.limits.max_cycles);
        let mut checkpoint = snapshot.checkpoint.begin_run();
        let mut history = snapshot.messages.clone();
        let committed = history.len();

        tracing::info!(thread_id, run = checkpoint.runs, "Starting run");

        let mut effects = VecDeque::from([
            Effect::append(Message::user(user_text)),
            Effect::RequestModel,
        ]);

        while let Some(effect) = effects.pop_front() {
            let event = match effect {
                Effect::AppendMessage { message } => {
                    history.push(message);
                    continue;
                }
                Effect::RequestModel => {
                    tracing::debug!(thread_id, step = checkpoint.step + 1, "Respond step");
                    self.respond(&history).await?
                }
                Effect::ExecuteTools { calls } => {
                    tracing::info!(
                        thread_id,
                        step = checkpoint.step,
                        tools = ?calls.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
                        "Act step"
                    );
                    self.act(&context, calls).await?
                }
            };

            let result = transition(&checkpoint, &context, event)?;
            checkpoint = result.new_state;
            effects.extend(result.effects);
        }

        if !checkpoint.is_terminated() {
            return Err(RunError::Incomplete(checkpoint.state.name()));
        }

        tracing::info!(
            thread_id,
            run = checkpoint.runs,
            steps = checkpoint.step,
            "Run terminated"
        );

        let message_count = history.len();
        let new_messages = history.split_off(committed);
        Ok(RunOutcome {
            new_messages,
            checkpoint,
            message_count,
        })
    }

    async fn respond(&self, history: &[Message]) -> Result<Event, RunError> {
        let request = LlmRequest {
            messages: build_model_input(&self.system_prompt, history),
            tools: self.tools.definitions(),
            max_tokens: Some(MAX_OUTPUT_TOKENS),
        };

        let response = tokio::time::timeout(self.limits.model_timeout, self.llm.complete(&request))
            .await
            .map_err(|_| RunError::ModelTimeout(self.limits.model_timeout))??;

        tracing::debug!(
            requested_tools = response.has_tool_calls(),
            end_turn = response.end_turn,
            "Model replied"
        );

        Ok(Event::ModelReplied {
            message: response.into_message(),
        })
    }

    /// Run every call concurrently; results come back in completion-agnostic order
    async fn act(&self, context: &RunContext, calls: Vec<ToolCall>) -> Result<Event, RunError> {
        let runs = calls.into_iter().map(|call| self.run_tool(context, call));
        let results = join_all(runs)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Event::ToolsCompleted { results })
    }

    async fn run_tool(&self, context: &RunContext, call: ToolCall) -> Result<ToolResult, RunError> {
        let ctx = ToolContext::new(context.thread_id.clone());
        let timeout = self.limits.tool_timeout;

        let output = tokio::time::timeout(
            timeout,
            self.tools.execute(&call.name, call.arguments, ctx),
        )
        .await
        .map_err(|_| RunError::ToolTimeout {
            name: call.name.clone(),
            timeout,
        })?;

        Ok(match output {
            Some(output) if output.success => ToolResult::success(call.id, output.output),
            Some(output) => ToolResult::error(call.id, output.output),
            None => {
                tracing::warn!(tool = %call.name, "Model requested unknown tool");
                ToolResult::error(call.id, format!("Unknown tool: {}", call.name))
            }
        })
    }
}
