//! Pure state transition function
//!
//! Given the same checkpoint, context and event this always produces the same
//! result. All I/O is described by the returned effects.

use super::state::{Checkpoint, GraphState, RunContext, ToolCall};
use super::{Effect, Event};
use crate::store::{Message, ToolResult};
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// Result of a state transition
#[derive(Debug)]
pub struct TransitionResult {
    pub new_state: Checkpoint,
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(state: Checkpoint) -> Self {
        Self {
            new_state: state,
            effects: vec![],
        }
    }

    pub fn with_effect(mut self, effect: Effect) -> Self {
        self.effects.push(effect);
        self
    }

    pub fn with_effects(mut self, effects: impl IntoIterator<Item = Effect>) -> Self {
        self.effects.extend(effects);
        self
    }
}

/// Errors that can occur during transition
#[derive(Debug, Error, PartialEq)]
pub enum TransitionError {
    #[error("Invalid transition: {event} while in {state}")]
    InvalidTransition {
        state: &'static str,
        event: &'static str,
    },
    #[error("Agent exceeded {max_cycles} model calls without finishing")]
    CycleLimitExceeded { max_cycles: u32 },
    #[error("Model requested tool call id {0} more than once")]
    DuplicateToolCallId(String),
    #[error("Tool results do not match pending calls: {0}")]
    UnmatchedToolResults(String),
}

/// Pure transition function
pub fn transition(
    state: &Checkpoint,
    context: &RunContext,
    event: Event,
) -> Result<TransitionResult, TransitionError> {
    match (&state.state, event) {
        // Respond + reply without tools -> Terminated
        (GraphState::Respond, Event::ModelReplied { message }) if !message.has_tool_calls() => {
            Ok(TransitionResult::new(Checkpoint {
                state: GraphState::Terminated,
                step: state.step + 1,
                runs: state.runs,
            })
            .with_effect(Effect::append(message)))
        }

        // Respond + reply with tools -> Act
        (GraphState::Respond, Event::ModelReplied { message }) => {
            let step = state.step + 1;
            // Another respond step would follow the act step
            if step >= context.max_cycles {
                return Err(TransitionError::CycleLimitExceeded {
                    max_cycles: context.max_cycles,
                });
            }
            check_unique_ids(&message.tool_calls)?;

            let pending = message.tool_calls.clone();
            Ok(TransitionResult::new(Checkpoint {
                state: GraphState::Act {
                    pending: pending.clone(),
                },
                step,
                runs: state.runs,
            })
            .with_effect(Effect::append(message))
            .with_effect(Effect::execute_tools(pending)))
        }

        // Act + all results -> Respond
        (GraphState::Act { pending }, Event::ToolsCompleted { results }) => {
            let ordered = match_results(pending, results)?;
            Ok(TransitionResult::new(Checkpoint {
                state: GraphState::Respond,
                step: state.step,
                runs: state.runs,
            })
            .with_effects(ordered.iter().map(Effect::append_tool_result))
            .with_effect(Effect::RequestModel))
        }

        (current, event) => Err(TransitionError::InvalidTransition {
            state: current.name(),
            event: event.name(),
        }),
    }
}

fn check_unique_ids(calls: &[ToolCall]) -> Result<(), TransitionError> {
    let mut seen = HashSet::with_capacity(calls.len());
    for call in calls {
        if !seen.insert(call.id.as_str()) {
            return Err(TransitionError::DuplicateToolCallId(call.id.clone()));
        }
    }
    Ok(())
}

/// Pair every pending call with exactly one result, in call order.
fn match_results(
    pending: &[ToolCall],
    results: Vec<ToolResult>,
) -> Result<Vec<ToolResult>, TransitionError> {
    let mut by_id: HashMap<String, ToolResult> = HashMap::with_capacity(results.len());
    for result in results {
        if !pending.iter().any(|call| call.id == result.tool_call_id) {
            return Err(TransitionError::UnmatchedToolResults(format!(
                "unexpected result for {}",
                result.tool_call_id
            )));
        }
        let id = result.tool_call_id.clone();
        if by_id.insert(id.clone(), result).is_some() {
            return Err(TransitionError::UnmatchedToolResults(format!(
                "duplicate result for {id}"
            )));
        }
    }

    pending
        .iter()
        .map(|call| {
            by_id.remove(&call.id).ok_or_else(|| {
                TransitionError::UnmatchedToolResults(format!("missing result for {}", call.id))
            })
        })
        .collect()
}

/// Model input for a respond step: system instruction followed by history
pub fn build_model_input(system_prompt: &str, history: &[Message]) -> Vec<Message> {
    let mut input = Vec::with_capacity(history.len() + 1);
    input.push(Message::system(system_prompt));
    input.extend_from_slice(history);
    input
}
