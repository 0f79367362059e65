//! Property-based tests for the state machine
//!
//! These tests verify key invariants hold across all possible inputs.

use super::state::*;
use super::transition::*;
use super::*;
use crate::store::{Message, Role, ToolResult};
use proptest::prelude::*;
use serde_json::json;

// ============================================================================
// Test Helpers
// ============================================================================

fn test_context() -> RunContext {
    RunContext::new("test-thread", DEFAULT_MAX_CYCLES)
}

fn calls_for(ids: &[String]) -> Vec<ToolCall> {
    ids.iter()
        .map(|id| ToolCall::new(id.clone(), "tavily_search", json!({ "query": id })))
        .collect()
}

// ============================================================================
// Arbitrary Generators
// ============================================================================

fn arb_call_ids() -> impl Strategy<Value = Vec<String>> {
    proptest::collection::hash_set("[a-z]{8}", 1..6).prop_map(|ids| ids.into_iter().collect())
}

fn arb_reply() -> impl Strategy<Value = Message> {
    prop_oneof![
        "[a-zA-Z0-9 ]{0,30}".prop_map(Message::assistant),
        arb_call_ids().prop_map(|ids| Message::assistant_with_tools("", calls_for(&ids))),
    ]
}

fn arb_state() -> impl Strategy<Value = GraphState> {
    prop_oneof![
        Just(GraphState::Respond),
        Just(GraphState::Terminated),
        arb_call_ids().prop_map(|ids| GraphState::Act {
            pending: calls_for(&ids)
        }),
    ]
}

fn arb_event() -> impl Strategy<Value = Event> {
    prop_oneof![
        arb_reply().prop_map(|message| Event::ModelReplied { message }),
        arb_call_ids().prop_map(|ids| Event::ToolsCompleted {
            results: ids
                .into_iter()
                .map(|id| ToolResult::success(id, "out"))
                .collect()
        }),
    ]
}

fn appended(effects: &[Effect]) -> Vec<&Message> {
    effects
        .iter()
        .filter_map(|e| match e {
            Effect::AppendMessage { message } => Some(message),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    // K tool calls produce exactly K tool messages in call order, then one model request
    #[test]
    fn prop_tool_results_matched_by_call_id(ids in arb_call_ids(), seed in any::<u64>()) {
        let calls = calls_for(&ids);
        let mut results: Vec<ToolResult> = ids
            .iter()
            .map(|id| ToolResult::success(id.clone(), format!("result for {id}")))
            .collect();
        // Completion order is unrelated to call order
        let len = results.len();
        #[allow(clippy::cast_possible_truncation)]
        results.rotate_left((seed % len as u64) as usize);

        let state = Checkpoint { state: GraphState::Act { pending: calls.clone() }, step: 1, runs: 1 };
        let result = transition(&state, &test_context(), Event::ToolsCompleted { results }).unwrap();

        let messages = appended(&result.effects);
        prop_assert_eq!(messages.len(), calls.len());
        for (message, call) in messages.iter().zip(&calls) {
            prop_assert_eq!(message.role, Role::Tool);
            prop_assert_eq!(message.tool_call_id.as_deref(), Some(call.id.as_str()));
            prop_assert_eq!(&message.content, &format!("result for {}", call.id));
        }
        let requests = result.effects.iter().filter(|e| **e == Effect::RequestModel).count();
        prop_assert_eq!(requests, 1);
        prop_assert_eq!(result.effects.last(), Some(&Effect::RequestModel));
        prop_assert_eq!(result.new_state.state, GraphState::Respond);
    }

    // A reply without tool calls always terminates and never schedules more work
    #[test]
    fn prop_plain_reply_terminates(text in "[a-zA-Z0-9 ]{0,40}", step in 0u32..DEFAULT_MAX_CYCLES) {
        let state = Checkpoint { state: GraphState::Respond, step, runs: 1 };
        let result = transition(&state, &test_context(), Event::ModelReplied { message: Message::assistant(text) }).unwrap();

        prop_assert!(result.new_state.is_terminated());
        prop_assert_eq!(result.effects.len(), 1);
        let schedules_work = result
            .effects
            .iter()
            .any(|e| matches!(e, Effect::RequestModel | Effect::ExecuteTools { .. }));
        prop_assert!(!schedules_work);
    }

    // Steps never decrease and never pass the bound, whatever the event sequence
    #[test]
    fn prop_step_is_bounded(
        start in arb_state(),
        events in proptest::collection::vec(arb_event(), 0..30),
        max_cycles in 1u32..6,
    ) {
        let ctx = RunContext::new("bounded", max_cycles);
        let mut state = Checkpoint { state: start, step: 0, runs: 1 };

        for event in events {
            if let Ok(result) = transition(&state, &ctx, event) {
                prop_assert!(result.new_state.step >= state.step);
                prop_assert!(result.new_state.step <= max_cycles);
                prop_assert_eq!(result.new_state.runs, state.runs);
                state = result.new_state;
            }
        }
    }

    // Terminated accepts nothing
    #[test]
    fn prop_terminated_is_final(event in arb_event()) {
        let state = Checkpoint { state: GraphState::Terminated, step: 1, runs: 1 };
        let is_invalid = matches!(
            transition(&state, &test_context(), event),
            Err(TransitionError::InvalidTransition { .. })
        );
        prop_assert!(is_invalid);
    }

    // Act always executes exactly the calls it recorded as pending
    #[test]
    fn prop_act_executes_pending(ids in arb_call_ids()) {
        let calls = calls_for(&ids);
        let state = Checkpoint { state: GraphState::Respond, step: 0, runs: 1 };
        let result = transition(
            &state,
            &test_context(),
            Event::ModelReplied { message: Message::assistant_with_tools("", calls.clone()) },
        ).unwrap();

        prop_assert_eq!(&result.new_state.state, &GraphState::Act { pending: calls.clone() });
        prop_assert_eq!(result.effects.last(), Some(&Effect::ExecuteTools { calls }));
    }
}
