//! Threads interrupt/resume state through the reserved `current_node_id`
//! and `approval_result` state keys, so a suspended `builtin.user_approval`
//! node resumes transparently on the next `step`/`invoke` call rather than
//! needing a side-channel resume API.
//!
//! Grounded on `agentgraph_kernel::interrupt::Interrupt`, which only knows
//! about a single node id and resume value per execution; this module
//! decides *which* node id and value to hand it based on committed state.

use agentgraph_kernel::interrupt::Interrupt;
use agentgraph_kernel::workflow::GraphState;

/// Build the interrupt handle for executing `node_id` against `state`.
///
/// If `state.current_node_id == node_id` and `state.approval_result` is
/// present, the node resumes with that value. Otherwise a fresh (will
/// actually suspend) handle is returned.
pub fn interrupt_for_node(state: &GraphState, node_id: &str) -> Interrupt {
    let matches_suspended_node = state
        .get("current_node_id")
        .and_then(|v| v.as_str())
        .is_some_and(|id| id == node_id);
    match (matches_suspended_node, state.get("approval_result")) {
        (true, Some(value)) if !value.is_null() => Interrupt::resuming(value.clone()),
        _ => Interrupt::fresh(),
    }
}

/// State updates to clear the resume slot once a suspended node has
/// consumed its resume value, so a later unrelated suspend doesn't
/// immediately "resume" with stale data.
pub fn clear_resume_slot() -> Vec<agentgraph_kernel::workflow::StateUpdate> {
    vec![
        agentgraph_kernel::workflow::StateUpdate::new("approval_result", serde_json::Value::Null),
        agentgraph_kernel::workflow::StateUpdate::new("current_node_id", serde_json::Value::Null),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentgraph_kernel::interrupt::InterruptOutcome;
    use serde_json::json;

    #[test]
    fn fresh_state_does_not_resume() {
        let state = GraphState::new();
        let interrupt = interrupt_for_node(&state, "approve");
        assert!(!interrupt.is_resuming());
    }

    #[test]
    fn matching_node_with_approval_result_resumes() {
        let mut state = GraphState::new();
        state.set("current_node_id", json!("approve"));
        state.set("approval_result", json!("yes"));
        let interrupt = interrupt_for_node(&state, "approve");
        match interrupt.suspend("approve", json!({})) {
            InterruptOutcome::Resumed(v) => assert_eq!(v, json!("yes")),
            InterruptOutcome::Suspend(_) => panic!("expected resume"),
        }
    }

    #[test]
    fn mismatched_node_id_does_not_resume() {
        let mut state = GraphState::new();
        state.set("current_node_id", json!("other_node"));
        state.set("approval_result", json!("yes"));
        let interrupt = interrupt_for_node(&state, "approve");
        assert!(!interrupt.is_resuming());
    }
}
