//! Suspend/resume primitive for nodes that need to pause execution
//! (e.g. `builtin.user_approval`) and be re-entered later with a value.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The payload a node emits when it suspends execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterruptPayload {
    pub node_id: String,
    pub value: Value,
}

impl InterruptPayload {
    pub fn new(node_id: impl Into<String>, value: Value) -> Self {
        Self {
            node_id: node_id.into(),
            value,
        }
    }
}

/// Marker returned from a node's call into the interrupt primitive.
///
/// A node calls [`Interrupt::suspend`] with a payload. The first time it is
/// called for a given execution, the engine persists the state and the
/// interrupted node id and tells the node to suspend. On a later `invoke`
/// that passes a resume value for this node, the same call returns
/// `Resumed(value)` instead.
#[derive(Debug, Clone)]
pub enum InterruptOutcome {
    Suspend(InterruptPayload),
    Resumed(Value),
}

/// Per-execution handle nodes use to suspend and later observe a resume
/// value. The engine is responsible for constructing one of these per
/// execution and threading the resume value in from the caller.
#[derive(Debug, Clone)]
pub struct Interrupt {
    resume_value: Option<Value>,
}

impl Interrupt {
    /// No resume value available: the next `suspend` call actually suspends.
    pub fn fresh() -> Self {
        Self { resume_value: None }
    }

    /// A resume value is available: the next `suspend` call for the
    /// matching node id returns it instead of suspending.
    pub fn resuming(value: Value) -> Self {
        Self {
            resume_value: Some(value),
        }
    }

    pub fn suspend(&self, node_id: impl Into<String>, value: Value) -> InterruptOutcome {
        match &self.resume_value {
            Some(resume) => InterruptOutcome::Resumed(resume.clone()),
            None => InterruptOutcome::Suspend(InterruptPayload::new(node_id, value)),
        }
    }

    pub fn is_resuming(&self) -> bool {
        self.resume_value.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fresh_interrupt_suspends() {
        let interrupt = Interrupt::fresh();
        match interrupt.suspend("approval", json!({"message": "ok?"})) {
            InterruptOutcome::Suspend(payload) => {
                assert_eq!(payload.node_id, "approval");
            }
            InterruptOutcome::Resumed(_) => panic!("expected suspend"),
        }
    }

    #[test]
    fn resuming_interrupt_returns_value() {
        let interrupt = Interrupt::resuming(json!("approve"));
        assert!(interrupt.is_resuming());
        match interrupt.suspend("approval", json!({"message": "ok?"})) {
            InterruptOutcome::Resumed(value) => assert_eq!(value, json!("approve")),
            InterruptOutcome::Suspend(_) => panic!("expected resume"),
        }
    }
}
