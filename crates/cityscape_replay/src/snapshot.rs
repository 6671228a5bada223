//! Read-only view of the reconstructed world at one step.
//!
//! Snapshots flatten the registries into arrays (in creation order) so they
//! serialize cleanly for a renderer, and they compare with `==` so replay
//! determinism can be asserted deeply.

use crate::entity::{BranchDecision, FunctionInvocation, LoopRun, MemoryNode, VariableBinding};
use crate::world::WorldState;
use cityscape_core::{CoreResult, InvocationKey};
use cityscape_trace::TraceEvent;
use serde::{Deserialize, Serialize};

/// Everything a renderer needs to draw one moment of the replay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    /// Step the engine is at; -1 means before the first event
    pub step: i64,
    /// Number of events in the loaded trace
    pub total_steps: usize,
    /// Invocations in creation order
    pub functions: Vec<FunctionInvocation>,
    /// Bindings in creation order
    pub variables: Vec<VariableBinding>,
    /// Loop runs in creation order
    pub loops: Vec<LoopRun>,
    /// Branch decisions in creation order
    pub branches: Vec<BranchDecision>,
    /// Memory nodes in creation order
    pub memory: Vec<MemoryNode>,
    /// Open invocations, innermost last
    pub call_stack: Vec<InvocationKey>,
    /// Event applied last; absent at step -1
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_event: Option<TraceEvent>,
}

impl Snapshot {
    pub(crate) fn capture(world: &WorldState, step: i64, events: &[TraceEvent]) -> Self {
        let current_event = usize::try_from(step)
            .ok()
            .and_then(|index| events.get(index))
            .cloned();
        Self {
            step,
            total_steps: events.len(),
            functions: world.functions.values().cloned().collect(),
            variables: world.variables.values().cloned().collect(),
            loops: world.loops.values().cloned().collect(),
            branches: world.branches.values().cloned().collect(),
            memory: world.memory.values().cloned().collect(),
            call_stack: world.call_stack.clone(),
            current_event,
        }
    }

    /// Serializes the snapshot to compact JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_json(&self) -> CoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serializes the snapshot to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error when serialization fails.
    pub fn to_json_pretty(&self) -> CoreResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityscape_trace::EventKind;

    fn sample_events() -> Vec<TraceEvent> {
        vec![
            TraceEvent::new(EventKind::Call).with_subject("main"),
            TraceEvent::new(EventKind::Decl)
                .with_index(1)
                .with_subject("x")
                .with_value("0"),
        ]
    }

    fn world_after(events: &[TraceEvent]) -> WorldState {
        let mut world = WorldState::new();
        for event in events {
            world.apply(event);
        }
        world
    }

    #[test]
    fn test_capture_before_first_event() {
        let events = sample_events();
        let snapshot = Snapshot::capture(&WorldState::new(), -1, &events);
        assert_eq!(snapshot.step, -1);
        assert_eq!(snapshot.total_steps, 2);
        assert!(snapshot.current_event.is_none());
        assert!(snapshot.functions.is_empty());
    }

    #[test]
    fn test_capture_carries_current_event() {
        let events = sample_events();
        let world = world_after(&events);
        let snapshot = Snapshot::capture(&world, 1, &events);
        assert_eq!(
            snapshot.current_event.as_ref().and_then(|e| e.subject.as_deref()),
            Some("x")
        );
        assert_eq!(snapshot.functions.len(), 1);
        assert_eq!(snapshot.variables.len(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let events = sample_events();
        let world = world_after(&events);
        let snapshot = Snapshot::capture(&world, 1, &events);

        let json = snapshot.to_json().unwrap();
        let back: Snapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(snapshot, back);
    }

    #[test]
    fn test_json_uses_camel_case() {
        let events = sample_events();
        let snapshot = Snapshot::capture(&WorldState::new(), -1, &events);
        let json: serde_json::Value =
            serde_json::from_str(&snapshot.to_json().unwrap()).unwrap();
        assert_eq!(json["totalSteps"], 2);
        assert!(json.get("callStack").is_some());
        assert!(json.get("currentEvent").is_none());
    }
}
