//! Boundary extraction: computing the event range a container owns.
//!
//! `child_range` is pure and re-entrant, so it works on the full trace and
//! on any previously extracted slice. Depth stamps cannot be trusted across
//! slices (they may be relative or stripped), so type balance is the primary
//! signal and depth only serves as a secondary guard; a depth comparison
//! involving a missing stamp always answers "not a sibling".

use cityscape_trace::{EventKind, TraceEvent};
use serde::{Deserialize, Serialize};

/// What kind of events a container collects until it closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ContainerKind {
    /// CALL, closed by its balancing RETURN
    Call,
    /// LOOP, closed by a falsy evaluation of the same condition
    Loop,
    /// CONDITION, closed by the first BRANCH
    Condition,
}

/// A container to extract children for: its kind, its position in the
/// sub-trace, and (for loops) the condition that identifies continuations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Container {
    /// Kind of the opening event
    pub kind: ContainerKind,
    /// Position of the opening event within the sub-trace
    pub start: usize,
    /// Condition text, when the kind carries one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

impl Container {
    /// Container of `kind` opening at `start`.
    #[must_use]
    pub fn new(kind: ContainerKind, start: usize) -> Self {
        Self {
            kind,
            start,
            condition: None,
        }
    }

    /// Attaches the identifying condition text.
    #[must_use]
    pub fn with_condition(mut self, condition: impl Into<String>) -> Self {
        self.condition = Some(condition.into());
        self
    }
}

/// Positions in `sub_trace` owned by `container`, in order.
///
/// The opening event itself is not part of the range. An empty result means
/// the container owns nothing (a leaf-like range), never an error; a
/// `start` outside the sub-trace also yields an empty range.
#[must_use]
pub fn child_range(container: &Container, sub_trace: &[TraceEvent]) -> Vec<usize> {
    if container.start >= sub_trace.len() {
        return Vec::new();
    }
    match container.kind {
        ContainerKind::Call => call_range(container.start, sub_trace),
        ContainerKind::Loop => loop_range(container, sub_trace),
        ContainerKind::Condition => condition_range(container.start, sub_trace),
    }
}

/// Balance counting: CALL opens, RETURN closes; the balancing RETURN is the
/// last member. A range that never balances runs to the end of the slice.
fn call_range(start: usize, sub_trace: &[TraceEvent]) -> Vec<usize> {
    let mut range = Vec::new();
    let mut balance = 1i64;
    for index in (start + 1)..sub_trace.len() {
        range.push(index);
        match sub_trace[index].kind {
            EventKind::Call => balance += 1,
            EventKind::Return => {
                balance -= 1;
                if balance == 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    range
}

/// Same-condition LOOP events continue the range (a falsy one is the last
/// member); a different loop at the same depth, or a call/condition at the
/// same or a shallower depth, is a sibling and ends the range before itself.
fn loop_range(container: &Container, sub_trace: &[TraceEvent]) -> Vec<usize> {
    let own_depth = sub_trace[container.start].depth;
    let condition = container.condition.as_deref();
    let mut range = Vec::new();
    for index in (container.start + 1)..sub_trace.len() {
        let event = &sub_trace[index];
        match event.kind {
            EventKind::Loop => {
                if event.condition_text() == condition {
                    range.push(index);
                    if !event.condition_holds() {
                        break;
                    }
                } else if depth_equals(event.depth, own_depth) {
                    break;
                } else {
                    range.push(index);
                }
            }
            EventKind::Call | EventKind::Condition => {
                if depth_at_most(event.depth, own_depth) {
                    break;
                }
                range.push(index);
            }
            _ => range.push(index),
        }
    }
    range
}

/// Everything up to and including the first BRANCH; dropping below the
/// condition's own depth first ends the range without one.
fn condition_range(start: usize, sub_trace: &[TraceEvent]) -> Vec<usize> {
    let own_depth = sub_trace[start].depth;
    let mut range = Vec::new();
    for index in (start + 1)..sub_trace.len() {
        let event = &sub_trace[index];
        if event.kind == EventKind::Branch {
            range.push(index);
            break;
        }
        if depth_below(event.depth, own_depth) {
            break;
        }
        range.push(index);
    }
    range
}

fn depth_equals(lhs: Option<i64>, rhs: Option<i64>) -> bool {
    lhs.zip(rhs).is_some_and(|(a, b)| a == b)
}

fn depth_at_most(lhs: Option<i64>, rhs: Option<i64>) -> bool {
    lhs.zip(rhs).is_some_and(|(a, b)| a <= b)
}

fn depth_below(lhs: Option<i64>, rhs: Option<i64>) -> bool {
    lhs.zip(rhs).is_some_and(|(a, b)| a < b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str) -> TraceEvent {
        TraceEvent::new(EventKind::Call).with_subject(name)
    }

    fn ret(name: &str) -> TraceEvent {
        TraceEvent::new(EventKind::Return).with_subject(name)
    }

    fn assign(name: &str) -> TraceEvent {
        TraceEvent::new(EventKind::Assign).with_subject(name)
    }

    fn loop_eval(condition: &str, result: i64) -> TraceEvent {
        TraceEvent::new(EventKind::Loop)
            .with_condition(condition)
            .with_condition_result(result)
    }

    #[test]
    fn test_call_range_spans_recursion() {
        let trace = vec![call("f"), call("f"), ret("f"), ret("f")];
        let outer = Container::new(ContainerKind::Call, 0);
        assert_eq!(child_range(&outer, &trace), vec![1, 2, 3]);

        let inner = Container::new(ContainerKind::Call, 1);
        assert_eq!(child_range(&inner, &trace), vec![2]);
    }

    #[test]
    fn test_call_range_includes_body_events() {
        let trace = vec![call("f"), assign("x"), loop_eval("i < 2", 1), ret("f")];
        let container = Container::new(ContainerKind::Call, 0);
        assert_eq!(child_range(&container, &trace), vec![1, 2, 3]);
    }

    #[test]
    fn test_unbalanced_call_runs_to_end() {
        let trace = vec![call("f"), assign("x"), assign("y")];
        let container = Container::new(ContainerKind::Call, 0);
        assert_eq!(child_range(&container, &trace), vec![1, 2]);
    }

    #[test]
    fn test_loop_range_ends_at_falsy_evaluation() {
        let trace = vec![
            loop_eval("i < 2", 1).with_depth(1),
            assign("x").with_depth(2),
            loop_eval("i < 2", 1).with_depth(1),
            assign("x").with_depth(2),
            loop_eval("i < 2", 0).with_depth(1),
            assign("after").with_depth(1),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_loop_range_excludes_sibling_loop() {
        let trace = vec![
            loop_eval("i < 2", 1).with_depth(1),
            assign("x").with_depth(2),
            loop_eval("j < 9", 1).with_depth(1),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1]);
    }

    #[test]
    fn test_loop_range_includes_nested_loop() {
        let trace = vec![
            loop_eval("i < 2", 1).with_depth(1),
            loop_eval("j < 2", 1).with_depth(2),
            loop_eval("j < 2", 0).with_depth(2),
            loop_eval("i < 2", 0).with_depth(1),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1, 2, 3]);
    }

    #[test]
    fn test_loop_range_excludes_sibling_call() {
        let trace = vec![
            loop_eval("i < 2", 1).with_depth(1),
            assign("x").with_depth(2),
            call("f").with_depth(1),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1]);
    }

    #[test]
    fn test_loop_range_includes_nested_call() {
        let trace = vec![
            loop_eval("i < 2", 1).with_depth(1),
            call("f").with_depth(2),
            ret("f").with_depth(2),
            loop_eval("i < 2", 0).with_depth(1),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1, 2, 3]);
    }

    #[test]
    fn test_missing_depth_disables_sibling_guard() {
        // A sliced sub-trace may have no depth stamps at all; the guard
        // must not fire on guesses.
        let trace = vec![
            loop_eval("i < 2", 1),
            call("f"),
            loop_eval("i < 2", 0),
        ];
        let container = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&container, &trace), vec![1, 2]);
    }

    #[test]
    fn test_condition_range_ends_at_first_branch() {
        let trace = vec![
            TraceEvent::new(EventKind::Condition)
                .with_subject("x > 0")
                .with_condition_result(1)
                .with_depth(1),
            assign("x").with_depth(2),
            TraceEvent::new(EventKind::Branch).with_subtype("if"),
            TraceEvent::new(EventKind::Branch).with_subtype("else"),
        ];
        let container = Container::new(ContainerKind::Condition, 0);
        assert_eq!(child_range(&container, &trace), vec![1, 2]);
    }

    #[test]
    fn test_condition_range_stops_on_depth_drop() {
        let trace = vec![
            TraceEvent::new(EventKind::Condition)
                .with_subject("x > 0")
                .with_condition_result(0)
                .with_depth(2),
            assign("outer").with_depth(1),
            TraceEvent::new(EventKind::Branch).with_subtype("if"),
        ];
        let container = Container::new(ContainerKind::Condition, 0);
        assert_eq!(child_range(&container, &trace), Vec::<usize>::new());
    }

    #[test]
    fn test_start_outside_slice_is_empty() {
        let trace = vec![call("f")];
        let container = Container::new(ContainerKind::Call, 9);
        assert!(child_range(&container, &trace).is_empty());
    }

    #[test]
    fn test_range_nests_recursively() {
        // Drill two levels: the outer call owns the loop, the loop owns its
        // body, computed over the re-sliced sub-trace.
        let trace = vec![
            call("main").with_depth(0),
            loop_eval("i < 2", 1).with_depth(1),
            assign("x").with_depth(2),
            loop_eval("i < 2", 0).with_depth(1),
            ret("main").with_depth(0),
        ];
        let outer = Container::new(ContainerKind::Call, 0);
        let outer_range = child_range(&outer, &trace);
        assert_eq!(outer_range, vec![1, 2, 3, 4]);

        let sliced: Vec<TraceEvent> = outer_range
            .iter()
            .map(|&index| trace[index].clone())
            .collect();
        let inner = Container::new(ContainerKind::Loop, 0).with_condition("i < 2");
        assert_eq!(child_range(&inner, &sliced), vec![1, 2]);
    }
}
