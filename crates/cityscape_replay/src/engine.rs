//! Deterministic time travel over a loaded trace.
//!
//! The engine owns the event list and a [`WorldState`] cursor into it.
//! `seek_to(n)` always leaves the world as a pure function of
//! `events[0..=n]`: forward seeks continue incrementally, backward seeks
//! reset and replay, because entities are never deleted and so cannot be
//! un-applied.

use crate::snapshot::Snapshot;
use crate::world::WorldState;
use cityscape_trace::TraceEvent;
use tracing::debug;

/// Replays a trace to any step and exposes the reconstructed world.
pub struct ReplayEngine {
    events: Vec<TraceEvent>,
    step: i64,
    world: WorldState,
}

impl ReplayEngine {
    /// Engine with no trace loaded.
    #[must_use]
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            step: -1,
            world: WorldState::new(),
        }
    }

    /// Loads a trace, re-stamping indices to positions, and rewinds to -1.
    pub fn load_trace(&mut self, events: Vec<TraceEvent>) {
        self.events = events;
        for (position, event) in self.events.iter_mut().enumerate() {
            event.index = position;
        }
        self.world.reset();
        self.step = -1;
        debug!(events = self.events.len(), "trace loaded");
    }

    /// Step the engine currently sits at; -1 before the first event.
    #[must_use]
    pub fn step(&self) -> i64 {
        self.step
    }

    /// Number of events in the loaded trace.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether a trace with at least one event is loaded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// The loaded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// The reconstructed world at the current step.
    #[must_use]
    pub fn world(&self) -> &WorldState {
        &self.world
    }

    /// Rewinds to step -1, discarding all reconstructed state.
    pub fn reset(&mut self) {
        self.world.reset();
        self.step = -1;
    }

    /// Seeks to `step`, clamped to `[-1, len - 1]`, and returns the step
    /// actually landed on.
    ///
    /// Backward seeks replay from the start; forward seeks apply only the
    /// events between the old and new step; seeking to the current step does
    /// nothing.
    pub fn seek_to(&mut self, step: i64) -> i64 {
        let last = self.events.len() as i64 - 1;
        let target = step.clamp(-1, last);
        if target == self.step {
            return self.step;
        }
        if target < self.step {
            self.world.reset();
            self.step = -1;
        }
        while self.step < target {
            let next = (self.step + 1) as usize;
            self.world.apply(&self.events[next]);
            self.step += 1;
        }
        self.step
    }

    /// Captures the current world as a [`Snapshot`].
    #[must_use]
    pub fn snapshot(&self) -> Snapshot {
        Snapshot::capture(&self.world, self.step, &self.events)
    }
}

impl Default for ReplayEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cityscape_trace::EventKind;
    use proptest::prelude::*;

    /// CALL main, DECL x=0, LOOP true, ASSIGN x=1, LOOP false, RETURN.
    fn scenario_trace() -> Vec<TraceEvent> {
        vec![
            TraceEvent::new(EventKind::Call)
                .with_subject("main")
                .with_depth(0),
            TraceEvent::new(EventKind::Decl)
                .with_subject("x")
                .with_value("0")
                .with_depth(1),
            TraceEvent::new(EventKind::Loop)
                .with_condition("i<2")
                .with_condition_result(1)
                .with_depth(1),
            TraceEvent::new(EventKind::Assign)
                .with_subject("x")
                .with_value("1")
                .with_depth(1),
            TraceEvent::new(EventKind::Loop)
                .with_condition("i<2")
                .with_condition_result(0)
                .with_depth(1),
            TraceEvent::new(EventKind::Return)
                .with_subject("main")
                .with_subtype("x")
                .with_value("1")
                .with_depth(0),
        ]
    }

    fn engine_over(events: Vec<TraceEvent>) -> ReplayEngine {
        let mut engine = ReplayEngine::new();
        engine.load_trace(events);
        engine
    }

    #[test]
    fn test_full_replay_of_scenario() {
        let mut engine = engine_over(scenario_trace());
        engine.seek_to(5);
        let snapshot = engine.snapshot();

        assert_eq!(snapshot.functions.len(), 1);
        let main = &snapshot.functions[0];
        assert_eq!(main.name, "main");
        assert_eq!(main.enter_step, 0);
        assert_eq!(main.exit_step, Some(5));
        assert!(!main.active);
        assert_eq!(main.return_value.as_deref(), Some("1"));

        assert_eq!(snapshot.variables.len(), 1);
        let x = &snapshot.variables[0];
        assert_eq!(x.name, "x");
        assert_eq!(x.values.len(), 2);
        assert_eq!(x.values[0].step, 1);
        assert_eq!(x.values[0].value.as_deref(), Some("0"));
        assert_eq!(x.values[1].step, 3);
        assert_eq!(x.values[1].value.as_deref(), Some("1"));
        assert_eq!(x.current_value.as_deref(), Some("1"));
        assert!(!x.active);

        assert_eq!(snapshot.loops.len(), 1);
        let run = &snapshot.loops[0];
        assert_eq!(run.condition.as_deref(), Some("i<2"));
        assert_eq!(run.iterations, 1);
        assert!(!run.running);

        assert!(snapshot.call_stack.is_empty());
    }

    #[test]
    fn test_seek_clamps_to_trace_bounds() {
        let mut engine = engine_over(scenario_trace());
        assert_eq!(engine.seek_to(100), 5);
        assert_eq!(engine.seek_to(-50), -1);
        assert!(engine.world().functions.is_empty());
    }

    #[test]
    fn test_seek_on_empty_trace() {
        let mut engine = ReplayEngine::new();
        assert_eq!(engine.seek_to(3), -1);
        assert_eq!(engine.snapshot().total_steps, 0);
    }

    #[test]
    fn test_midway_snapshot_shows_open_state() {
        let mut engine = engine_over(scenario_trace());
        engine.seek_to(3);
        let snapshot = engine.snapshot();

        assert_eq!(snapshot.step, 3);
        assert!(snapshot.functions[0].active);
        assert_eq!(snapshot.call_stack.len(), 1);
        assert!(snapshot.loops[0].running);
        assert_eq!(
            snapshot.variables[0].current_value.as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_backward_seek_matches_fresh_replay() {
        let mut wandering = engine_over(scenario_trace());
        wandering.seek_to(5);
        wandering.seek_to(2);

        let mut fresh = engine_over(scenario_trace());
        fresh.seek_to(2);
        assert_eq!(wandering.snapshot(), fresh.snapshot());
    }

    #[test]
    fn test_load_trace_restamps_indices() {
        let events = vec![
            TraceEvent::new(EventKind::Call)
                .with_index(40)
                .with_subject("main"),
            TraceEvent::new(EventKind::Return)
                .with_index(90)
                .with_subject("main"),
        ];
        let engine = engine_over(events);
        assert_eq!(engine.events()[0].index, 0);
        assert_eq!(engine.events()[1].index, 1);
    }

    #[test]
    fn test_load_trace_resets_previous_state() {
        let mut engine = engine_over(scenario_trace());
        engine.seek_to(5);
        engine.load_trace(vec![TraceEvent::new(EventKind::Call).with_subject("f")]);
        assert_eq!(engine.step(), -1);
        assert!(engine.world().functions.is_empty());
    }

    fn event_pool() -> impl Strategy<Value = TraceEvent> {
        let kinds = prop::sample::select(vec![
            EventKind::Call,
            EventKind::Return,
            EventKind::Decl,
            EventKind::Assign,
            EventKind::Param,
            EventKind::Loop,
            EventKind::Condition,
            EventKind::Branch,
            EventKind::Read,
        ]);
        (kinds, 0..3u8, 0..5i64, any::<bool>()).prop_map(|(kind, name, value, truthy)| {
            let mut event = TraceEvent::new(kind)
                .with_subject(format!("v{name}"))
                .with_value(value.to_string());
            if matches!(kind, EventKind::Loop | EventKind::Condition) {
                event = event
                    .with_condition(format!("v{name} < 5"))
                    .with_condition_result(i64::from(truthy));
            }
            if kind == EventKind::Branch {
                event = event.with_subtype(if truthy { "if" } else { "else" });
            }
            event
        })
    }

    fn arbitrary_trace() -> impl Strategy<Value = Vec<TraceEvent>> {
        prop::collection::vec(event_pool(), 0..40)
    }

    /// Nested balanced CALL/RETURN blocks with a few declarations inside.
    fn balanced_trace() -> impl Strategy<Value = Vec<TraceEvent>> {
        let leaf = (0..4u32).prop_map(|n| {
            let name = format!("f{n}");
            vec![
                TraceEvent::new(EventKind::Call).with_subject(name.clone()),
                TraceEvent::new(EventKind::Decl)
                    .with_subject("x")
                    .with_value("0"),
                TraceEvent::new(EventKind::Return).with_subject(name),
            ]
        });
        leaf.prop_recursive(3, 48, 3, |inner| {
            ((0..4u32), prop::collection::vec(inner, 0..3)).prop_map(|(n, children)| {
                let name = format!("f{n}");
                let mut events = vec![TraceEvent::new(EventKind::Call).with_subject(name.clone())];
                for child in children {
                    events.extend(child);
                }
                events.push(TraceEvent::new(EventKind::Return).with_subject(name));
                events
            })
        })
    }

    proptest::proptest! {
        #[test]
        fn prop_seek_is_deterministic(
            events in arbitrary_trace(),
            detour in -1..40i64,
            target in -1..40i64,
        ) {
            let mut wandering = engine_over(events.clone());
            wandering.seek_to(target);
            wandering.seek_to(detour.min(target));
            wandering.seek_to(target);

            let mut fresh = engine_over(events);
            fresh.seek_to(target);

            prop_assert_eq!(wandering.snapshot(), fresh.snapshot());
        }

        #[test]
        fn prop_balanced_trace_leaves_empty_stack(events in balanced_trace()) {
            let mut engine = engine_over(events);
            engine.seek_to(i64::MAX);
            prop_assert!(engine.world().call_stack.is_empty());
            prop_assert!(engine.world().functions.values().all(|f| !f.active));
            prop_assert!(engine.world().open_containers().is_empty());
        }

        #[test]
        fn prop_value_histories_are_time_ordered(events in arbitrary_trace()) {
            let mut engine = engine_over(events);
            engine.seek_to(i64::MAX);
            for binding in engine.world().variables.values() {
                let steps: Vec<usize> =
                    binding.values.iter().map(|sample| sample.step).collect();
                prop_assert!(steps.windows(2).all(|pair| pair[0] < pair[1]));
                let last = binding.values.last().map(|sample| sample.value.clone());
                prop_assert_eq!(Some(binding.current_value.clone()), last);
            }
        }

        #[test]
        fn prop_malformed_traces_never_panic(events in arbitrary_trace(), target in -5..50i64) {
            let mut engine = engine_over(events);
            engine.seek_to(target);
            let _ = engine.snapshot();
        }
    }
}
