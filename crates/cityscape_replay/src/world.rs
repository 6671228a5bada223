//! Mutable replay state and the event transition function.
//!
//! `WorldState::apply` is the single mutation path: every event first fans
//! out to all open container frames, then dispatches on its kind. Structural
//! anomalies (unmatched RETURN, BRANCH with no decision, assignment to an
//! undeclared name) never fail; they degrade the reconstruction and are
//! reported through `tracing`.

use crate::entity::{
    BranchDecision, FunctionInvocation, LoopRun, MemoryNode, VariableBinding,
};
use cityscape_core::{BindingKey, BranchKey, InvocationKey, LoopBase, LoopKey, Scope};
use cityscape_trace::{EventKind, TraceEvent};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// Owner of an open container frame.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContainerKey {
    /// An invocation awaiting its RETURN
    Function(InvocationKey),
    /// A loop run awaiting its falsy evaluation
    Loop(LoopKey),
    /// A branch decision awaiting its BRANCH
    Branch(BranchKey),
}

/// One open container on the frame list.
///
/// The list is LIFO in spirit, but closing events remove their frame by key
/// wherever it sits: a BRANCH or RETURN may close a frame that is not the
/// top when inner containers were left open.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerFrame {
    /// The entity that owns events observed while this frame is open
    pub owner: ContainerKey,
    /// Step of the opening event
    pub start_step: usize,
}

/// All reconstructed state at one point in trace time.
#[derive(Debug, Clone, Default)]
pub struct WorldState {
    /// Every invocation seen so far, in creation order
    pub functions: IndexMap<InvocationKey, FunctionInvocation>,
    /// Every binding seen so far, in creation order
    pub variables: IndexMap<BindingKey, VariableBinding>,
    /// Every loop run seen so far, in creation order
    pub loops: IndexMap<LoopKey, LoopRun>,
    /// Every branch decision seen so far, in creation order
    pub branches: IndexMap<BranchKey, BranchDecision>,
    /// Aliasing index: address to the bindings observed there
    pub memory: IndexMap<String, MemoryNode>,
    /// Currently open invocations, innermost last
    pub call_stack: Vec<InvocationKey>,
    // Open frames, outermost first. RETURN and BRANCH may close a frame below
    // the top, so frames are removed by key rather than popped.
    frames: Vec<ContainerFrame>,
    invocation_counts: IndexMap<String, u32>,
    run_counts: IndexMap<LoopBase, u32>,
}

impl WorldState {
    /// Empty world at step -1.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Currently open container frames, outermost first.
    #[must_use]
    pub fn open_containers(&self) -> &[ContainerFrame] {
        &self.frames
    }

    /// Discards all reconstructed state.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// Applies one event: fan-out to open frames, then kind dispatch.
    ///
    /// Fan-out happens before dispatch, so an opening event is not a member
    /// of the frame it opens, while a closing event is a member of the frame
    /// it closes.
    pub fn apply(&mut self, event: &TraceEvent) {
        self.fan_out(event.index);
        match event.kind {
            EventKind::Call => self.apply_call(event),
            EventKind::Return => self.apply_return(event),
            EventKind::Decl | EventKind::Param => self.apply_declaration(event),
            EventKind::Assign => self.apply_assign(event),
            EventKind::Loop => self.apply_loop(event),
            EventKind::Condition => self.apply_condition(event),
            EventKind::Branch => self.apply_branch(event),
            EventKind::Read | EventKind::ExternalCall | EventKind::Unknown => {}
        }
    }

    /// Scope declarations resolve against right now.
    #[must_use]
    pub fn current_scope(&self) -> Scope {
        match self.call_stack.last() {
            Some(key) => Scope::Invocation(key.clone()),
            None => Scope::Global,
        }
    }

    fn fan_out(&mut self, index: usize) {
        for frame in &self.frames {
            match &frame.owner {
                ContainerKey::Function(key) => {
                    if let Some(invocation) = self.functions.get_mut(key) {
                        invocation.child_indices.push(index);
                    }
                }
                ContainerKey::Loop(key) => {
                    if let Some(run) = self.loops.get_mut(key) {
                        run.member_steps.push(index);
                    }
                }
                ContainerKey::Branch(key) => {
                    if let Some(decision) = self.branches.get_mut(key) {
                        decision.child_indices.push(index);
                    }
                }
            }
        }
    }

    fn apply_call(&mut self, event: &TraceEvent) {
        let name = event
            .subject
            .clone()
            .unwrap_or_else(|| "<unknown>".to_string());
        let slot = self.invocation_counts.entry(name.clone()).or_insert(0);
        let ordinal = *slot;
        *slot += 1;

        let key = InvocationKey::new(name, ordinal);
        let invocation =
            FunctionInvocation::new(key.clone(), event.index, event.depth, event.args.clone());
        self.functions.insert(key.clone(), invocation);
        self.call_stack.push(key.clone());
        self.frames.push(ContainerFrame {
            owner: ContainerKey::Function(key),
            start_step: event.index,
        });
    }

    fn apply_return(&mut self, event: &TraceEvent) {
        let Some(key) = self.call_stack.pop() else {
            warn!(step = event.index, "RETURN with an empty call stack, ignoring");
            return;
        };
        if let Some(invocation) = self.functions.get_mut(&key) {
            invocation.exit_step = Some(event.index);
            invocation.active = false;
            invocation.return_value.clone_from(&event.value);
            for binding_key in &invocation.locals {
                if let Some(binding) = self.variables.get_mut(binding_key) {
                    binding.active = false;
                }
            }
        }
        self.remove_frame(&ContainerKey::Function(key));
    }

    /// DECL and PARAM share one path; a repeat declaration of a live
    /// identity is treated as a reassignment.
    fn apply_declaration(&mut self, event: &TraceEvent) {
        let Some(name) = event.subject.clone() else {
            debug!(step = event.index, "declaration without a subject, ignoring");
            return;
        };
        let scope = self.current_scope();
        if let Some(key) = self.find_binding(&scope, &name, event.address.as_deref()) {
            if let Some(binding) = self.variables.get_mut(&key) {
                binding.record(event.index, event.value.clone());
            }
            return;
        }
        self.create_binding(scope, name, event.address.clone(), event);
    }

    fn apply_assign(&mut self, event: &TraceEvent) {
        let Some(name) = event.subject.clone() else {
            debug!(step = event.index, "ASSIGN without a subject, ignoring");
            return;
        };
        let scope = self.current_scope();
        let address = event.address.as_deref();
        let key = self
            .find_binding(&scope, &name, address)
            .or_else(|| self.find_binding_any_scope(&name, address));
        match key {
            Some(key) => {
                if let Some(binding) = self.variables.get_mut(&key) {
                    binding.record(event.index, event.value.clone());
                }
            }
            None => {
                // Data-quality signal: the trace assigns before declaring.
                warn!(
                    step = event.index,
                    name = %name,
                    "ASSIGN without a declaration, synthesizing one"
                );
                self.create_binding(scope, name, event.address.clone(), event);
            }
        }
    }

    fn apply_loop(&mut self, event: &TraceEvent) {
        let scope = self.current_scope();
        let base = LoopBase::new(
            scope,
            event.line,
            event.condition_text().map(str::to_string),
        );
        let truthy = event.condition_holds();
        match (self.running_run(&base), truthy) {
            (Some(key), true) => {
                if let Some(run) = self.loops.get_mut(&key) {
                    run.iterations += 1;
                }
            }
            (None, true) => {
                let slot = self.run_counts.entry(base.clone()).or_insert(0);
                let ordinal = *slot;
                *slot += 1;

                let key = LoopKey::new(base, ordinal);
                let run = LoopRun::new(key.clone(), event.subtype.clone());
                self.loops.insert(key.clone(), run);
                self.frames.push(ContainerFrame {
                    owner: ContainerKey::Loop(key),
                    start_step: event.index,
                });
            }
            (Some(key), false) => {
                // The terminating evaluation is not an iteration.
                if let Some(run) = self.loops.get_mut(&key) {
                    run.running = false;
                    run.active = false;
                }
                self.remove_frame(&ContainerKey::Loop(key));
            }
            (None, false) => {
                debug!(step = event.index, "falsy LOOP with no running run, ignoring");
            }
        }
    }

    fn apply_condition(&mut self, event: &TraceEvent) {
        let key = BranchKey::new(event.index);
        let decision = BranchDecision::new(
            key,
            event.condition_text().map(str::to_string),
            event.condition_holds(),
            event.line,
        );
        self.branches.insert(key, decision);
        self.frames.push(ContainerFrame {
            owner: ContainerKey::Branch(key),
            start_step: event.index,
        });
    }

    fn apply_branch(&mut self, event: &TraceEvent) {
        let open = self.frames.iter().rev().find_map(|frame| match &frame.owner {
            ContainerKey::Branch(key) => {
                let undecided = self
                    .branches
                    .get(key)
                    .is_some_and(|decision| decision.chosen_branch.is_none());
                undecided.then_some(*key)
            }
            _ => None,
        });
        let Some(key) = open else {
            debug!(step = event.index, "BRANCH with no open decision, ignoring");
            return;
        };
        if let Some(decision) = self.branches.get_mut(&key) {
            decision.chosen_branch.clone_from(&event.subtype);
        }
        self.remove_frame(&ContainerKey::Branch(key));
    }

    /// Most recent active binding with exactly this identity.
    fn find_binding(&self, scope: &Scope, name: &str, address: Option<&str>) -> Option<BindingKey> {
        self.variables
            .values()
            .rev()
            .find(|binding| binding.active && binding.key.matches(scope, name, address))
            .map(|binding| binding.key.clone())
    }

    /// Most recent active binding with this name and address in any scope.
    fn find_binding_any_scope(&self, name: &str, address: Option<&str>) -> Option<BindingKey> {
        self.variables
            .values()
            .rev()
            .find(|binding| {
                binding.active && binding.name == name && binding.address.as_deref() == address
            })
            .map(|binding| binding.key.clone())
    }

    fn create_binding(
        &mut self,
        scope: Scope,
        name: String,
        address: Option<String>,
        event: &TraceEvent,
    ) -> BindingKey {
        let mut key = BindingKey::new(scope.clone(), name, address.clone());
        let mut generation = 0;
        // A dead binding may already hold the identity; bump past it.
        while self.variables.contains_key(&key) {
            generation += 1;
            key = key.with_generation(generation);
        }

        let mut binding = VariableBinding::new(key.clone(), event.index);
        binding.record(event.index, event.value.clone());
        self.variables.insert(key.clone(), binding);

        if let Scope::Invocation(invocation_key) = &scope {
            if let Some(invocation) = self.functions.get_mut(invocation_key) {
                invocation.locals.push(key.clone());
            }
        }
        if let Some(address) = address {
            self.memory
                .entry(address.clone())
                .or_insert_with(|| MemoryNode::new(address))
                .bindings
                .insert(key.clone());
        }
        key
    }

    fn running_run(&self, base: &LoopBase) -> Option<LoopKey> {
        self.loops
            .values()
            .rev()
            .find(|run| run.running && run.key.base == *base)
            .map(|run| run.key.clone())
    }

    fn remove_frame(&mut self, owner: &ContainerKey) {
        if let Some(position) = self.frames.iter().rposition(|frame| frame.owner == *owner) {
            self.frames.remove(position);
        }
    }
}
