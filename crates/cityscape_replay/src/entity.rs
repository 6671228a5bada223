//! Persistent entities reconstructed from trace events.
//!
//! Entities are created lazily when their first event arrives and are never
//! deleted; closing events flip `active` off so a renderer can still show
//! completed calls and finished loops. All mutation happens in
//! [`crate::world::WorldState::apply`].

use cityscape_core::{BindingKey, BranchKey, InvocationKey, LoopKey, Scope};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// One function invocation, from its CALL to its RETURN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionInvocation {
    /// Stable identity of this invocation
    pub key: InvocationKey,
    /// Function name
    pub name: String,
    /// Zero-based ordinal among invocations of the same name
    pub ordinal: u32,
    /// Nesting depth reported by the CALL event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth: Option<i64>,
    /// Step of the CALL event
    pub enter_step: usize,
    /// Step of the matching RETURN, once seen
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_step: Option<usize>,
    /// Whether the invocation is still on the call stack
    pub active: bool,
    /// Bindings declared inside this invocation, in declaration order
    pub locals: Vec<BindingKey>,
    /// Formatted return value from the RETURN event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub return_value: Option<String>,
    /// Rendered argument list from the CALL event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<String>,
    /// Steps observed while this invocation was open
    pub child_indices: Vec<usize>,
}

impl FunctionInvocation {
    /// Opens an invocation at `enter_step`.
    #[must_use]
    pub fn new(key: InvocationKey, enter_step: usize, depth: Option<i64>, args: Option<String>) -> Self {
        let name = key.name.clone();
        let ordinal = key.ordinal;
        Self {
            key,
            name,
            ordinal,
            depth,
            enter_step,
            exit_step: None,
            active: true,
            locals: Vec::new(),
            return_value: None,
            args,
            child_indices: Vec::new(),
        }
    }
}

/// One recorded value of a binding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueSample {
    /// Step of the event that produced the value
    pub step: usize,
    /// Formatted value; absent when the instrumenter captured none
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

/// One variable binding, with its full value history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableBinding {
    /// Stable identity of this binding
    pub key: BindingKey,
    /// Variable name
    pub name: String,
    /// Captured address, when present
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Scope the binding was declared in
    pub scope: Scope,
    /// Every recorded value, in step order
    pub values: Vec<ValueSample>,
    /// Value of the most recent sample
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_value: Option<String>,
    /// Step of the declaring event
    pub decl_step: usize,
    /// Whether the owning scope is still open
    pub active: bool,
}

impl VariableBinding {
    /// Opens a binding declared at `decl_step`, with no samples yet.
    #[must_use]
    pub fn new(key: BindingKey, decl_step: usize) -> Self {
        let name = key.name.clone();
        let address = key.address.clone();
        let scope = key.scope.clone();
        Self {
            key,
            name,
            address,
            scope,
            values: Vec::new(),
            current_value: None,
            decl_step,
            active: true,
        }
    }

    /// Appends a sample and moves `current_value` with it.
    pub fn record(&mut self, step: usize, value: Option<String>) {
        self.current_value.clone_from(&value);
        self.values.push(ValueSample { step, value });
    }
}

/// One run of a loop, from its first truthy evaluation to its falsy one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoopRun {
    /// Stable identity of this run
    pub key: LoopKey,
    /// Loop flavor reported by the instrumenter ("for", "while")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    /// Condition source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Source line of the loop header
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Scope the loop executes in
    pub scope: Scope,
    /// Truthy evaluations seen so far
    pub iterations: u32,
    /// Whether the run is still iterating
    pub running: bool,
    /// Whether the run is still open
    pub active: bool,
    /// Steps observed while this run was open
    pub member_steps: Vec<usize>,
}

impl LoopRun {
    /// Opens a run on its first truthy evaluation.
    #[must_use]
    pub fn new(key: LoopKey, subtype: Option<String>) -> Self {
        let condition = key.base.condition.clone();
        let line = key.base.line;
        let scope = key.base.scope.clone();
        Self {
            key,
            subtype,
            condition,
            line,
            scope,
            iterations: 1,
            running: true,
            active: true,
            member_steps: Vec::new(),
        }
    }
}

/// One branch decision: a CONDITION evaluation and the arm it selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchDecision {
    /// Stable identity of this decision
    pub key: BranchKey,
    /// Condition source text
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Whether the condition evaluated truthy
    pub result: bool,
    /// Label of the arm taken ("if", "else"); set by the first BRANCH only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chosen_branch: Option<String>,
    /// Step of the CONDITION event
    pub step: usize,
    /// Source line of the condition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Steps observed while this decision was open
    pub child_indices: Vec<usize>,
}

impl BranchDecision {
    /// Opens a decision at the CONDITION's step.
    #[must_use]
    pub fn new(key: BranchKey, condition: Option<String>, result: bool, line: Option<u32>) -> Self {
        let step = key.step;
        Self {
            key,
            condition,
            result,
            chosen_branch: None,
            step,
            line,
            child_indices: Vec::new(),
        }
    }
}

/// All bindings ever observed at one address.
///
/// Pure aliasing index: the bindings own their state, the node only groups
/// them, so two names for the same memory can be rendered together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryNode {
    /// The shared address
    pub address: String,
    /// Keys of every binding observed at the address
    pub bindings: IndexSet<BindingKey>,
}

impl MemoryNode {
    /// Empty node for `address`.
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            bindings: IndexSet::new(),
        }
    }
}
