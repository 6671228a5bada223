//! Identity keys for replayed entities.
//!
//! Trace identity is deterministic: the same trace always produces the same
//! keys, so keys double as stable labels for the renderer. Every key kind
//! formats to a short human-readable form (`main#2`, `branch@17`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Scope a binding lives in: one invocation, or file/global scope.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Scope {
    /// Events outside any tracked call
    Global,
    /// Scope of a single function invocation
    Invocation(InvocationKey),
}

impl Scope {
    /// Whether this is the global sentinel scope
    #[must_use]
    pub fn is_global(&self) -> bool {
        matches!(self, Self::Global)
    }

    /// The invocation this scope belongs to, if any
    #[must_use]
    pub fn invocation(&self) -> Option<&InvocationKey> {
        match self {
            Self::Global => None,
            Self::Invocation(key) => Some(key),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Global => write!(f, "global"),
            Self::Invocation(key) => write!(f, "{}", key),
        }
    }
}

/// Identifies one function invocation: name plus per-name ordinal.
///
/// Every call gets a fresh key, recursive self-calls included; keys are
/// never reused within a replay.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InvocationKey {
    /// Function name as instrumented
    pub name: String,
    /// Zero-based count of earlier invocations of the same name
    pub ordinal: u32,
}

impl InvocationKey {
    /// Key for the `ordinal`-th invocation of `name`
    #[must_use]
    pub fn new(name: impl Into<String>, ordinal: u32) -> Self {
        Self {
            name: name.into(),
            ordinal,
        }
    }
}

impl fmt::Display for InvocationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.ordinal)
    }
}

/// Identifies one variable binding.
///
/// Identity is `(scope, name, address)` while the binding is active. The
/// generation only disambiguates a re-declaration over a *dead* binding with
/// the same identity, which balanced traces never produce; it is 0 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingKey {
    /// Scope the binding was declared in
    pub scope: Scope,
    /// Variable name as instrumented
    pub name: String,
    /// Memory address, when the instrumenter recorded one
    pub address: Option<String>,
    /// Collision counter over dead same-identity bindings
    pub generation: u32,
}

impl BindingKey {
    /// Key for a first-generation binding
    #[must_use]
    pub fn new(scope: Scope, name: impl Into<String>, address: Option<String>) -> Self {
        Self {
            scope,
            name: name.into(),
            address,
            generation: 0,
        }
    }

    /// Same identity under a bumped generation
    #[must_use]
    pub fn with_generation(mut self, generation: u32) -> Self {
        self.generation = generation;
        self
    }

    /// Whether this key carries the given identity triple
    #[must_use]
    pub fn matches(&self, scope: &Scope, name: &str, address: Option<&str>) -> bool {
        self.scope == *scope && self.name == name && self.address.as_deref() == address
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.scope, self.name)?;
        if let Some(address) = &self.address {
            write!(f, "@{}", address)?;
        }
        if self.generation > 0 {
            write!(f, "~{}", self.generation)?;
        }
        Ok(())
    }
}

/// Base identity of a loop: where it sits and what it tests.
///
/// This is the lookup the replay engine uses to decide whether a LOOP event
/// continues the currently running run or starts a fresh one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopBase {
    /// Scope the loop executes in
    pub scope: Scope,
    /// Source line of the loop header
    pub line: Option<u32>,
    /// Condition text as instrumented
    pub condition: Option<String>,
}

impl LoopBase {
    /// Base for a loop at `line` testing `condition` inside `scope`
    #[must_use]
    pub fn new(scope: Scope, line: Option<u32>, condition: Option<String>) -> Self {
        Self {
            scope,
            line,
            condition,
        }
    }
}

impl fmt::Display for LoopBase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@L", self.scope)?;
        match self.line {
            Some(line) => write!(f, "{}", line)?,
            None => write!(f, "?")?,
        }
        if let Some(condition) = &self.condition {
            write!(f, "[{}]", condition)?;
        }
        Ok(())
    }
}

/// Identifies one run of a loop: base plus per-base run ordinal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LoopKey {
    /// Base identity shared by all runs of the same loop
    pub base: LoopBase,
    /// Zero-based count of earlier runs with the same base
    pub ordinal: u32,
}

impl LoopKey {
    /// Key for the `ordinal`-th run of `base`
    #[must_use]
    pub fn new(base: LoopBase, ordinal: u32) -> Self {
        Self { base, ordinal }
    }
}

impl fmt::Display for LoopKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.base, self.ordinal)
    }
}

/// Identifies a branch decision by the step of its CONDITION event.
///
/// Conditions are never deduplicated - each evaluation is its own decision
/// point, so the step alone is a complete identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BranchKey {
    /// Step of the CONDITION event that opened the decision
    pub step: usize,
}

impl BranchKey {
    /// Key for the decision opened at `step`
    #[must_use]
    pub const fn new(step: usize) -> Self {
        Self { step }
    }
}

impl fmt::Display for BranchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "branch@{}", self.step)
    }
}
