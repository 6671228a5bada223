//! Cityscape Replay Engine
//!
//! Rebuilds a structured picture of a program run from a flat instrumented
//! trace. Three cooperating layers:
//!
//! - **Replay** ([`engine::ReplayEngine`] over [`world::WorldState`]) folds
//!   events into persistent entities - invocations, variable bindings, loop
//!   runs, branch decisions - with deterministic time travel via `seek_to`.
//! - **Consolidation** ([`consolidate::consolidate`]) deduplicates a raw
//!   event range into one record per logical entity, for listing.
//! - **Boundary extraction** ([`boundary::child_range`]) computes the event
//!   sub-range a container owns, recursively, so a renderer can drill into
//!   calls, loops, and branches.
//!
//! Malformed traces never panic the engine; anomalies degrade the
//! reconstruction and are reported through `tracing`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod consolidate;
pub mod engine;
pub mod entity;
pub mod snapshot;
pub mod world;

pub use boundary::{child_range, Container, ContainerKind};
pub use consolidate::{consolidate, consolidate_all, ConsolidatedEntity};
pub use engine::ReplayEngine;
pub use entity::{
    BranchDecision, FunctionInvocation, LoopRun, MemoryNode, ValueSample, VariableBinding,
};
pub use snapshot::Snapshot;
pub use world::{ContainerFrame, ContainerKey, WorldState};
