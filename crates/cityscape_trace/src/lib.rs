//! Cityscape Trace Model
//!
//! Wire-level representation of an instrumented execution: the flat event
//! record emitted by the upstream instrumenter, plus the document wrapper
//! the normalizer writes to disk. Parsing is deliberately tolerant - traces
//! come from printf-style instrumentation of foreign programs and routinely
//! arrive with missing or oddly typed fields.
//!
//! Interpretation of events (what a CALL or LOOP *means*) lives in
//! `cityscape_replay`; this crate only models and loads them.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod document;
pub mod event;

pub use document::TraceDocument;
pub use event::{EventKind, TraceEvent};
