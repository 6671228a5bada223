//! Cityscape Core Types
//!
//! Pure identity and error types shared by the trace and replay crates.
//! No I/O and no engine logic live here.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod key;

pub use error::{CoreError, CoreResult};
pub use key::{BindingKey, BranchKey, InvocationKey, LoopBase, LoopKey, Scope};
