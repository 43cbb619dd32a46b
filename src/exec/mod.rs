//! Pipeline execution layer.
//!
//! - [`build_run`] is the per-execution record (one `BuildRun` per triggered
//!   task, discarded after logging).
//! - [`step`] renders opaque step command templates.
//! - [`backend`] abstracts how a rendered step command is run; production
//!   spawns external processes, tests substitute a fake.
//! - [`executor`] flattens a task, stages each transform's file set through
//!   its steps and publishes outputs only on success.

pub mod backend;
pub mod build_run;
pub mod executor;
pub mod step;

pub use backend::{CommandBackend, StepBackend, StepInvocation};
pub use build_run::{BuildRun, TransformOutcome, TransformStatus};
pub use executor::Executor;
