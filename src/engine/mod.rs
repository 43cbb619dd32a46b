//! Watch-session engine.
//!
//! The engine splits into a pure core and an async shell. [`core::CoreRuntime`]
//! is a synchronous state machine: it consumes [`RuntimeEvent`]s and emits
//! [`CoreCommand`]s, holding all scheduling policy (per-task serialization,
//! latest-wins coalescing, reload gating) without touching the filesystem,
//! clocks, or channels. [`runtime::WatchRuntime`] is the shell that feeds it
//! events from the watcher and executor and carries out its commands.

pub mod core;
pub mod runtime;

use crate::types::{ReloadKind, TaskName, TriggerReason};

/// Everything that can happen to a watch session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeEvent {
    /// A debounced, classified change asks for `task` to run.
    TaskTriggered {
        task: TaskName,
        on_success: ReloadKind,
        reason: TriggerReason,
    },
    /// A reload-only path changed; notify without rebuilding.
    ReloadRequested { kind: ReloadKind },
    /// A previously started run completed.
    RunFinished { task: TaskName, success: bool },
    /// Ctrl-C or equivalent.
    ShutdownRequested,
}

/// Instructions the shell carries out on the core's behalf. The reload kind
/// for a run stays inside the core (it is applied at `RunFinished`), so
/// `StartRun` carries only what the shell needs to spawn the build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoreCommand {
    StartRun {
        task: TaskName,
        reason: TriggerReason,
    },
    Notify(ReloadKind),
}

/// What a long-lived session is doing right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// At least one build run is in flight.
    Building,
    /// Idle; the served output reflects the latest inputs.
    #[default]
    ServingFresh,
    /// Idle; the last triggered run failed and the previous good output is
    /// still being served.
    ServingStale,
}

/// Result of feeding one event to the core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoreStep {
    pub commands: Vec<CoreCommand>,
    pub keep_running: bool,
}

impl CoreStep {
    pub fn running() -> Self {
        Self {
            commands: Vec::new(),
            keep_running: true,
        }
    }
}
