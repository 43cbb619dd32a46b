//! Pure scheduling state machine for watch sessions.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::debug;

use crate::engine::{CoreCommand, CoreStep, RuntimeEvent, SessionState};
use crate::types::{ReloadKind, TaskName, TransformName, TriggerReason};

/// Trigger parameters for a run, remembered while it is in flight or queued.
#[derive(Debug, Clone, PartialEq, Eq)]
struct RunParams {
    on_success: ReloadKind,
    reason: TriggerReason,
}

/// Serialization at transform granularity with latest-wins coalescing.
///
/// At most one run may touch a given leaf transform at a time: each
/// transform stages through and publishes into fixed directories, so two
/// overlapping tasks (`styles` and `dev` both flattening to `css`) would
/// race on them. A trigger whose task shares any leaf with an in-flight run
/// is parked in a one-slot queue per task; further triggers overwrite the
/// slot, so after a burst at most one follow-up run per task happens.
/// Tasks with disjoint leaf sets run concurrently.
#[derive(Debug)]
pub struct CoreRuntime {
    /// Flattened leaf set per task, fixed for the session.
    leaves: BTreeMap<TaskName, BTreeSet<TransformName>>,
    running: HashMap<TaskName, RunParams>,
    pending: BTreeMap<TaskName, RunParams>,
    last_run_failed: bool,
}

impl CoreRuntime {
    pub fn new(leaves: BTreeMap<TaskName, BTreeSet<TransformName>>) -> Self {
        Self {
            leaves,
            running: HashMap::new(),
            pending: BTreeMap::new(),
            last_run_failed: false,
        }
    }

    pub fn step(&mut self, event: RuntimeEvent) -> CoreStep {
        let mut step = CoreStep::running();

        match event {
            RuntimeEvent::TaskTriggered {
                task,
                on_success,
                reason,
            } => {
                let params = RunParams { on_success, reason };
                if self.conflicts(&task) {
                    debug!(task = %task, "task conflicts with an in-flight run; queueing latest trigger");
                    self.pending.insert(task, params);
                } else {
                    self.start(&mut step, task, params);
                }
            }
            RuntimeEvent::ReloadRequested { kind } => {
                step.commands.push(CoreCommand::Notify(kind));
            }
            RuntimeEvent::RunFinished { task, success } => {
                self.last_run_failed = !success;
                match self.running.remove(&task) {
                    Some(params) => {
                        // Initial builds serve the page for the first time;
                        // nothing is connected yet, so no notification.
                        if success && params.reason == TriggerReason::FileWatch {
                            step.commands.push(CoreCommand::Notify(params.on_success));
                        }
                    }
                    None => {
                        debug!(task = %task, "finish for unknown run; ignoring");
                    }
                }
                self.dispatch_pending(&mut step);
            }
            RuntimeEvent::ShutdownRequested => {
                step.keep_running = false;
            }
        }

        step
    }

    pub fn is_idle(&self) -> bool {
        self.running.is_empty() && self.pending.is_empty()
    }

    pub fn state(&self) -> SessionState {
        if !self.running.is_empty() {
            SessionState::Building
        } else if self.last_run_failed {
            SessionState::ServingStale
        } else {
            SessionState::ServingFresh
        }
    }

    /// Whether starting `task` now would touch a leaf transform some
    /// in-flight run is already using.
    fn conflicts(&self, task: &str) -> bool {
        let empty = BTreeSet::new();
        let mine = self.leaves.get(task).unwrap_or(&empty);
        self.running.keys().any(|active| {
            active == task
                || self
                    .leaves
                    .get(active)
                    .is_some_and(|theirs| !theirs.is_disjoint(mine))
        })
    }

    /// Start every queued run that no longer conflicts, in name order.
    /// Starting one may keep a later one queued.
    fn dispatch_pending(&mut self, step: &mut CoreStep) {
        let queued: Vec<TaskName> = self.pending.keys().cloned().collect();
        for task in queued {
            if !self.conflicts(&task) {
                let params = self
                    .pending
                    .remove(&task)
                    .unwrap_or_else(|| unreachable!("queued task vanished"));
                self.start(step, task, params);
            }
        }
    }

    fn start(&mut self, step: &mut CoreStep, task: TaskName, params: RunParams) {
        let reason = params.reason;
        self.running.insert(task.clone(), params);
        step.commands.push(CoreCommand::StartRun { task, reason });
    }
}
