//! Async shell around [`CoreRuntime`].

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{error, info};

use crate::engine::core::CoreRuntime;
use crate::engine::{CoreCommand, RuntimeEvent};
use crate::errors::Result;
use crate::exec::Executor;
use crate::graph::TaskGraph;
use crate::types::{ReloadKind, TaskName, TransformName};

/// Push-side of the browser reload channel. Implemented by the dev server's
/// reload hub; tests substitute a recorder.
pub trait ReloadNotifier: Send + Sync {
    fn notify(&self, kind: ReloadKind);
}

/// Drives the scheduling core: receives events from the watcher, the
/// executor, and the signal handler, and carries out the core's commands by
/// spawning builds and pushing reload notifications.
pub struct WatchRuntime {
    executor: Arc<Executor>,
    graph: Arc<TaskGraph>,
    notifier: Arc<dyn ReloadNotifier>,
    events_tx: mpsc::UnboundedSender<RuntimeEvent>,
    events_rx: mpsc::UnboundedReceiver<RuntimeEvent>,
}

impl WatchRuntime {
    pub fn new(
        executor: Arc<Executor>,
        graph: Arc<TaskGraph>,
        notifier: Arc<dyn ReloadNotifier>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            executor,
            graph,
            notifier,
            events_tx,
            events_rx,
        }
    }

    /// Sender for feeding events in from the watcher and signal handlers.
    pub fn handle(&self) -> mpsc::UnboundedSender<RuntimeEvent> {
        self.events_tx.clone()
    }

    /// Run until a [`RuntimeEvent::ShutdownRequested`] arrives.
    pub async fn run(mut self) -> Result<()> {
        // The core serializes runs that touch the same leaf transform, so it
        // needs every task's flattened leaf set up front.
        let mut leaves: BTreeMap<TaskName, BTreeSet<TransformName>> = BTreeMap::new();
        for name in self.graph.task_names() {
            leaves.insert(
                name.to_string(),
                self.graph.flatten(name)?.iter().cloned().collect(),
            );
        }
        let mut core = CoreRuntime::new(leaves);

        while let Some(event) = self.events_rx.recv().await {
            let step = core.step(event);

            for command in step.commands {
                match command {
                    CoreCommand::StartRun { task, reason } => {
                        let executor = Arc::clone(&self.executor);
                        let events = self.events_tx.clone();
                        tokio::spawn(async move {
                            let success = match executor.run(&task, reason).await {
                                Ok(_) => true,
                                Err(err) => {
                                    // Watch sessions outlive failed builds;
                                    // the last good output keeps serving.
                                    error!(task = %task, error = %err, "build failed");
                                    false
                                }
                            };
                            let _ = events.send(RuntimeEvent::RunFinished { task, success });
                        });
                    }
                    CoreCommand::Notify(kind) => {
                        info!(%kind, "notifying connected browsers");
                        self.notifier.notify(kind);
                    }
                }
            }

            if !step.keep_running {
                break;
            }
        }

        info!("watch session stopped");
        Ok(())
    }
}
