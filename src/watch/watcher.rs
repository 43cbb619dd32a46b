//! Filesystem watching.
//!
//! Bridges `notify`'s callback world into the async runtime: a recommended
//! watcher pushes raw events into an unbounded channel, and an async loop
//! debounces them per classification before forwarding [`RuntimeEvent`]s to
//! the engine.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::engine::RuntimeEvent;
use crate::errors::{PipelineError, Result};
use crate::types::{ReloadKind, TaskName, TriggerReason};
use crate::watch::debounce::Debouncer;
use crate::watch::invalidator::{Invalidation, Invalidator};

/// Debounce key: one slot per scheduled action, so a burst touching many
/// files of one task releases a single trigger.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum WatchKey {
    Rebuild {
        task: TaskName,
        on_success: ReloadKind,
    },
    ReloadOnly {
        kind: ReloadKind,
    },
}

pub struct FileWatcher {
    // Dropped with the watcher; keeps the notify backend alive.
    _watcher: RecommendedWatcher,
    raw_rx: mpsc::UnboundedReceiver<Event>,
    invalidator: Arc<Invalidator>,
    root: PathBuf,
    debounce: Duration,
    events: mpsc::UnboundedSender<RuntimeEvent>,
}

impl FileWatcher {
    /// Watch `watch_dir` (recursively) under `root` and forward classified
    /// changes to `events`.
    pub fn new(
        root: impl Into<PathBuf>,
        watch_dir: &Path,
        invalidator: Arc<Invalidator>,
        debounce: Duration,
        events: mpsc::UnboundedSender<RuntimeEvent>,
    ) -> Result<Self> {
        let root = root.into();
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(err) => warn!(error = %err, "watch backend error"),
            }
        })
        .map_err(|e| PipelineError::Other(e.into()))?;

        let target = root.join(watch_dir);
        watcher
            .watch(&target, RecursiveMode::Recursive)
            .map_err(|e| PipelineError::Other(e.into()))?;

        info!(dir = ?target, debounce_ms = debounce.as_millis() as u64, "watching for changes");

        // Notify reports absolute paths; match them against the absolute root.
        let root = std::fs::canonicalize(&root).unwrap_or(root);

        Ok(Self {
            _watcher: watcher,
            raw_rx,
            invalidator,
            root,
            debounce,
            events,
        })
    }

    /// Consume raw events until the engine side closes or the watcher drops.
    pub async fn run(self) {
        let Self {
            _watcher,
            mut raw_rx,
            invalidator,
            root,
            debounce,
            events,
        } = self;

        let mut debouncer: Debouncer<WatchKey> = Debouncer::new(debounce);
        // Last changed path per key, for the hash suppression check.
        let mut last_paths: BTreeMap<WatchKey, String> = BTreeMap::new();

        loop {
            let deadline = debouncer.next_deadline();

            tokio::select! {
                raw = raw_rx.recv() => {
                    let Some(event) = raw else { break };
                    if !is_mutation(&event.kind) {
                        continue;
                    }
                    let now = Instant::now();
                    for path in &event.paths {
                        let Some(rel) = relative(&root, path) else { continue };
                        match invalidator.classify(&rel) {
                            Invalidation::Rebuild { task, on_success } => {
                                let key = WatchKey::Rebuild { task, on_success };
                                last_paths.insert(key.clone(), rel.clone());
                                debouncer.record(key, now);
                            }
                            Invalidation::ReloadOnly { kind } => {
                                debouncer.record(WatchKey::ReloadOnly { kind }, now);
                            }
                            Invalidation::Ignore => {}
                        }
                    }
                }
                _ = sleep_until_opt(deadline), if deadline.is_some() => {
                    for key in debouncer.take_due(Instant::now()) {
                        if dispatch(&invalidator, &events, &key, &last_paths).is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }
}

fn dispatch(
    invalidator: &Invalidator,
    events: &mpsc::UnboundedSender<RuntimeEvent>,
    key: &WatchKey,
    last_paths: &BTreeMap<WatchKey, String>,
) -> std::result::Result<(), ()> {
    let event = match key {
        WatchKey::Rebuild { task, on_success } => {
            if let Some(path) = last_paths.get(key) {
                match invalidator.worth_rebuilding(task, path) {
                    Ok(false) => {
                        debug!(task = %task, path = %path, "inputs unchanged by hash; skipping rebuild");
                        return Ok(());
                    }
                    Ok(true) => {}
                    Err(err) => warn!(error = %err, "hash check failed; rebuilding anyway"),
                }
            }
            info!(task = %task, "change detected; scheduling rebuild");
            RuntimeEvent::TaskTriggered {
                task: task.clone(),
                on_success: *on_success,
                reason: TriggerReason::FileWatch,
            }
        }
        WatchKey::ReloadOnly { kind } => {
            info!(%kind, "reload-only change detected");
            RuntimeEvent::ReloadRequested { kind: *kind }
        }
    };

    events.send(event).map_err(|_| ())
}

fn relative(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    Some(rel.to_string_lossy().replace('\\', "/"))
}

fn is_mutation(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    )
}

async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
        None => std::future::pending().await,
    }
}
