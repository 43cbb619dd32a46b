//! Change classification.
//!
//! Maps a debounced file change to the smallest task that rebuilds it.
//! Candidate tasks are the watch session's root task and its transitive
//! subtasks; among candidates whose leaf sequence contains a transform
//! matching the changed path, the one with the fewest leaf transforms wins
//! (name order breaks ties). Paths matching only the `[serve].reload_only`
//! globs skip the rebuild and go straight to a browser notification.

use std::sync::{Arc, Mutex};

use globset::GlobSet;
use tracing::debug;

use crate::errors::Result;
use crate::fs::FileSystem;
use crate::graph::TaskGraph;
use crate::registry::{self, TransformRegistry};
use crate::types::{ReloadKind, TaskName};
use crate::watch::hash::{aggregate_hash, HashStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Rebuild `task`; on success notify the browser with `on_success`.
    Rebuild {
        task: TaskName,
        on_success: ReloadKind,
    },
    /// No rebuild needed; notify the browser directly.
    ReloadOnly { kind: ReloadKind },
    /// The path is not part of the pipeline.
    Ignore,
}

pub struct Invalidator {
    registry: Arc<TransformRegistry>,
    graph: Arc<TaskGraph>,
    fs: Arc<dyn FileSystem>,
    root: std::path::PathBuf,
    /// Candidate tasks, precomputed with their leaf sequences.
    candidates: Vec<(TaskName, Vec<String>)>,
    reload_only: GlobSet,
    hashes: Mutex<HashStore>,
}

impl std::fmt::Debug for Invalidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Invalidator")
            .field("candidates", &self.candidates)
            .finish_non_exhaustive()
    }
}

impl Invalidator {
    pub fn new(
        registry: Arc<TransformRegistry>,
        graph: Arc<TaskGraph>,
        fs: Arc<dyn FileSystem>,
        root: impl Into<std::path::PathBuf>,
        root_task: &str,
        reload_only_patterns: &[String],
    ) -> Result<Self> {
        let mut candidates = Vec::new();
        for task in graph.subtasks_of(root_task)? {
            let leaves = graph.flatten(&task)?.to_vec();
            candidates.push((task, leaves));
        }
        // Fewest leaves first, then name, so classification can take the
        // first hit.
        candidates.sort_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| a.0.cmp(&b.0)));

        let reload_only = registry::build_globset(reload_only_patterns)?;

        Ok(Self {
            registry,
            graph,
            fs,
            root: root.into(),
            candidates,
            reload_only,
            hashes: Mutex::new(HashStore::new()),
        })
    }

    /// Classify a changed path, given relative to the project root with `/`
    /// separators.
    pub fn classify(&self, rel_path: &str) -> Invalidation {
        if rel_path.starts_with(".assetpipe/") {
            return Invalidation::Ignore;
        }

        // A transform's own published outputs do not re-trigger it: a
        // self-feeding transform (output inside its input globs) would
        // otherwise rebuild forever off its own publishes.
        let matching: Vec<&str> = self
            .registry
            .iter()
            .filter(|t| t.matches(rel_path) && !under_dir(rel_path, t.output()))
            .map(|t| t.name())
            .collect();

        for (task, leaves) in &self.candidates {
            if matching.iter().any(|m| leaves.iter().any(|l| l == m)) {
                return Invalidation::Rebuild {
                    task: task.clone(),
                    on_success: self.reload_kind_for(leaves),
                };
            }
        }

        // No task in this session rebuilds the path, but it may still be
        // served as-is: a transform outside the session's closure does not
        // shadow the reload-only globs.
        if self.reload_only.is_match(rel_path) {
            let kind = if rel_path.ends_with(".css") {
                ReloadKind::CssInject
            } else {
                ReloadKind::FullReload
            };
            return Invalidation::ReloadOnly { kind };
        }

        if matching.is_empty() {
            debug!(path = %rel_path, "change matched no transform; ignoring");
        } else {
            debug!(
                path = %rel_path,
                transforms = ?matching,
                "change matched transforms outside the session's task; ignoring"
            );
        }
        Invalidation::Ignore
    }

    /// Whether a rebuild of `task` would do any work. Transforms marked
    /// `use_hash` are compared against their last-seen input digest; a task
    /// whose matching transforms are all hash-stable is skipped.
    pub fn worth_rebuilding(&self, task: &str, rel_path: &str) -> Result<bool> {
        let leaves = self.graph.flatten(task)?;
        let mut any_hashed_match = false;

        for name in leaves {
            let transform = self.registry.resolve(name)?;
            if !transform.matches(rel_path) {
                continue;
            }
            if !transform.use_hash() {
                return Ok(true);
            }
            any_hashed_match = true;
            let digest = aggregate_hash(self.fs.as_ref(), &self.root, transform)?;
            let changed = self
                .hashes
                .lock()
                .expect("hash store lock poisoned")
                .update(name, digest);
            if changed {
                return Ok(true);
            }
        }

        // No leaf matched the path at all: conservatively rebuild.
        Ok(!any_hashed_match)
    }

    fn reload_kind_for(&self, leaves: &[String]) -> ReloadKind {
        let all_css = !leaves.is_empty()
            && leaves.iter().all(|name| {
                self.registry
                    .resolve(name)
                    .map(|t| t.reload() == ReloadKind::CssInject)
                    .unwrap_or(false)
            });
        if all_css {
            ReloadKind::CssInject
        } else {
            ReloadKind::FullReload
        }
    }
}

/// Whether `rel_path` lies strictly inside `dir` (both project-relative).
fn under_dir(rel_path: &str, dir: &std::path::Path) -> bool {
    let dir = dir.to_string_lossy().replace('\\', "/");
    let dir = dir.trim_end_matches('/');
    rel_path
        .strip_prefix(dir)
        .is_some_and(|rest| rest.starts_with('/'))
}
