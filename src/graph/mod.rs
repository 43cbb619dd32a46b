//! Task graph: named, ordered compositions of transforms and other tasks.
//!
//! Declaration (`TaskGraphBuilder::define_task`) is separated from
//! resolution (`build`), so cycle detection and flattening happen once,
//! statically, before anything executes. A task's effective leaf-transform
//! sequence is computed at build time and cached.

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;
use tracing::debug;

use crate::config::ConfigFile;
use crate::errors::{PipelineError, Result};
use crate::registry::TransformRegistry;
use crate::types::{TaskName, TransformName};

/// A single resolved step of a task: either a leaf transform or a sub-task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepRef {
    Transform(TransformName),
    Task(TaskName),
}

/// Collects task declarations before resolution.
#[derive(Debug, Default)]
pub struct TaskGraphBuilder {
    tasks: BTreeMap<TaskName, Vec<String>>,
}

impl TaskGraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a task as an ordered list of transform-or-task names.
    ///
    /// Sequential composition only: later steps assume earlier outputs exist.
    pub fn define_task(
        &mut self,
        name: impl Into<TaskName>,
        steps: Vec<String>,
    ) -> Result<()> {
        let name = name.into();
        if self.tasks.contains_key(&name) {
            return Err(PipelineError::ConfigError(format!(
                "task '{name}' defined twice"
            )));
        }
        self.tasks.insert(name, steps);
        Ok(())
    }

    /// Resolve all references against the registry, reject cycles, and
    /// pre-compute every task's flattened leaf sequence.
    pub fn build(self, registry: &TransformRegistry) -> Result<TaskGraph> {
        // Resolve each step name to a transform or task reference.
        let mut resolved: BTreeMap<TaskName, Vec<StepRef>> = BTreeMap::new();

        for (name, steps) in self.tasks.iter() {
            let mut refs = Vec::with_capacity(steps.len());
            for step in steps {
                if self.tasks.contains_key(step) {
                    refs.push(StepRef::Task(step.clone()));
                } else {
                    // Surfaces UnknownTransform for dangling names.
                    registry.resolve(step)?;
                    refs.push(StepRef::Transform(step.clone()));
                }
            }
            resolved.insert(name.clone(), refs);
        }

        // Cycle detection over task -> sub-task edges.
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in resolved.keys() {
            graph.add_node(name.as_str());
        }
        for (name, refs) in resolved.iter() {
            for r in refs {
                if let StepRef::Task(sub) = r {
                    graph.add_edge(sub.as_str(), name.as_str(), ());
                }
            }
        }
        if let Err(cycle) = toposort(&graph, None) {
            return Err(PipelineError::CyclicDependency(
                cycle.node_id().to_string(),
            ));
        }

        // Flatten every task once; the graph is acyclic so plain recursion
        // with memoisation terminates.
        let mut flattened: BTreeMap<TaskName, Vec<TransformName>> = BTreeMap::new();
        for name in resolved.keys() {
            flatten_into(name, &resolved, &mut flattened);
        }

        debug!(tasks = resolved.len(), "task graph built");

        Ok(TaskGraph {
            steps: resolved,
            flattened,
        })
    }
}

fn flatten_into(
    name: &str,
    resolved: &BTreeMap<TaskName, Vec<StepRef>>,
    flattened: &mut BTreeMap<TaskName, Vec<TransformName>>,
) {
    if flattened.contains_key(name) {
        return;
    }

    let mut leaves: Vec<TransformName> = Vec::new();
    for r in resolved.get(name).map(|v| v.as_slice()).unwrap_or(&[]) {
        match r {
            StepRef::Transform(t) => {
                // A transform referenced twice along one expansion runs
                // once, at its first position.
                if !leaves.contains(t) {
                    leaves.push(t.clone());
                }
            }
            StepRef::Task(sub) => {
                flatten_into(sub, resolved, flattened);
                for t in flattened.get(sub.as_str()).cloned().unwrap_or_default() {
                    if !leaves.contains(&t) {
                        leaves.push(t);
                    }
                }
            }
        }
    }

    flattened.insert(name.to_string(), leaves);
}

/// Resolved, immutable task graph with cached flattenings.
#[derive(Debug, Clone)]
pub struct TaskGraph {
    steps: BTreeMap<TaskName, Vec<StepRef>>,
    flattened: BTreeMap<TaskName, Vec<TransformName>>,
}

impl TaskGraph {
    /// Build directly from a validated config and its registry.
    pub fn from_config(cfg: &ConfigFile, registry: &TransformRegistry) -> Result<Self> {
        let mut builder = TaskGraphBuilder::new();
        for (name, task) in cfg.tasks().iter() {
            builder.define_task(name.clone(), task.steps.clone())?;
        }
        builder.build(registry)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.contains_key(name)
    }

    pub fn task_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(|s| s.as_str())
    }

    /// Ordered leaf-transform sequence for a task.
    pub fn flatten(&self, name: &str) -> Result<&[TransformName]> {
        self.flattened
            .get(name)
            .map(|v| v.as_slice())
            .ok_or_else(|| PipelineError::UnknownTask(name.to_string()))
    }

    /// The task itself plus every task transitively referenced by it.
    pub fn subtasks_of(&self, root: &str) -> Result<Vec<TaskName>> {
        if !self.steps.contains_key(root) {
            return Err(PipelineError::UnknownTask(root.to_string()));
        }

        let mut out: Vec<TaskName> = Vec::new();
        let mut stack = vec![root.to_string()];

        while let Some(name) = stack.pop() {
            if out.contains(&name) {
                continue;
            }
            for r in self.steps.get(&name).map(|v| v.as_slice()).unwrap_or(&[]) {
                if let StepRef::Task(sub) = r {
                    stack.push(sub.clone());
                }
            }
            out.push(name);
        }

        out.sort();
        Ok(out)
    }
}
