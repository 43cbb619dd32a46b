//! Task executor.
//!
//! `run(task)` resolves the task's cached leaf sequence and executes each
//! transform's steps in declared order. A transform's first step consumes
//! the files matched by its input globs; every later step consumes the file
//! set produced by the previous step, staged under
//! `.assetpipe/stage/<transform>/<n>`. Outputs are published into the
//! transform's output directory only after the whole transform succeeds, so
//! a failed run never partially overwrites previously-written good files.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Instant, SystemTime};

use anyhow::{anyhow, Context};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::errors::{PipelineError, Result};
use crate::exec::backend::{StepBackend, StepInvocation};
use crate::exec::build_run::{BuildRun, TransformOutcome, TransformStatus};
use crate::exec::step::{self, StepMode};
use crate::fs::{collect_files, FileSystem};
use crate::graph::TaskGraph;
use crate::registry::{Transform, TransformRegistry};
use crate::types::TriggerReason;

/// Directory for intermediate step outputs, relative to the project root.
const STAGE_DIR: &str = ".assetpipe/stage";

pub struct Executor {
    registry: Arc<TransformRegistry>,
    graph: Arc<TaskGraph>,
    fs: Arc<dyn FileSystem>,
    backend: Arc<dyn StepBackend>,
    root: PathBuf,
    build_dir: PathBuf,
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("root", &self.root)
            .field("build_dir", &self.build_dir)
            .finish_non_exhaustive()
    }
}

impl Executor {
    pub fn new(
        registry: Arc<TransformRegistry>,
        graph: Arc<TaskGraph>,
        fs: Arc<dyn FileSystem>,
        backend: Arc<dyn StepBackend>,
        root: impl Into<PathBuf>,
        build_dir: impl Into<PathBuf>,
    ) -> Self {
        let root = root.into();
        let build_dir = root.join(build_dir.into());
        Self {
            registry,
            graph,
            fs,
            backend,
            root,
            build_dir,
        }
    }

    /// Run one task to completion.
    ///
    /// The transform sequence is strictly ordered; the first failing step
    /// aborts the remaining steps and transforms of this run and surfaces as
    /// [`PipelineError::BuildFailed`]. Whether that is fatal is the caller's
    /// policy (one-shot build: yes; watch session: log and keep serving).
    pub async fn run(&self, task: &str, reason: TriggerReason) -> Result<BuildRun> {
        let leaves: Vec<String> = self.graph.flatten(task)?.to_vec();
        let started_at = SystemTime::now();
        let started = Instant::now();
        let mut outcomes: Vec<TransformOutcome> = Vec::with_capacity(leaves.len());

        info!(task = %task, ?reason, transforms = leaves.len(), "build run started");

        for name in leaves {
            let transform = self.registry.resolve(&name)?;

            match self.run_transform(transform).await {
                Ok(files) => {
                    info!(transform = %name, files, "transform succeeded");
                    outcomes.push(TransformOutcome {
                        transform: name.clone(),
                        status: TransformStatus::Succeeded { files },
                    });
                }
                Err((step_index, err)) => {
                    warn!(
                        task = %task,
                        transform = %name,
                        step = step_index,
                        error = %format!("{err:#}"),
                        "transform failed; aborting remaining steps of this run"
                    );
                    outcomes.push(TransformOutcome {
                        transform: name.clone(),
                        status: TransformStatus::Failed {
                            step: step_index,
                            error: format!("{err:#}"),
                        },
                    });
                    return Err(PipelineError::BuildFailed {
                        transform: name,
                        source: err,
                    });
                }
            }
        }

        let run = BuildRun {
            task: task.to_string(),
            reason,
            started_at,
            duration: started.elapsed(),
            outcomes,
        };

        info!(
            task = %task,
            files = run.published_files(),
            elapsed_ms = run.duration.as_millis() as u64,
            "build run finished"
        );

        Ok(run)
    }

    /// Delete the output tree. It is fully regenerable.
    pub fn clean(&self) -> Result<()> {
        info!(dir = ?self.build_dir, "cleaning output tree");
        self.fs.remove_dir_all(&self.build_dir)?;
        Ok(())
    }

    /// Execute one transform: stage its file set through every step, then
    /// publish. Returns the number of published files, or the failing step
    /// index with the underlying error.
    async fn run_transform(&self, transform: &Transform) -> std::result::Result<usize, (usize, anyhow::Error)> {
        let inputs = transform
            .matched_inputs(self.fs.as_ref(), &self.root)
            .map_err(|e| (0, e.into()))?;

        if inputs.is_empty() {
            warn!(
                transform = %transform.name(),
                patterns = ?transform.input_patterns(),
                "no files matched input globs; nothing to do"
            );
            return Ok(0);
        }

        // Map each input to its path relative to the matching pattern's base.
        let output_ext = transform.options().get("output_ext");
        let mut current: Vec<(PathBuf, PathBuf)> = Vec::with_capacity(inputs.len());
        for path in inputs {
            let rel_root = path
                .strip_prefix(&self.root)
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|_| PathBuf::from(path.file_name().unwrap_or_default()));
            let rel_str = rel_root.to_string_lossy().replace('\\', "/");
            let base = transform.base_for(&rel_str);
            let mut rel_out = rel_root
                .strip_prefix(&base)
                .map(|p| p.to_path_buf())
                .unwrap_or(rel_root.clone());
            if let (Some(ext), false) = (output_ext, transform.steps().is_empty()) {
                rel_out.set_extension(ext);
            }
            current.push((path, rel_out));
        }

        let stage_base = self.root.join(STAGE_DIR).join(transform.name());
        self.fs
            .remove_dir_all(&stage_base)
            .map_err(|e| (0, e))?;

        for (step_index, template) in transform.steps().iter().enumerate() {
            let stage_dir = stage_base.join(step_index.to_string());
            self.fs
                .create_dir_all(&stage_dir)
                .map_err(|e| (step_index, e))?;

            self.run_step(transform, step_index, template, &current, &stage_dir)
                .await
                .map_err(|e| (step_index, e))?;

            // The next step consumes whatever this step actually produced.
            current = self
                .stage_contents(&stage_dir)
                .map_err(|e| (step_index, e))?;

            if current.is_empty() {
                warn!(
                    transform = %transform.name(),
                    step = step_index,
                    "step produced no files"
                );
            }
        }

        // Publish. Only reached when every step succeeded.
        let out_dir = self.root.join(transform.output());
        let mut published = 0usize;
        for (src, rel) in current.iter() {
            let dest = out_dir.join(rel);
            self.fs
                .copy(src, &dest)
                .with_context(|| format!("publishing {rel:?} for transform '{}'", transform.name()))
                .map_err(|e| (transform.steps().len(), e))?;
            published += 1;
        }

        debug!(transform = %transform.name(), published, "published outputs");
        Ok(published)
    }

    async fn run_step(
        &self,
        transform: &Transform,
        step_index: usize,
        template: &str,
        current: &[(PathBuf, PathBuf)],
        stage_dir: &Path,
    ) -> anyhow::Result<()> {
        match step::mode_of(template) {
            StepMode::WholeSet => {
                let inputs: Vec<&PathBuf> = current.iter().map(|(p, _)| p).collect();
                let command =
                    step::render_whole_set(template, &inputs, stage_dir, transform.options())?;
                self.backend
                    .run_step(StepInvocation {
                        transform: transform.name().to_string(),
                        step_index,
                        command,
                    })
                    .await
            }
            StepMode::PerFile => {
                // Unordered within one transform's file set.
                let mut join_set: JoinSet<anyhow::Result<()>> = JoinSet::new();

                for (input, rel) in current.iter() {
                    let out = stage_dir.join(rel);
                    if let Some(parent) = out.parent() {
                        self.fs.create_dir_all(parent)?;
                    }
                    let command = step::render_per_file(
                        template,
                        input,
                        &out,
                        stage_dir,
                        transform.options(),
                    )?;
                    let invocation = StepInvocation {
                        transform: transform.name().to_string(),
                        step_index,
                        command,
                    };
                    let backend = Arc::clone(&self.backend);
                    join_set.spawn(async move { backend.run_step(invocation).await });
                }

                let mut first_err: Option<anyhow::Error> = None;
                while let Some(joined) = join_set.join_next().await {
                    let result = joined.map_err(|e| anyhow!("step task panicked: {e}"))?;
                    if let Err(err) = result {
                        // Let in-flight siblings finish; report the first failure.
                        if first_err.is_none() {
                            first_err = Some(err);
                        }
                    }
                }

                match first_err {
                    Some(err) => Err(err),
                    None => Ok(()),
                }
            }
        }
    }

    /// List a stage directory's files with their stage-relative paths.
    fn stage_contents(&self, stage_dir: &Path) -> anyhow::Result<Vec<(PathBuf, PathBuf)>> {
        let files = collect_files(self.fs.as_ref(), stage_dir)?;
        let mut out = Vec::with_capacity(files.len());
        for f in files {
            let rel = f
                .strip_prefix(stage_dir)
                .map(|p| p.to_path_buf())
                .with_context(|| format!("stage path {f:?} outside stage dir"))?;
            out.push((f, rel));
        }
        Ok(out)
    }
}
