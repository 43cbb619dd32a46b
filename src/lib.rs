//! Asset pipeline orchestrator.
//!
//! Reads an `Assetpipe.toml` describing transforms (glob-matched file sets
//! piped through shell-command steps) and tasks (ordered compositions of
//! transforms and other tasks), then runs them in one of four modes: a
//! one-shot `build`, a `dev` session serving the source tree with
//! watch-triggered rebuilds and browser reload push, a `watch-build` session
//! doing the same over the production output, and `clean`.

pub mod cli;
pub mod config;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod fs;
pub mod graph;
pub mod logging;
pub mod registry;
pub mod serve;
pub mod types;
pub mod watch;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

use crate::cli::{CliArgs, Command};
use crate::config::ConfigFile;
use crate::engine::runtime::WatchRuntime;
use crate::engine::RuntimeEvent;
use crate::errors::Result;
use crate::exec::{CommandBackend, Executor};
use crate::fs::{FileSystem, RealFileSystem};
use crate::graph::TaskGraph;
use crate::registry::TransformRegistry;
use crate::serve::{DevServer, ReloadHub};
use crate::types::TriggerReason;
use crate::watch::{FileWatcher, Invalidator};

/// Fully wired pipeline for one project directory.
struct Pipeline {
    cfg: ConfigFile,
    root: PathBuf,
    registry: Arc<TransformRegistry>,
    graph: Arc<TaskGraph>,
    fs: Arc<dyn FileSystem>,
    executor: Arc<Executor>,
}

impl Pipeline {
    fn load(config_path: &Path) -> Result<Self> {
        let cfg = config::load_and_validate(config_path)?;
        // Globs and directories in the config are relative to its location.
        let root = config_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();

        let registry = Arc::new(TransformRegistry::from_config(&cfg)?);
        let graph = Arc::new(TaskGraph::from_config(&cfg, &registry)?);
        let fs: Arc<dyn FileSystem> = Arc::new(RealFileSystem);
        let executor = Arc::new(Executor::new(
            Arc::clone(&registry),
            Arc::clone(&graph),
            Arc::clone(&fs),
            Arc::new(CommandBackend::new()),
            root.clone(),
            cfg.project().build_dir.clone(),
        ));

        Ok(Self {
            cfg,
            root,
            registry,
            graph,
            fs,
            executor,
        })
    }

    fn print_plan(&self) -> Result<()> {
        println!("transforms:");
        for t in self.registry.iter() {
            println!(
                "  {}: {:?} -> {} ({} steps)",
                t.name(),
                t.input_patterns(),
                t.output().display(),
                t.steps().len()
            );
        }
        println!("tasks:");
        let mut names: Vec<&str> = self.graph.task_names().collect();
        names.sort_unstable();
        for name in names {
            println!("  {}: {}", name, self.graph.flatten(name)?.join(" -> "));
        }
        Ok(())
    }

    /// Long-lived session: watch the source tree, serve `serve_dir`, push
    /// reloads. `root_task` bounds which tasks changes may trigger.
    async fn watch_session(
        &self,
        root_task: &str,
        serve_dir: &str,
        port: u16,
    ) -> Result<()> {
        let hub = ReloadHub::new();
        let runtime = WatchRuntime::new(
            Arc::clone(&self.executor),
            Arc::clone(&self.graph),
            Arc::new(hub.clone()),
        );
        let events = runtime.handle();

        let invalidator = Arc::new(Invalidator::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.graph),
            Arc::clone(&self.fs),
            self.root.clone(),
            root_task,
            &self.cfg.serve().reload_only,
        )?);

        let watcher = FileWatcher::new(
            self.root.clone(),
            Path::new(&self.cfg.project().source_dir),
            invalidator,
            Duration::from_millis(self.cfg.project().debounce_ms),
            events.clone(),
        )?;
        tokio::spawn(watcher.run());

        let (server_stop_tx, server_stop_rx) = oneshot::channel::<()>();
        spawn_signal_handler(events.clone(), server_stop_tx);

        let server = DevServer::new(port, self.root.join(serve_dir), hub);
        let server_task = tokio::spawn(server.serve(async move {
            let _ = server_stop_rx.await;
        }));

        runtime.run().await?;

        match server_task.await {
            Ok(result) => result,
            Err(join_err) => {
                error!(error = %join_err, "dev server task aborted");
                Ok(())
            }
        }
    }
}

fn spawn_signal_handler(events: mpsc::UnboundedSender<RuntimeEvent>, server_stop: oneshot::Sender<()>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
            let _ = events.send(RuntimeEvent::ShutdownRequested);
            let _ = server_stop.send(());
        }
    });
}

/// Entry point shared by all subcommands. Errors bubble to `main`, which
/// maps them to exit codes.
pub async fn run(args: CliArgs) -> Result<()> {
    let pipeline = Pipeline::load(Path::new(&args.config))?;
    let project = pipeline.cfg.project().clone();
    let port = args.port.unwrap_or(pipeline.cfg.serve().port);

    if args.dry_run {
        pipeline.print_plan()?;
        return Ok(());
    }

    match args.command {
        Command::Clean => pipeline.executor.clean(),
        Command::Build => {
            if project.clean_before_build {
                pipeline.executor.clean()?;
            }
            pipeline
                .executor
                .run(&project.build_task, TriggerReason::Initial)
                .await?;
            Ok(())
        }
        Command::Dev => {
            pipeline
                .executor
                .run(&project.dev_task, TriggerReason::Initial)
                .await?;
            pipeline
                .watch_session(&project.dev_task, &project.source_dir, port)
                .await
        }
        Command::WatchBuild => {
            pipeline
                .executor
                .run(&project.dev_task, TriggerReason::Initial)
                .await?;
            if project.clean_before_build {
                pipeline.executor.clean()?;
            }
            pipeline
                .executor
                .run(&project.build_task, TriggerReason::Initial)
                .await?;
            pipeline
                .watch_session(&project.build_task, &project.build_dir, port)
                .await
        }
    }
}
