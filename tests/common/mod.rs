//! Shared helpers for the integration suites.
#![allow(dead_code)]

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use assetpipe::engine::runtime::ReloadNotifier;
use assetpipe::exec::{StepBackend, StepInvocation};
use assetpipe::fs::mock::MockFileSystem;
use assetpipe::types::ReloadKind;

static TRACING: Once = Once::new();

pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "warn".into()),
            )
            .with_test_writer()
            .try_init();
    });
}

/// A config file skeleton with one slot for transforms and one for tasks.
pub fn config_toml(transforms: &str, tasks: &str) -> String {
    format!(
        r#"
[project]
source_dir = "source"
build_dir = "build"
dev_task = "dev"
build_task = "build"
debounce_ms = 50

[serve]
port = 3099

{transforms}

{tasks}
"#
    )
}

/// Backend that copies `fake '<in>' '<out>'` within a mock filesystem,
/// counting invocations. A command containing `boom` fails. An optional
/// gate holds every invocation until released, for scheduling tests.
#[derive(Debug)]
pub struct FakeStepBackend {
    pub fs: MockFileSystem,
    pub invocations: AtomicUsize,
    gate: Option<Arc<tokio::sync::Semaphore>>,
}

impl FakeStepBackend {
    pub fn new(fs: MockFileSystem) -> Self {
        Self {
            fs,
            invocations: AtomicUsize::new(0),
            gate: None,
        }
    }

    /// Invocations block until a permit is added to the returned semaphore.
    pub fn gated(fs: MockFileSystem) -> (Self, Arc<tokio::sync::Semaphore>) {
        let gate = Arc::new(tokio::sync::Semaphore::new(0));
        (
            Self {
                fs,
                invocations: AtomicUsize::new(0),
                gate: Some(Arc::clone(&gate)),
            },
            gate,
        )
    }

    pub fn invocation_count(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }
}

impl StepBackend for FakeStepBackend {
    fn run_step(
        &self,
        invocation: StepInvocation,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(async move {
            if let Some(gate) = &self.gate {
                let permit = gate.acquire().await?;
                permit.forget();
            }
            self.invocations.fetch_add(1, Ordering::SeqCst);

            if invocation.command.contains("boom") {
                anyhow::bail!("simulated step failure");
            }

            let parts: Vec<&str> = invocation.command.split_whitespace().collect();
            let input = PathBuf::from(parts[1].trim_matches('\''));
            let output = PathBuf::from(parts[2].trim_matches('\''));
            let mut contents = self.fs.contents(&input).unwrap_or_default();
            contents.extend_from_slice(b"!");
            self.fs.add_file(output, contents);
            Ok(())
        })
    }
}

/// Records every pushed reload kind.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    pushed: Mutex<Vec<ReloadKind>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pushed(&self) -> Vec<ReloadKind> {
        self.pushed.lock().unwrap().clone()
    }
}

impl ReloadNotifier for RecordingNotifier {
    fn notify(&self, kind: ReloadKind) {
        self.pushed.lock().unwrap().push(kind);
    }
}
