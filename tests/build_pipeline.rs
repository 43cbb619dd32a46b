//! End-to-end builds over a real directory tree with real shell commands.
#![cfg(unix)]

mod common;

use std::error::Error;
use std::fs;
use std::sync::Arc;

use assetpipe::config::load_and_validate;
use assetpipe::errors::PipelineError;
use assetpipe::exec::{CommandBackend, Executor};
use assetpipe::fs::RealFileSystem;
use assetpipe::graph::TaskGraph;
use assetpipe::registry::TransformRegistry;
use assetpipe::types::TriggerReason;

type TestResult = Result<(), Box<dyn Error>>;

fn project(config: &str, files: &[(&str, &str)]) -> Result<tempfile::TempDir, Box<dyn Error>> {
    let dir = tempfile::tempdir()?;
    fs::write(dir.path().join("Assetpipe.toml"), config)?;
    for (rel, contents) in files {
        let path = dir.path().join(rel);
        fs::create_dir_all(path.parent().unwrap())?;
        fs::write(path, contents)?;
    }
    Ok(dir)
}

fn executor_for(dir: &tempfile::TempDir) -> Result<Executor, Box<dyn Error>> {
    let cfg = load_and_validate(dir.path().join("Assetpipe.toml"))?;
    let registry = Arc::new(TransformRegistry::from_config(&cfg)?);
    let graph = Arc::new(TaskGraph::from_config(&cfg, &registry)?);
    Ok(Executor::new(
        registry,
        graph,
        Arc::new(RealFileSystem),
        Arc::new(CommandBackend::new()),
        dir.path(),
        cfg.project().build_dir.clone(),
    ))
}

const SITE: &str = r#"
[project]
source_dir = "source"
build_dir = "build"
dev_task = "dev"
build_task = "build"

[transform.css]
input = ["source/sass/**/*.scss"]
output = "source/css"
steps = ["tr 'a-z' 'A-Z' < {in} > {out}"]
options = { output_ext = "css" }
reload = "css-inject"

[transform.html]
input = ["source/**/*.html"]
output = "build"
steps = []

[transform.assets]
input = ["source/css/**/*.css"]
output = "build/css"
steps = []

[task.styles]
steps = ["css"]

[task.dev]
steps = ["styles"]

[task.build]
steps = ["dev", "html", "assets"]
"#;

#[tokio::test]
async fn build_chain_transforms_and_copies() -> TestResult {
    common::init_tracing();
    let dir = project(
        SITE,
        &[
            ("source/sass/style.scss", "body{color:red}"),
            ("source/sass/pages/about.scss", "h1{}"),
            ("source/index.html", "<html></html>"),
        ],
    )?;
    let exec = executor_for(&dir)?;

    let run = exec.run("build", TriggerReason::Initial).await?;
    assert!(run.is_success());

    // The css transform ran first, so its output was picked up by "assets".
    assert_eq!(
        fs::read_to_string(dir.path().join("source/css/style.css"))?,
        "BODY{COLOR:RED}"
    );
    // Nested input keeps its path relative to the glob's literal prefix.
    assert_eq!(
        fs::read_to_string(dir.path().join("source/css/pages/about.css"))?,
        "H1{}"
    );
    assert_eq!(
        fs::read_to_string(dir.path().join("build/css/style.css"))?,
        "BODY{COLOR:RED}"
    );
    // Verbatim copy keeps the source-relative layout.
    assert_eq!(
        fs::read_to_string(dir.path().join("build/index.html"))?,
        "<html></html>"
    );
    Ok(())
}

#[tokio::test]
async fn failing_tool_keeps_previous_published_output() -> TestResult {
    common::init_tracing();
    let config = SITE.replace("tr 'a-z' 'A-Z' <", "definitely-not-a-real-tool <");
    let dir = project(&config, &[("source/sass/style.scss", "body{}")])?;
    fs::create_dir_all(dir.path().join("source/css"))?;
    fs::write(dir.path().join("source/css/style.css"), "OLD-GOOD")?;

    let exec = executor_for(&dir)?;
    let err = exec.run("dev", TriggerReason::FileWatch).await.unwrap_err();
    assert!(
        matches!(err, PipelineError::BuildFailed { ref transform, .. } if transform == "css"),
        "got: {err}"
    );

    assert_eq!(
        fs::read_to_string(dir.path().join("source/css/style.css"))?,
        "OLD-GOOD"
    );
    Ok(())
}

#[tokio::test]
async fn clean_removes_only_the_build_tree() -> TestResult {
    let dir = project(
        SITE,
        &[
            ("source/index.html", "<html></html>"),
            ("build/stale.txt", "stale"),
        ],
    )?;
    let exec = executor_for(&dir)?;

    exec.clean()?;
    assert!(!dir.path().join("build").exists());
    assert!(dir.path().join("source/index.html").exists());
    Ok(())
}

#[tokio::test]
async fn rerunning_build_is_idempotent() -> TestResult {
    let dir = project(SITE, &[("source/sass/style.scss", "a{b:c}")])?;
    let exec = executor_for(&dir)?;

    exec.run("dev", TriggerReason::Initial).await?;
    let first = fs::read_to_string(dir.path().join("source/css/style.css"))?;
    exec.run("dev", TriggerReason::Initial).await?;
    let second = fs::read_to_string(dir.path().join("source/css/style.css"))?;
    assert_eq!(first, second);
    Ok(())
}
