use std::collections::BTreeMap;

use serde::Deserialize;

use crate::types::ReloadKind;

/// Top-level configuration as read from a TOML file, before validation.
///
/// ```toml
/// [project]
/// source_dir = "source"
/// build_dir = "build"
///
/// [serve]
/// port = 3000
/// reload_only = ["source/**/*.html", "source/**/*.js"]
///
/// [transform.css]
/// input = ["source/sass/**/*.scss"]
/// output = "source/css"
/// steps = ["sass {in} {out}", "csso {in} --output {out}"]
/// reload = "css-inject"
///
/// [task.dev]
/// steps = ["css"]
/// ```
///
/// All globs and directories are relative to the directory containing the
/// config file. All sections except `[transform]` and `[task]` are optional
/// and have defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    /// Project layout and behaviour from `[project]`.
    #[serde(default)]
    pub project: ProjectSection,

    /// Dev-server settings from `[serve]`.
    #[serde(default)]
    pub serve: ServeSection,

    /// All transforms from `[transform.<name>]`, keyed by name.
    #[serde(default)]
    pub transform: BTreeMap<String, TransformConfig>,

    /// All tasks from `[task.<name>]`, keyed by name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// `[project]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSection {
    /// Source tree root, relative to the config file.
    #[serde(default = "default_source_dir")]
    pub source_dir: String,

    /// Output tree root. Fully regenerable; `clean` deletes it entirely.
    #[serde(default = "default_build_dir")]
    pub build_dir: String,

    /// Root task for `dev` mode.
    #[serde(default = "default_dev_task")]
    pub dev_task: String,

    /// Root task for `build` mode.
    #[serde(default = "default_build_task")]
    pub build_task: String,

    /// Coalescing window for watch events, in milliseconds.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Whether `build` deletes the output tree before running.
    #[serde(default = "default_clean_before_build")]
    pub clean_before_build: bool,
}

fn default_source_dir() -> String {
    "source".to_string()
}

fn default_build_dir() -> String {
    "build".to_string()
}

fn default_dev_task() -> String {
    "dev".to_string()
}

fn default_build_task() -> String {
    "build".to_string()
}

fn default_debounce_ms() -> u64 {
    100
}

fn default_clean_before_build() -> bool {
    true
}

impl Default for ProjectSection {
    fn default() -> Self {
        Self {
            source_dir: default_source_dir(),
            build_dir: default_build_dir(),
            dev_task: default_dev_task(),
            build_task: default_build_task(),
            debounce_ms: default_debounce_ms(),
            clean_before_build: default_clean_before_build(),
        }
    }
}

/// `[serve]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ServeSection {
    /// Port for the dev server.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Globs served as-is: a change here skips rebuilding and goes straight
    /// to a reload notification (e.g. plain HTML or JS in dev mode).
    #[serde(default)]
    pub reload_only: Vec<String>,
}

fn default_port() -> u16 {
    3000
}

impl Default for ServeSection {
    fn default() -> Self {
        Self {
            port: default_port(),
            reload_only: Vec::new(),
        }
    }
}

/// `[transform.<name>]` section.
///
/// A transform is an opaque file-processing unit: input globs, an output
/// directory, and an ordered list of external command templates. The
/// orchestrator never interprets what a step does.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformConfig {
    /// Input globs, relative to the project root.
    pub input: Vec<String>,

    /// Output directory, relative to the project root.
    pub output: String,

    /// Ordered command templates. `{in}`/`{out}` run the command once per
    /// file; `{in_list}`/`{out_dir}` run it once over the whole file set.
    /// An empty list means "copy matched files verbatim".
    #[serde(default)]
    pub steps: Vec<String>,

    /// Free-form options, substitutable in steps as `{options.<key>}`.
    /// `output_ext` is understood by the executor as an extension rewrite.
    #[serde(default)]
    pub options: BTreeMap<String, String>,

    /// Notification kind after a successful watch-triggered rebuild.
    #[serde(default)]
    pub reload: ReloadKind,

    /// Only trigger when the aggregated content of the matched files
    /// actually changed.
    #[serde(default)]
    pub use_hash: bool,
}

/// `[task.<name>]` section.
///
/// A task is an ordered composition of transform and/or task names.
/// Composition is strictly sequential; later steps assume earlier outputs
/// exist (e.g. sprite assembly assumes SVG minification already ran).
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// Ordered references to transforms or other tasks.
    pub steps: Vec<String>,
}

/// Validated configuration.
///
/// Constructed only through `TryFrom<RawConfigFile>` (see
/// [`crate::config::validate`]), so holders can rely on name references and
/// the task graph being sound.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    project: ProjectSection,
    serve: ServeSection,
    transform: BTreeMap<String, TransformConfig>,
    task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    /// Used by the validation layer after all checks pass.
    pub(crate) fn new_unchecked(
        project: ProjectSection,
        serve: ServeSection,
        transform: BTreeMap<String, TransformConfig>,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self {
            project,
            serve,
            transform,
            task,
        }
    }

    pub fn project(&self) -> &ProjectSection {
        &self.project
    }

    pub fn serve(&self) -> &ServeSection {
        &self.serve
    }

    pub fn transforms(&self) -> &BTreeMap<String, TransformConfig> {
        &self.transform
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }
}
