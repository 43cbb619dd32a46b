//! Transform registry.
//!
//! A [`Transform`] is a declared, named file-processing unit: input globs, an
//! output directory and an ordered list of opaque steps. The registry is
//! built once at startup from the validated config, compiles every glob, and
//! is passed by reference into the executor and the watcher.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::config::model::TransformConfig;
use crate::config::ConfigFile;
use crate::errors::{PipelineError, Result};
use crate::fs::{collect_files, FileSystem};
use crate::types::{ReloadKind, TransformName};

/// A single registered transform. Immutable once registered.
#[derive(Clone)]
pub struct Transform {
    name: TransformName,
    input_patterns: Vec<String>,
    input_set: GlobSet,
    /// Per-pattern matcher plus the pattern's base directory (the literal
    /// part before the first wildcard). Output placement preserves each
    /// file's path relative to its pattern's base.
    pattern_bases: Vec<(globset::GlobMatcher, PathBuf)>,
    output: PathBuf,
    steps: Vec<String>,
    options: BTreeMap<String, String>,
    reload: ReloadKind,
    use_hash: bool,
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transform")
            .field("name", &self.name)
            .field("input", &self.input_patterns)
            .field("output", &self.output)
            .finish_non_exhaustive()
    }
}

impl Transform {
    pub(crate) fn from_config(name: &str, cfg: &TransformConfig) -> Result<Self> {
        let input_set = build_globset(&cfg.input)
            .with_context(|| format!("compiling input globs for transform '{name}'"))?;

        let mut pattern_bases = Vec::with_capacity(cfg.input.len());
        for pat in cfg.input.iter() {
            let glob = Glob::new(pat)
                .with_context(|| format!("invalid glob pattern in transform '{name}': {pat}"))?;
            pattern_bases.push((glob.compile_matcher(), pattern_base(pat)));
        }

        Ok(Self {
            name: name.to_string(),
            input_patterns: cfg.input.clone(),
            input_set,
            pattern_bases,
            output: PathBuf::from(&cfg.output),
            steps: cfg.steps.clone(),
            options: cfg.options.clone(),
            reload: cfg.reload,
            use_hash: cfg.use_hash,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_patterns(&self) -> &[String] {
        &self.input_patterns
    }

    /// Output directory, relative to the project root.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Ordered opaque step command templates. Empty means "copy verbatim".
    pub fn steps(&self) -> &[String] {
        &self.steps
    }

    pub fn options(&self) -> &BTreeMap<String, String> {
        &self.options
    }

    /// Notification kind after a successful watch-triggered rebuild.
    pub fn reload(&self) -> ReloadKind {
        self.reload
    }

    pub fn use_hash(&self) -> bool {
        self.use_hash
    }

    /// Base directory for a matched path, relative to the project root.
    ///
    /// The `base` option overrides pattern-derived bases (the equivalent of
    /// declaring copies against the source root).
    pub fn base_for(&self, rel_path: &str) -> PathBuf {
        if let Some(base) = self.options.get("base") {
            return PathBuf::from(base.trim_end_matches('/'));
        }
        for (matcher, base) in self.pattern_bases.iter() {
            if matcher.is_match(rel_path) {
                return base.clone();
            }
        }
        PathBuf::new()
    }

    /// Whether this transform is interested in the given path, relative to
    /// the project root with forward slashes (e.g. `"source/sass/a.scss"`).
    pub fn matches(&self, rel_path: &str) -> bool {
        self.input_set.is_match(rel_path)
    }

    /// All files under `root` matching this transform's input globs,
    /// in deterministic order.
    pub fn matched_inputs(&self, fs: &dyn FileSystem, root: &Path) -> Result<Vec<PathBuf>> {
        let all = collect_files(fs, root)?;
        let mut matched = Vec::new();

        for path in all {
            if let Ok(rel) = path.strip_prefix(root) {
                let rel_str = rel.to_string_lossy().replace('\\', "/");
                if self.matches(&rel_str) {
                    matched.push(path);
                }
            }
        }

        Ok(matched)
    }
}

/// In-memory registry of all declared transforms.
#[derive(Debug, Default)]
pub struct TransformRegistry {
    transforms: BTreeMap<TransformName, Transform>,
}

impl TransformRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the registry from a validated config, compiling every glob.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let mut registry = Self::new();
        for (name, tc) in cfg.transforms().iter() {
            registry.register(Transform::from_config(name, tc)?)?;
        }
        Ok(registry)
    }

    /// Register a transform. No side effects beyond in-memory registration.
    pub fn register(&mut self, transform: Transform) -> Result<()> {
        if self.transforms.contains_key(transform.name()) {
            return Err(PipelineError::DuplicateTransform(
                transform.name().to_string(),
            ));
        }
        self.transforms
            .insert(transform.name().to_string(), transform);
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<&Transform> {
        self.transforms
            .get(name)
            .ok_or_else(|| PipelineError::UnknownTransform(name.to_string()))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Transform> {
        self.transforms.values()
    }

    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

/// The directory part of a pattern's wildcard-free leading run.
///
/// `"source/sass/**/*.scss"` -> `"source/sass"`;
/// `"source/style.css"` (no wildcard) -> `"source"`.
pub(crate) fn pattern_base(pattern: &str) -> PathBuf {
    let literal = match pattern.find(['*', '?', '[', '{']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    };
    match literal.rfind('/') {
        Some(idx) => PathBuf::from(&literal[..idx]),
        None => PathBuf::new(),
    }
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset(patterns: &[String]) -> anyhow::Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::mock::MockFileSystem;
    use std::collections::BTreeMap;

    fn transform(name: &str, input: &[&str], output: &str) -> Transform {
        Transform::from_config(
            name,
            &TransformConfig {
                input: input.iter().map(|s| s.to_string()).collect(),
                output: output.to_string(),
                steps: Vec::new(),
                options: BTreeMap::new(),
                reload: ReloadKind::FullReload,
                use_hash: false,
            },
        )
        .unwrap()
    }

    #[test]
    fn register_rejects_duplicate_name() {
        let mut reg = TransformRegistry::new();
        reg.register(transform("css", &["source/**/*.scss"], "build/css"))
            .unwrap();
        let err = reg
            .register(transform("css", &["other/**"], "elsewhere"))
            .unwrap_err();
        assert!(matches!(err, PipelineError::DuplicateTransform(n) if n == "css"));
    }

    #[test]
    fn resolve_unknown_fails() {
        let reg = TransformRegistry::new();
        assert!(matches!(
            reg.resolve("nope"),
            Err(PipelineError::UnknownTransform(_))
        ));
    }

    #[test]
    fn matches_respects_globs() {
        let t = transform("css", &["source/sass/**/*.scss"], "build/css");
        assert!(t.matches("source/sass/style.scss"));
        assert!(t.matches("source/sass/blocks/button.scss"));
        assert!(!t.matches("source/img/logo.png"));
    }

    #[test]
    fn matched_inputs_filters_and_sorts() {
        let fs = MockFileSystem::new();
        fs.add_file("proj/source/sass/b.scss", "b");
        fs.add_file("proj/source/sass/a.scss", "a");
        fs.add_file("proj/source/img/logo.png", "png");

        let t = transform("css", &["source/sass/**/*.scss"], "build/css");
        let matched = t.matched_inputs(&fs, Path::new("proj")).unwrap();
        assert_eq!(
            matched,
            vec![
                PathBuf::from("proj/source/sass/a.scss"),
                PathBuf::from("proj/source/sass/b.scss"),
            ]
        );
    }

    #[test]
    fn pattern_base_strips_wildcards() {
        assert_eq!(pattern_base("source/sass/**/*.scss"), PathBuf::from("source/sass"));
        assert_eq!(pattern_base("source/*.html"), PathBuf::from("source"));
        assert_eq!(pattern_base("source/css/style.css"), PathBuf::from("source/css"));
        assert_eq!(pattern_base("*.html"), PathBuf::new());
    }

    #[test]
    fn base_for_prefers_explicit_option() {
        let mut cfg = TransformConfig {
            input: vec!["source/fonts/**/*.woff".to_string()],
            output: "build".to_string(),
            steps: Vec::new(),
            options: BTreeMap::new(),
            reload: ReloadKind::FullReload,
            use_hash: false,
        };
        cfg.options.insert("base".to_string(), "source/".to_string());
        let t = Transform::from_config("copy", &cfg).unwrap();

        // With base = "source/", fonts keep their subtree under the output.
        assert_eq!(t.base_for("source/fonts/a.woff"), PathBuf::from("source"));

        let plain = Transform::from_config(
            "copy2",
            &TransformConfig {
                input: vec!["source/fonts/**/*.woff".to_string()],
                output: "build".to_string(),
                steps: Vec::new(),
                options: BTreeMap::new(),
                reload: ReloadKind::FullReload,
                use_hash: false,
            },
        )
        .unwrap();
        assert_eq!(
            plain.base_for("source/fonts/a.woff"),
            PathBuf::from("source/fonts")
        );
    }
}
