//! Semantic validation of a raw config.
//!
//! Everything here runs at startup, before any file IO: duplicate and
//! unknown names, task-graph cycles, and transform input/output overlaps
//! that would create an execution-order cycle.

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{PipelineError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = PipelineError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(
            raw.project,
            raw.serve,
            raw.transform,
            raw.task,
        ))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_declarations(cfg)?;
    validate_project_section(cfg)?;
    validate_name_spaces(cfg)?;
    validate_task_refs(cfg)?;
    validate_task_dag(cfg)?;
    validate_transform_io(cfg)?;
    Ok(())
}

fn ensure_has_declarations(cfg: &RawConfigFile) -> Result<()> {
    if cfg.transform.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [transform.<name>] section".to_string(),
        ));
    }
    if cfg.task.is_empty() {
        return Err(PipelineError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    for (name, t) in cfg.transform.iter() {
        if t.input.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "transform '{name}' must declare at least one input glob"
            )));
        }
    }
    for (name, t) in cfg.task.iter() {
        if t.steps.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "task '{name}' must declare at least one step"
            )));
        }
    }
    Ok(())
}

fn validate_project_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.project.debounce_ms == 0 {
        return Err(PipelineError::ConfigError(
            "[project].debounce_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    for (role, task) in [
        ("dev_task", &cfg.project.dev_task),
        ("build_task", &cfg.project.build_task),
    ] {
        if !cfg.task.contains_key(task) {
            return Err(PipelineError::ConfigError(format!(
                "[project].{role} names unknown task '{task}'"
            )));
        }
    }
    Ok(())
}

/// Transforms and tasks share a reference namespace in task steps, so a name
/// may not belong to both.
fn validate_name_spaces(cfg: &RawConfigFile) -> Result<()> {
    for name in cfg.task.keys() {
        if cfg.transform.contains_key(name) {
            return Err(PipelineError::ConfigError(format!(
                "'{name}' is declared as both a transform and a task; step references would be ambiguous"
            )));
        }
    }
    Ok(())
}

fn validate_task_refs(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for step in task.steps.iter() {
            if !cfg.transform.contains_key(step) && !cfg.task.contains_key(step) {
                return Err(PipelineError::ConfigError(format!(
                    "task '{name}' references unknown step '{step}'"
                )));
            }
            if step == name {
                return Err(PipelineError::ConfigError(format!(
                    "task '{name}' cannot reference itself in `steps`"
                )));
            }
        }
    }
    Ok(())
}

/// Reject cyclic task composition.
///
/// Edge direction: referenced sub-task -> referencing task, so a topological
/// order lists prerequisites before dependents.
fn validate_task_dag(cfg: &RawConfigFile) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.task.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in cfg.task.iter() {
        for step in task.steps.iter() {
            if cfg.task.contains_key(step) {
                graph.add_edge(step.as_str(), name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PipelineError::CyclicDependency(
            cycle.node_id().to_string(),
        )),
    }
}

/// Reject transform-level execution-order cycles: transform A feeding
/// transform B (B's input globs can match paths under A's output directory)
/// is a legitimate chain, but a loop of such feeds can never settle.
///
/// A transform writing into its *own* input globs is tolerated; pipelines do
/// this in practice (minified SVGs land back inside the watched image tree).
/// The invalidator ignores a transform's own published outputs, so the
/// self-feed cannot retrigger it.
fn validate_transform_io(cfg: &RawConfigFile) -> Result<()> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in cfg.transform.keys() {
        graph.add_node(name.as_str());
    }

    for (a_name, a) in cfg.transform.iter() {
        for (b_name, b) in cfg.transform.iter() {
            if a_name == b_name {
                continue;
            }
            if output_feeds_globs(&a.output, &b.input) {
                graph.add_edge(a_name.as_str(), b_name.as_str(), ());
            }
        }
    }

    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(PipelineError::CyclicDependency(
            cycle.node_id().to_string(),
        )),
    }
}

/// Whether any of `globs` could match a path under `output_dir`.
///
/// Exact glob intersection is undecidable cheaply, so this tries each
/// pattern against concrete sample paths placed under the output directory.
fn output_feeds_globs(output_dir: &str, globs: &[String]) -> bool {
    use globset::Glob;

    let out = output_dir.trim_end_matches('/');

    for pattern in globs {
        let glob = match Glob::new(pattern) {
            Ok(g) => g,
            // Invalid patterns surface as a registry error later.
            Err(_) => continue,
        };
        let matcher = glob.compile_matcher();

        let tail = sample_of(pattern.rsplit('/').next().unwrap_or(pattern));
        let candidates = [
            format!("{out}/{tail}"),
            format!("{out}/x/{tail}"),
        ];

        if candidates.iter().any(|c| matcher.is_match(c.as_str())) {
            return true;
        }

        // Literal-prefix case: the pattern explicitly roots itself under the
        // output directory (e.g. output "build/img", input "build/img/**").
        let literal = literal_prefix(pattern);
        if !literal.is_empty() && literal.starts_with(&format!("{out}/")) {
            return true;
        }
    }

    false
}

/// Replace wildcard constructs in a pattern fragment with a concrete sample.
fn sample_of(fragment: &str) -> String {
    let mut sample = String::new();
    let mut chars = fragment.chars().peekable();
    let mut last_was_star = false;

    while let Some(c) = chars.next() {
        match c {
            '*' => {
                if !last_was_star {
                    sample.push('x');
                }
                last_was_star = true;
                continue;
            }
            '?' => sample.push('x'),
            '[' => {
                // Take the first literal from the class.
                let mut first = 'x';
                for inner in chars.by_ref() {
                    if inner == ']' {
                        break;
                    }
                    if first == 'x' && inner != '!' && inner != '^' {
                        first = inner;
                    }
                }
                sample.push(first);
            }
            '{' => {
                // Take the first alternative.
                let mut depth = 1;
                let mut taking = true;
                for inner in chars.by_ref() {
                    match inner {
                        '}' => {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                        '{' => depth += 1,
                        ',' if depth == 1 => taking = false,
                        other if taking => sample.push(other),
                        _ => {}
                    }
                }
            }
            other => sample.push(other),
        }
        last_was_star = false;
    }

    sample
}

/// Longest leading run of a pattern containing no wildcard characters.
fn literal_prefix(pattern: &str) -> &str {
    match pattern.find(['*', '?', '[', '{']) {
        Some(idx) => &pattern[..idx],
        None => pattern,
    }
}
