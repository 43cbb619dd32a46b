//! Step command templates.
//!
//! A step is an opaque external command with placeholders:
//!
//! - `{in}` / `{out}` — input and output path, command runs once per file;
//! - `{in_list}` — all input paths, shell-quoted, command runs once;
//! - `{out_dir}` — the step's output directory (usable in both modes);
//! - `{options.<key>}` — value from the transform's options map.
//!
//! The orchestrator never interprets what a command does; it only wires
//! file sets through it.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{bail, Result};

/// How often a step command runs for one file set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepMode {
    /// Once per input file (`{in}` present).
    PerFile,
    /// Once for the whole set (`{in_list}` present, or no `{in}` at all).
    WholeSet,
}

pub fn mode_of(template: &str) -> StepMode {
    if template.contains("{in_list}") || !template.contains("{in}") {
        StepMode::WholeSet
    } else {
        StepMode::PerFile
    }
}

/// Render a per-file step command.
pub fn render_per_file(
    template: &str,
    input: &Path,
    output: &Path,
    out_dir: &Path,
    options: &BTreeMap<String, String>,
) -> Result<String> {
    let mut cmd = template.to_string();
    cmd = cmd.replace("{in}", &quote(input));
    cmd = cmd.replace("{out}", &quote(output));
    cmd = cmd.replace("{out_dir}", &quote(out_dir));
    substitute_options(cmd, options)
}

/// Render a whole-set step command.
pub fn render_whole_set(
    template: &str,
    inputs: &[impl AsRef<Path>],
    out_dir: &Path,
    options: &BTreeMap<String, String>,
) -> Result<String> {
    let list = inputs
        .iter()
        .map(|p| quote(p.as_ref()))
        .collect::<Vec<_>>()
        .join(" ");

    let mut cmd = template.to_string();
    cmd = cmd.replace("{in_list}", &list);
    cmd = cmd.replace("{out_dir}", &quote(out_dir));
    substitute_options(cmd, options)
}

fn substitute_options(mut cmd: String, options: &BTreeMap<String, String>) -> Result<String> {
    for (key, value) in options {
        cmd = cmd.replace(&format!("{{options.{key}}}"), value);
    }
    if let Some(start) = cmd.find("{options.") {
        let end = cmd[start..].find('}').map(|e| start + e + 1).unwrap_or(cmd.len());
        bail!("unresolved option placeholder {}", &cmd[start..end]);
    }
    Ok(cmd)
}

/// Single-quote a path for `sh -c`, escaping embedded quotes.
fn quote(path: &Path) -> String {
    let s = path.to_string_lossy().replace('\\', "/");
    if s.contains('\'') {
        format!("'{}'", s.replace('\'', r#"'\''"#))
    } else {
        format!("'{s}'")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn opts(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn per_file_substitution() {
        let cmd = render_per_file(
            "sass {in} {out}",
            Path::new("source/sass/style.scss"),
            Path::new("stage/0/style.css"),
            Path::new("stage/0"),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(cmd, "sass 'source/sass/style.scss' 'stage/0/style.css'");
    }

    #[test]
    fn whole_set_joins_inputs() {
        let inputs = vec![PathBuf::from("a.svg"), PathBuf::from("b.svg")];
        let cmd = render_whole_set(
            "svg-sprite {in_list} --dest {out_dir}",
            &inputs,
            Path::new("stage/1"),
            &BTreeMap::new(),
        )
        .unwrap();
        assert_eq!(cmd, "svg-sprite 'a.svg' 'b.svg' --dest 'stage/1'");
    }

    #[test]
    fn option_placeholders_resolve() {
        let cmd = render_per_file(
            "cwebp -q {options.quality} {in} -o {out}",
            Path::new("a.png"),
            Path::new("out/a.png"),
            Path::new("out"),
            &opts(&[("quality", "90")]),
        )
        .unwrap();
        assert_eq!(cmd, "cwebp -q 90 'a.png' -o 'out/a.png'");
    }

    #[test]
    fn missing_option_is_an_error() {
        let err = render_per_file(
            "tool {options.nope} {in} {out}",
            Path::new("a"),
            Path::new("b"),
            Path::new("out"),
            &BTreeMap::new(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("{options.nope}"));
    }

    #[test]
    fn mode_detection() {
        assert_eq!(mode_of("sass {in} {out}"), StepMode::PerFile);
        assert_eq!(mode_of("sprite {in_list} -d {out_dir}"), StepMode::WholeSet);
        assert_eq!(mode_of("touch {out_dir}/marker"), StepMode::WholeSet);
    }
}
