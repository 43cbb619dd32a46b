mod common;

use std::collections::{BTreeMap, BTreeSet};

use assetpipe::config::model::{
    ConfigFile, ProjectSection, RawConfigFile, ServeSection, TaskConfig, TransformConfig,
};
use assetpipe::graph::TaskGraph;
use assetpipe::registry::TransformRegistry;
use assetpipe::types::ReloadKind;
use proptest::prelude::*;

fn transform_cfg(n: usize) -> TransformConfig {
    TransformConfig {
        input: vec![format!("source/t{n}/**/*.txt")],
        output: format!("build/t{n}"),
        steps: vec!["tool {in} {out}".to_string()],
        options: BTreeMap::new(),
        reload: ReloadKind::FullReload,
        use_hash: false,
    }
}

/// Layered pipelines: every task only references transforms and
/// strictly-earlier tasks, so the result is a DAG by construction.
fn layered_config() -> impl Strategy<Value = RawConfigFile> {
    let transform_count = 1usize..5;
    let task_count = 1usize..5;

    (transform_count, task_count)
        .prop_flat_map(|(transforms, tasks)| {
            let step_lists = proptest::collection::vec(
                proptest::collection::vec(any::<proptest::sample::Index>(), 1..4),
                tasks,
            );
            (Just(transforms), step_lists)
        })
        .prop_map(|(transform_count, step_indices)| {
            let mut transform = BTreeMap::new();
            for n in 0..transform_count {
                transform.insert(format!("t{n}"), transform_cfg(n));
            }

            let mut task = BTreeMap::new();
            for (i, indices) in step_indices.iter().enumerate() {
                // Candidate steps: all transforms plus previously defined tasks.
                let mut candidates: Vec<String> =
                    (0..transform_count).map(|n| format!("t{n}")).collect();
                candidates.extend((0..i).map(|j| format!("task{j}")));

                let steps: Vec<String> = indices
                    .iter()
                    .map(|ix| ix.get(&candidates).clone())
                    .collect();
                task.insert(format!("task{i}"), TaskConfig { steps });
            }

            // Root tasks required by validation.
            let last = format!("task{}", step_indices.len() - 1);
            task.insert(
                "dev".to_string(),
                TaskConfig {
                    steps: vec![last.clone()],
                },
            );
            task.insert("build".to_string(), TaskConfig { steps: vec![last] });

            RawConfigFile {
                project: ProjectSection::default(),
                serve: ServeSection::default(),
                transform,
                task,
            }
        })
}

/// Independent reference flattening: depth-first, first occurrence wins.
fn reference_flatten(
    name: &str,
    tasks: &BTreeMap<String, TaskConfig>,
    seen: &mut BTreeSet<String>,
    out: &mut Vec<String>,
) {
    if let Some(cfg) = tasks.get(name) {
        for step in &cfg.steps {
            reference_flatten(step, tasks, seen, out);
        }
    } else if seen.insert(name.to_string()) {
        out.push(name.to_string());
    }
}

proptest! {
    #[test]
    fn flatten_matches_depth_first_first_occurrence(raw in layered_config()) {
        common::init_tracing();
        let task_cfgs = raw.task.clone();
        let cfg = ConfigFile::try_from(raw).expect("layered config must validate");

        let registry = TransformRegistry::from_config(&cfg).unwrap();
        let graph = TaskGraph::from_config(&cfg, &registry).unwrap();

        for name in task_cfgs.keys() {
            let actual = graph.flatten(name).unwrap();

            let mut seen = BTreeSet::new();
            let mut expected = Vec::new();
            reference_flatten(name, &task_cfgs, &mut seen, &mut expected);

            prop_assert_eq!(actual.to_vec(), expected);
        }
    }

    #[test]
    fn flatten_never_repeats_a_transform(raw in layered_config()) {
        let cfg = ConfigFile::try_from(raw).expect("layered config must validate");
        let registry = TransformRegistry::from_config(&cfg).unwrap();
        let graph = TaskGraph::from_config(&cfg, &registry).unwrap();

        for name in graph.task_names().map(str::to_string).collect::<Vec<_>>() {
            let leaves = graph.flatten(&name).unwrap();
            let unique: BTreeSet<_> = leaves.iter().collect();
            prop_assert_eq!(unique.len(), leaves.len());
        }
    }
}

#[test]
fn self_cycle_rejected_even_via_indirection() {
    let mut transform = BTreeMap::new();
    transform.insert("t0".to_string(), transform_cfg(0));

    let mut task = BTreeMap::new();
    task.insert(
        "dev".to_string(),
        TaskConfig {
            steps: vec!["mid".to_string()],
        },
    );
    task.insert(
        "mid".to_string(),
        TaskConfig {
            steps: vec!["t0".to_string(), "dev".to_string()],
        },
    );
    task.insert(
        "build".to_string(),
        TaskConfig {
            steps: vec!["t0".to_string()],
        },
    );

    let raw = RawConfigFile {
        project: ProjectSection::default(),
        serve: ServeSection::default(),
        transform,
        task,
    };
    assert!(ConfigFile::try_from(raw).is_err());
}
