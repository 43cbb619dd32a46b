//! Content hashing for change suppression.
//!
//! A transform with `use_hash = true` is skipped when the aggregate hash of
//! its matched inputs is unchanged since its last run. This lets expensive
//! whole-set tools (sprite assembly, image recompression) sit out rebuilds
//! triggered by edits that did not touch their inputs' bytes, including
//! touch-without-change saves.

use std::collections::HashMap;
use std::path::Path;

use crate::fs::FileSystem;
use crate::registry::Transform;
use crate::types::TransformName;

/// Aggregate hash of a transform's matched inputs: relative path and
/// contents of every file, in sorted order, fed into one hasher. Renames
/// and additions change the digest even when file bytes are reused.
pub fn aggregate_hash(
    fs: &dyn FileSystem,
    root: &Path,
    transform: &Transform,
) -> crate::errors::Result<blake3::Hash> {
    let mut hasher = blake3::Hasher::new();
    for path in transform.matched_inputs(fs, root)? {
        let rel = path.strip_prefix(root).unwrap_or(&path);
        hasher.update(rel.to_string_lossy().as_bytes());
        hasher.update(&[0]);
        let contents = fs.read(&path)?;
        hasher.update(&contents);
        hasher.update(&[0]);
    }
    Ok(hasher.finalize())
}

/// Last-seen digest per transform. In-memory only; the first run of a
/// session always executes.
#[derive(Debug, Default)]
pub struct HashStore {
    seen: HashMap<TransformName, blake3::Hash>,
}

impl HashStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `hash` for `name`; returns true if it differs from the
    /// previously recorded digest (or none was recorded).
    pub fn update(&mut self, name: &str, hash: blake3::Hash) -> bool {
        match self.seen.insert(name.to_string(), hash) {
            Some(previous) => previous != hash,
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::model::TransformConfig;
    use crate::fs::mock::MockFileSystem;
    use crate::types::ReloadKind;
    use std::path::PathBuf;

    fn sprite_transform() -> Transform {
        let cfg = TransformConfig {
            input: vec!["source/img/*.svg".to_string()],
            output: "source/img/sprite".to_string(),
            steps: vec!["svgstore {in_list} --dest {out_dir}".to_string()],
            options: Default::default(),
            reload: ReloadKind::FullReload,
            use_hash: true,
        };
        Transform::from_config("sprite", &cfg).unwrap()
    }

    #[test]
    fn digest_stable_for_identical_inputs() {
        let fs = MockFileSystem::new();
        fs.add_file("proj/source/img/a.svg", "a");
        let t = sprite_transform();
        let root = PathBuf::from("proj");

        let h1 = aggregate_hash(&fs, &root, &t).unwrap();
        let h2 = aggregate_hash(&fs, &root, &t).unwrap();
        assert_eq!(h1, h2);
    }

    #[test]
    fn digest_changes_on_content_and_on_new_file() {
        let fs = MockFileSystem::new();
        fs.add_file("proj/source/img/a.svg", "a");
        let t = sprite_transform();
        let root = PathBuf::from("proj");
        let h1 = aggregate_hash(&fs, &root, &t).unwrap();

        fs.add_file("proj/source/img/a.svg", "aa");
        let h2 = aggregate_hash(&fs, &root, &t).unwrap();
        assert_ne!(h1, h2);

        fs.add_file("proj/source/img/b.svg", "a");
        let h3 = aggregate_hash(&fs, &root, &t).unwrap();
        assert_ne!(h2, h3);
    }

    #[test]
    fn store_reports_change_only_on_new_digest() {
        let mut store = HashStore::new();
        let h1 = blake3::hash(b"one");
        let h2 = blake3::hash(b"two");

        assert!(store.update("sprite", h1));
        assert!(!store.update("sprite", h1));
        assert!(store.update("sprite", h2));
    }
}
