use super::FileSystem;
use anyhow::{anyhow, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// In-memory filesystem for tests.
///
/// Directories are implicit: a path is a directory if any stored file lives
/// below it. Keeps the bookkeeping minimal and failure-free for the cases
/// the executor and watcher exercise.
#[derive(Debug, Clone, Default)]
pub struct MockFileSystem {
    files: Arc<Mutex<BTreeMap<PathBuf, Vec<u8>>>>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_file(&self, path: impl AsRef<Path>, content: impl Into<Vec<u8>>) {
        let mut files = self.files.lock().unwrap();
        files.insert(path.as_ref().to_path_buf(), content.into());
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files.get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let files = self.files.lock().unwrap();
        files.keys().cloned().collect()
    }
}

impl FileSystem for MockFileSystem {
    fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let files = self.files.lock().unwrap();
        files
            .get(path)
            .cloned()
            .ok_or_else(|| anyhow!("file not found: {path:?}"))
    }

    fn write(&self, path: &Path, contents: &[u8]) -> Result<()> {
        self.add_file(path, contents);
        Ok(())
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<()> {
        let contents = self.read(from)?;
        self.add_file(to, contents);
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        self.is_file(path) || self.is_dir(path)
    }

    fn is_file(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.contains_key(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        let files = self.files.lock().unwrap();
        files.keys().any(|p| p.starts_with(path) && p != path)
    }

    fn create_dir_all(&self, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let mut files = self.files.lock().unwrap();
        files.retain(|p, _| !p.starts_with(path));
        Ok(())
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>> {
        let files = self.files.lock().unwrap();
        let mut entries: Vec<PathBuf> = Vec::new();

        for p in files.keys() {
            if let Ok(rest) = p.strip_prefix(path) {
                if let Some(first) = rest.components().next() {
                    let child = path.join(first.as_os_str());
                    if !entries.contains(&child) {
                        entries.push(child);
                    }
                }
            }
        }

        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::collect_files;

    #[test]
    fn read_dir_lists_immediate_children() {
        let fs = MockFileSystem::new();
        fs.add_file("root/a.txt", "a");
        fs.add_file("root/sub/b.txt", "b");

        let entries = fs.read_dir(Path::new("root")).unwrap();
        assert!(entries.contains(&PathBuf::from("root/a.txt")));
        assert!(entries.contains(&PathBuf::from("root/sub")));
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn collect_files_walks_recursively() {
        let fs = MockFileSystem::new();
        fs.add_file("root/a.txt", "a");
        fs.add_file("root/sub/deeper/b.txt", "b");

        let files = collect_files(&fs, Path::new("root")).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("root/a.txt"),
                PathBuf::from("root/sub/deeper/b.txt"),
            ]
        );
    }

    #[test]
    fn remove_dir_all_drops_subtree() {
        let fs = MockFileSystem::new();
        fs.add_file("build/css/style.css", "x");
        fs.add_file("source/a.scss", "y");

        fs.remove_dir_all(Path::new("build")).unwrap();
        assert!(!fs.exists(Path::new("build/css/style.css")));
        assert!(fs.is_file(Path::new("source/a.scss")));
    }
}
