//! Working-tree operations
//!
//! Everything that touches files outside `.biogit/`: enumeration, stat,
//! read/write and the checkout path that moves the working tree between two
//! tree snapshots.

use crate::areas::index::EntryMetadata;
use anyhow::Context;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const IGNORED_COMPONENTS: [&str; 3] = [".biogit", ".", ".."];

#[derive(Debug)]
pub struct Workspace {
    path: Box<Path>,
}

impl Workspace {
    pub fn new(path: Box<Path>) -> Self {
        Workspace { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Recursively list regular files below `start`, relative to the root
    ///
    /// Anything inside `.biogit/` is skipped. `start` may name a single
    /// file, in which case the listing contains just that file.
    pub fn list_files(&self, start: Option<&Path>) -> anyhow::Result<Vec<PathBuf>> {
        let start_path = match start {
            Some(p) if p.is_absolute() => p.to_path_buf(),
            Some(p) => self.path.join(p),
            None => self.path.to_path_buf(),
        };

        if !start_path.exists() {
            anyhow::bail!("path does not exist: {}", start_path.display());
        }

        if start_path.is_file() {
            let relative = self.relativize(&start_path)?;
            if Self::is_ignored(&relative) {
                return Ok(Vec::new());
            }
            return Ok(vec![relative]);
        }

        let mut files = WalkDir::new(&start_path)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let relative = self.relativize(entry.path()).ok()?;
                if Self::is_ignored(&relative) {
                    None
                } else {
                    Some(relative)
                }
            })
            .collect::<Vec<_>>();
        files.sort();

        Ok(files)
    }

    /// Top-level entries of a directory, for untracked-directory collapsing
    pub fn list_dir(&self, dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
        let dir_path = self.path.join(dir);
        Ok(std::fs::read_dir(&dir_path)?
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let relative = self.relativize(&entry.path()).ok()?;
                if Self::is_ignored(&relative) {
                    None
                } else {
                    Some(relative)
                }
            })
            .collect())
    }

    fn relativize(&self, path: &Path) -> anyhow::Result<PathBuf> {
        path.strip_prefix(self.path.as_ref())
            .map(Path::to_path_buf)
            .with_context(|| format!("path escapes the working tree: {}", path.display()))
    }

    fn is_ignored(relative: &Path) -> bool {
        relative.components().any(|component| {
            matches!(component, std::path::Component::Normal(name)
                if IGNORED_COMPONENTS.contains(&name.to_string_lossy().as_ref()))
        })
    }

    pub fn file_exists(&self, relative: &Path) -> bool {
        self.path.join(relative).is_file()
    }

    pub fn read_file(&self, relative: &Path) -> anyhow::Result<Vec<u8>> {
        let file_path = self.path.join(relative);
        std::fs::read(&file_path)
            .with_context(|| format!("unable to read {}", file_path.display()))
    }

    pub fn stat_file(&self, relative: &Path) -> anyhow::Result<EntryMetadata> {
        let metadata = std::fs::metadata(self.path.join(relative))?;
        let mtime = metadata.modified()?;
        let since_epoch = mtime
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        Ok(EntryMetadata::new(
            since_epoch.as_secs() as i64,
            since_epoch.subsec_nanos() as i64,
            metadata.len(),
        ))
    }

    /// Write file content, creating parent directories as needed
    pub fn write_file(&self, relative: &Path, content: &[u8]) -> anyhow::Result<()> {
        let file_path = self.path.join(relative);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("unable to create directory {}", parent.display()))?;
        }
        std::fs::write(&file_path, content)
            .with_context(|| format!("unable to write {}", file_path.display()))
    }

    /// Remove a file and prune directories it leaves empty
    pub fn remove_file(&self, relative: &Path) -> anyhow::Result<()> {
        let file_path = self.path.join(relative);
        if file_path.exists() {
            std::fs::remove_file(&file_path)
                .with_context(|| format!("unable to remove {}", file_path.display()))?;
        }
        self.prune_empty_parent_dirs(&file_path);
        Ok(())
    }

    fn prune_empty_parent_dirs(&self, path: &Path) {
        let mut parent = path.parent();
        while let Some(dir) = parent {
            if dir == self.path.as_ref() {
                break;
            }
            // stop at the first non-empty (or already gone) directory
            match dir.read_dir() {
                Ok(mut entries) => {
                    if entries.next().is_none() {
                        if std::fs::remove_dir(dir).is_err() {
                            break;
                        }
                    } else {
                        break;
                    }
                }
                _ => break,
            }
            parent = dir.parent();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn workspace() -> (tempfile::TempDir, Workspace) {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::new(dir.path().to_path_buf().into_boxed_path());
        (dir, workspace)
    }

    #[test]
    fn test_list_files_skips_biogit_dir() {
        let (dir, workspace) = workspace();
        std::fs::create_dir_all(dir.path().join(".biogit/objects")).unwrap();
        std::fs::write(dir.path().join(".biogit/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(dir.path().join("a.txt"), "a").unwrap();
        std::fs::create_dir(dir.path().join("src")).unwrap();
        std::fs::write(dir.path().join("src/b.txt"), "b").unwrap();

        let files = workspace.list_files(None).unwrap();
        assert_eq!(files, vec![PathBuf::from("a.txt"), PathBuf::from("src/b.txt")]);
    }

    #[test]
    fn test_list_files_single_file() {
        let (dir, workspace) = workspace();
        std::fs::write(dir.path().join("only.txt"), "x").unwrap();

        let files = workspace.list_files(Some(Path::new("only.txt"))).unwrap();
        assert_eq!(files, vec![PathBuf::from("only.txt")]);
    }

    #[test]
    fn test_list_files_missing_path_fails() {
        let (_dir, workspace) = workspace();
        assert!(workspace.list_files(Some(Path::new("absent"))).is_err());
    }

    #[test]
    fn test_write_creates_parents_and_remove_prunes_them() {
        let (dir, workspace) = workspace();
        let nested = Path::new("deep/nested/file.txt");

        workspace.write_file(nested, b"content").unwrap();
        assert!(dir.path().join(nested).is_file());

        workspace.remove_file(nested).unwrap();
        assert!(!dir.path().join("deep").exists());
    }

    #[test]
    fn test_stat_reports_size() {
        let (_dir, workspace) = workspace();
        workspace.write_file(Path::new("sized.txt"), b"12345").unwrap();
        let metadata = workspace.stat_file(Path::new("sized.txt")).unwrap();
        assert_eq!(metadata.size, 5);
    }
}
