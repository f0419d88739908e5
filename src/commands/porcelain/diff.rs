//! Diff between commits, index and working tree

use crate::areas::repository::{Repository, TreeMap};
use crate::artifacts::diff::unified;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::revision;
use std::path::{Path, PathBuf};

/// Options selecting what to compare
#[derive(Debug, Clone, Default)]
pub struct DiffOptions {
    /// Compare index against HEAD instead of working tree against index
    pub staged: bool,
    /// First commit-ish of a commit pair
    pub commit1: Option<String>,
    /// Second commit-ish of a commit pair
    pub commit2: Option<String>,
    /// Restrict output to these paths (any path when empty)
    pub paths: Vec<PathBuf>,
}

impl Repository {
    /// Render the selected diff in unified format
    pub fn diff(&self, options: &DiffOptions) -> anyhow::Result<String> {
        match (&options.commit1, &options.commit2) {
            (Some(c1), Some(c2)) => self.diff_commits(c1, c2, &options.paths),
            (None, None) if options.staged => self.diff_staged(&options.paths),
            (None, None) => self.diff_worktree(&options.paths),
            _ => anyhow::bail!("diff needs either two commits or none"),
        }
    }

    fn diff_commits(&self, c1: &str, c2: &str, paths: &[PathBuf]) -> anyhow::Result<String> {
        let oid1 = revision::resolve(self, c1)?
            .ok_or_else(|| anyhow::anyhow!("cannot resolve '{}'", c1))?;
        let oid2 = revision::resolve(self, c2)?
            .ok_or_else(|| anyhow::anyhow!("cannot resolve '{}'", c2))?;

        let old_map = self.tree_map_of_commit(&oid1)?;
        let new_map = self.tree_map_of_commit(&oid2)?;
        self.diff_tree_maps(&old_map, &new_map, paths)
    }

    fn diff_staged(&self, paths: &[PathBuf]) -> anyhow::Result<String> {
        let head_map = self.head_tree_map()?;

        let mut output = String::new();
        let mut seen = std::collections::BTreeSet::new();

        for entry in self.index().entries() {
            seen.insert(entry.path.clone());
            if !path_selected(&entry.path, paths) {
                continue;
            }
            let old_lines = match head_map.get(&entry.path) {
                Some(head_entry) if head_entry.oid == entry.oid => continue,
                Some(head_entry) => self.database().load_blob(&head_entry.oid)?.lines(),
                None => Vec::new(),
            };
            let new_lines = self.database().load_blob(&entry.oid)?.lines();
            output.push_str(&render_file_diff(&entry.path, &old_lines, &new_lines));
        }

        // files deleted from the index
        for (path, head_entry) in &head_map {
            if seen.contains(path) || !path_selected(path, paths) {
                continue;
            }
            let old_lines = self.database().load_blob(&head_entry.oid)?.lines();
            output.push_str(&render_file_diff(path, &old_lines, &[]));
        }

        Ok(output)
    }

    fn diff_worktree(&self, paths: &[PathBuf]) -> anyhow::Result<String> {
        let mut output = String::new();

        for entry in self.index().entries() {
            if !path_selected(&entry.path, paths) {
                continue;
            }

            if !self.workspace().file_exists(&entry.path) {
                let old_lines = self.database().load_blob(&entry.oid)?.lines();
                output.push_str(&render_file_diff(&entry.path, &old_lines, &[]));
                continue;
            }

            // fast path: unchanged metadata means unchanged content
            let metadata = self.workspace().stat_file(&entry.path)?;
            if metadata == entry.metadata {
                continue;
            }
            let content = self.workspace().read_file(&entry.path)?;
            let workdir_blob = Blob::new(content);
            if workdir_blob.object_id()? == entry.oid {
                continue;
            }

            let old_lines = self.database().load_blob(&entry.oid)?.lines();
            let new_lines = workdir_blob.lines();
            output.push_str(&render_file_diff(&entry.path, &old_lines, &new_lines));
        }

        Ok(output)
    }

    fn diff_tree_maps(
        &self,
        old_map: &TreeMap,
        new_map: &TreeMap,
        paths: &[PathBuf],
    ) -> anyhow::Result<String> {
        let mut affected = std::collections::BTreeSet::new();
        affected.extend(old_map.keys().cloned());
        affected.extend(new_map.keys().cloned());

        let mut output = String::new();
        for path in affected {
            if !path_selected(&path, paths) {
                continue;
            }
            let old_entry = old_map.get(&path);
            let new_entry = new_map.get(&path);
            if old_entry.map(|e| &e.oid) == new_entry.map(|e| &e.oid) {
                continue;
            }

            let old_lines = match old_entry {
                Some(entry) => self.database().load_blob(&entry.oid)?.lines(),
                None => Vec::new(),
            };
            let new_lines = match new_entry {
                Some(entry) => self.database().load_blob(&entry.oid)?.lines(),
                None => Vec::new(),
            };
            output.push_str(&render_file_diff(&path, &old_lines, &new_lines));
        }

        Ok(output)
    }
}

fn render_file_diff(path: &Path, old_lines: &[String], new_lines: &[String]) -> String {
    let rendered = unified::render(
        &format!("a/{}", path.display()),
        &format!("b/{}", path.display()),
        old_lines,
        new_lines,
    );
    if rendered.is_empty() {
        return rendered;
    }
    format!("diff --biogit a/{0} b/{0}\n{1}", path.display(), rendered)
}

fn path_selected(path: &Path, selected: &[PathBuf]) -> bool {
    if selected.is_empty() {
        return true;
    }
    selected
        .iter()
        .any(|wanted| path == wanted || path.starts_with(wanted))
}
