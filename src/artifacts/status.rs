//! Status report model
//!
//! The `status` command assembles one of these from three comparisons:
//! index vs HEAD (to be committed), working tree vs index (not staged), and
//! the untracked remainder. Rendering is kept here so both the CLI and the
//! tests see the same text.

use colored::Colorize;
use std::path::PathBuf;

/// How a path differs between two snapshots
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

impl ChangeKind {
    fn label(&self) -> &'static str {
        match self {
            ChangeKind::Added => "new file",
            ChangeKind::Modified => "modified",
            ChangeKind::Deleted => "deleted",
        }
    }
}

/// Full status snapshot
#[derive(Debug, Default)]
pub struct StatusReport {
    /// Current branch name; `None` when HEAD is detached
    pub branch: Option<String>,
    /// Index vs HEAD
    pub staged: Vec<(PathBuf, ChangeKind)>,
    /// Working tree vs index
    pub unstaged: Vec<(PathBuf, ChangeKind)>,
    /// Present in the working tree, absent from index and HEAD
    pub untracked: Vec<PathBuf>,
    /// Paths listed in FILE_CONFLICTS while a merge is unresolved
    pub conflicted: Vec<PathBuf>,
    pub merge_in_progress: bool,
}

impl StatusReport {
    pub fn is_clean(&self) -> bool {
        self.staged.is_empty() && self.unstaged.is_empty() && self.untracked.is_empty()
    }

    pub fn render(&self) -> String {
        let mut out = String::new();

        match &self.branch {
            Some(branch) => out.push_str(&format!("On branch {}\n", branch)),
            None => out.push_str("HEAD detached\n"),
        }
        if self.merge_in_progress {
            out.push_str("You have unmerged paths; fix conflicts and run 'biogit commit'.\n");
        }

        if !self.staged.is_empty() {
            out.push_str("\nChanges to be committed:\n");
            for (path, kind) in &self.staged {
                out.push_str(&format!(
                    "\t{}\n",
                    self.annotate(path, kind.label()).green()
                ));
            }
        }

        if !self.unstaged.is_empty() {
            out.push_str("\nChanges not staged for commit:\n");
            for (path, kind) in &self.unstaged {
                out.push_str(&format!("\t{}\n", self.annotate(path, kind.label()).red()));
            }
        }

        if !self.untracked.is_empty() {
            out.push_str("\nUntracked files:\n");
            for path in &self.untracked {
                out.push_str(&format!("\t{}\n", path.display().to_string().red()));
            }
        }

        if self.is_clean() && !self.merge_in_progress {
            out.push_str("nothing to commit, working tree clean\n");
        }

        out
    }

    fn annotate(&self, path: &PathBuf, label: &str) -> String {
        if self.conflicted.contains(path) {
            format!("{}:   {} (conflict)", label, path.display())
        } else {
            format!("{}:   {}", label, path.display())
        }
    }
}
