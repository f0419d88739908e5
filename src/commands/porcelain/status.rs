//! Working-tree status

use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use crate::artifacts::status::{ChangeKind, StatusReport};

impl Repository {
    /// Compare HEAD, index and working tree into a status report
    pub fn status(&self) -> anyhow::Result<StatusReport> {
        let head_map = self.head_tree_map()?;
        let mut report = StatusReport {
            branch: self.refs().head_state()?.branch_name().map(str::to_string),
            merge_in_progress: self.merge_in_progress(),
            ..Default::default()
        };
        if report.merge_in_progress {
            report.conflicted = self.read_conflicted_paths()?;
        }

        // index vs HEAD: changes to be committed
        for entry in self.index().entries() {
            match head_map.get(&entry.path) {
                None => report
                    .staged
                    .push((entry.path.clone(), ChangeKind::Added)),
                Some(head_entry) if head_entry.oid != entry.oid || head_entry.mode != entry.mode => {
                    report
                        .staged
                        .push((entry.path.clone(), ChangeKind::Modified));
                }
                Some(_) => {}
            }
        }
        for path in head_map.keys() {
            if self.index().get_entry(path).is_none() {
                report.staged.push((path.clone(), ChangeKind::Deleted));
            }
        }
        report.staged.sort_by(|a, b| a.0.cmp(&b.0));

        // working tree vs index: changes not staged
        for entry in self.index().entries() {
            if !self.workspace().file_exists(&entry.path) {
                report
                    .unstaged
                    .push((entry.path.clone(), ChangeKind::Deleted));
                continue;
            }
            let metadata = self.workspace().stat_file(&entry.path)?;
            if metadata == entry.metadata {
                continue;
            }
            // metadata mismatch: rehash before declaring the file modified
            let content = self.workspace().read_file(&entry.path)?;
            if Blob::new(content).object_id()? != entry.oid {
                report
                    .unstaged
                    .push((entry.path.clone(), ChangeKind::Modified));
            }
        }

        // everything else in the working tree is untracked
        for path in self.workspace().list_files(None)? {
            if self.index().get_entry(&path).is_none() && !head_map.contains_key(&path) {
                report.untracked.push(path);
            }
        }

        Ok(report)
    }
}
