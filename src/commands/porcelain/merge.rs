//! Merge a branch into the current one

use crate::areas::index::IndexEntry;
use crate::areas::repository::{Repository, TreeMap};
use crate::artifacts::merge::{self, MergeDecision};
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::revision;
use std::path::PathBuf;

/// What a merge attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergeOutcome {
    /// THEIRS is already an ancestor of HEAD
    AlreadyUpToDate,
    /// HEAD was an ancestor of THEIRS; the branch ref moved forward
    FastForward(ObjectId),
    /// Clean three-way merge committed with two parents
    Merged(ObjectId),
    /// Conflicts written to the working tree; commit after resolving
    Conflicts(Vec<PathBuf>),
}

impl Repository {
    /// Merge `target` into the current branch
    pub fn merge(&mut self, target: &str) -> anyhow::Result<MergeOutcome> {
        if self.merge_in_progress() {
            anyhow::bail!("a merge is already in progress; conclude it with 'biogit commit'");
        }
        if !self.is_workspace_clean()? {
            anyhow::bail!("workspace has uncommitted changes; commit or discard them first");
        }

        let ours = self
            .refs()
            .read_head()?
            .ok_or_else(|| anyhow::anyhow!("nothing to merge into: HEAD has no commits"))?;
        let theirs = revision::resolve(self, target)?
            .ok_or_else(|| anyhow::anyhow!("cannot resolve '{}'", target))?;

        if ours == theirs {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        let base = merge::find_common_ancestor(self.database(), &ours, &theirs)?
            .ok_or_else(|| anyhow::anyhow!("no common ancestor with '{}'", target))?;

        if base == theirs {
            return Ok(MergeOutcome::AlreadyUpToDate);
        }

        if base == ours {
            return self.fast_forward_to(&theirs).map(MergeOutcome::FastForward);
        }

        self.three_way_merge(target, &base, &ours, &theirs)
    }

    fn fast_forward_to(&mut self, theirs: &ObjectId) -> anyhow::Result<ObjectId> {
        let branch = match self.refs().head_state()?.branch_name() {
            Some(name) => name.to_string(),
            None => anyhow::bail!("cannot fast-forward a detached HEAD"),
        };

        let old_map = self.head_tree_map()?;
        let commit = self.database().load_commit(theirs)?;
        let new_map = self.tree_map_of_tree(commit.tree_oid())?;

        self.refs().write_branch(&branch, theirs)?;
        self.update_working_tree(&old_map, &new_map)?;
        self.populate_index_from_tree(commit.tree_oid())?;

        Ok(theirs.clone())
    }

    fn three_way_merge(
        &mut self,
        target: &str,
        base: &ObjectId,
        ours: &ObjectId,
        theirs: &ObjectId,
    ) -> anyhow::Result<MergeOutcome> {
        let base_map = self.tree_map_of_commit(base)?;
        let ours_map = self.tree_map_of_commit(ours)?;
        let theirs_map = self.tree_map_of_commit(theirs)?;

        let decisions = merge::merge_trees(&base_map, &ours_map, &theirs_map);

        let mut merged = TreeMap::new();
        let mut conflicts = Vec::new();

        for (path, decision) in &decisions {
            match decision {
                MergeDecision::Take(entry) => {
                    merged.insert(path.clone(), entry.clone());
                }
                MergeDecision::Remove => {}
                MergeDecision::Conflict { ours, theirs } => {
                    let ours_lines = match ours {
                        Some(entry) => self.database().load_blob(&entry.oid)?.lines(),
                        None => Vec::new(),
                    };
                    let theirs_lines = match theirs {
                        Some(entry) => self.database().load_blob(&entry.oid)?.lines(),
                        None => Vec::new(),
                    };
                    let content = merge::conflict_file_content(
                        "HEAD",
                        &ours_lines,
                        target,
                        &theirs_lines,
                    );
                    self.workspace().write_file(path, content.as_bytes())?;
                    conflicts.push(path.clone());
                }
            }
        }

        if !conflicts.is_empty() {
            // leave index and HEAD untouched; commit concludes the merge
            self.write_merge_state(theirs, &conflicts)?;
            return Ok(MergeOutcome::Conflicts(conflicts));
        }

        // clean merge: materialize the merged snapshot, then commit it
        self.update_working_tree(&ours_map, &merged)?;

        self.index_mut().clear_in_memory();
        for (path, entry) in &merged {
            let metadata = self.workspace().stat_file(path)?;
            self.index_mut().add_or_update_entry(IndexEntry::new(
                path.clone(),
                entry.oid.clone(),
                entry.mode,
                metadata,
            ));
        }
        self.index().write()?;

        let root_tree = self.build_root_tree()?;
        let current = self
            .refs()
            .head_state()?
            .branch_name()
            .unwrap_or("HEAD")
            .to_string();
        let message = format!("Merge branch '{}' into {}", target, current);
        let commit = Commit::new(
            vec![ours.clone(), theirs.clone()],
            root_tree,
            self.author_signature(),
            message,
        );
        let commit_oid = self.database().store(&commit)?;
        self.refs().advance_head(&commit_oid)?;

        Ok(MergeOutcome::Merged(commit_oid))
    }
}
