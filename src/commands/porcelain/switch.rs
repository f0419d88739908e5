//! Switch the working tree to another branch or commit

use crate::areas::repository::Repository;
use crate::artifacts::revision;

impl Repository {
    /// Check out a branch (symbolic HEAD) or a commit-ish (detached HEAD)
    ///
    /// Requires a clean workspace. The working tree and index are rebuilt
    /// from the target commit's tree: files only present in the old HEAD
    /// tree are removed, everything in the target tree is written out.
    pub fn switch(&mut self, target: &str) -> anyhow::Result<()> {
        if !self.is_workspace_clean()? {
            anyhow::bail!("workspace has uncommitted changes; commit or discard them first");
        }

        // a branch name wins over any other interpretation
        let (target_oid, branch) = match self.refs().read_branch(target)? {
            Some(oid) => (oid, Some(target.to_string())),
            None => {
                let oid = revision::resolve(self, target)?
                    .ok_or_else(|| anyhow::anyhow!("no branch or commit named '{}'", target))?;
                (oid, None)
            }
        };

        let old_map = self.head_tree_map()?;
        let commit = self.database().load_commit(&target_oid)?;
        let new_map = self.tree_map_of_tree(commit.tree_oid())?;

        self.update_working_tree(&old_map, &new_map)?;
        self.populate_index_from_tree(commit.tree_oid())?;

        match branch {
            Some(name) => self.refs().set_head_to_branch(&name)?,
            None => self.refs().set_head_detached(&target_oid)?,
        }

        Ok(())
    }
}
