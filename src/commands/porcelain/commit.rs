//! Record the staged snapshot as a commit

use crate::areas::repository::Repository;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object_id::ObjectId;

impl Repository {
    /// Create a commit from the current index
    ///
    /// A pending `MERGE_HEAD` makes this a two-parent merge commit and is
    /// cleared on success. Committing a tree identical to HEAD's is rejected
    /// unless a merge is being concluded. The index is repopulated from the
    /// new tree afterwards, canonicalizing entry metadata.
    pub fn commit(&mut self, message: &str) -> anyhow::Result<ObjectId> {
        if message.trim().is_empty() {
            anyhow::bail!("commit message must not be empty");
        }

        let merge_head = self.read_merge_head()?;
        let root_tree = self.build_root_tree()?;

        let mut parents = Vec::new();
        let head_commit = self.head_commit()?;
        if let Some(head) = &head_commit {
            if head.tree_oid() == &root_tree && merge_head.is_none() {
                anyhow::bail!("nothing to commit");
            }
        }
        if let Some(head_oid) = self.refs().read_head()? {
            parents.push(head_oid);
        }
        if let Some(theirs) = &merge_head {
            parents.push(theirs.clone());
        }

        let author = self.author_signature();
        let commit = Commit::new(parents, root_tree.clone(), author, message.to_string());
        let commit_oid = self.database().store(&commit)?;

        self.refs().advance_head(&commit_oid)?;

        if merge_head.is_some() {
            self.clear_merge_state()?;
        }

        self.populate_index_from_tree(&root_tree)?;

        Ok(commit_oid)
    }
}
