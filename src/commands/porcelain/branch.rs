//! Branch management

use crate::areas::repository::Repository;
use crate::artifacts::revision;

impl Repository {
    /// Create a branch at `start` (default HEAD)
    pub fn branch_create(&self, name: &str, start: Option<&str>) -> anyhow::Result<()> {
        let start_oid = match start {
            Some(ident) => revision::resolve(self, ident)?
                .ok_or_else(|| anyhow::anyhow!("not a valid start point: {}", ident))?,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("cannot create a branch before the first commit"))?,
        };

        self.refs().create_branch(name, &start_oid)
    }

    /// Delete a branch; the current branch is refused
    pub fn branch_delete(&self, name: &str, _force: bool) -> anyhow::Result<()> {
        if self.refs().head_state()?.branch_name() == Some(name) {
            anyhow::bail!("cannot delete the current branch '{}'", name);
        }
        self.refs().delete_branch(name)?;
        Ok(())
    }

    /// All branches plus the current branch name, for listing
    pub fn branch_list(
        &self,
    ) -> anyhow::Result<(
        Vec<(String, crate::artifacts::objects::object_id::ObjectId)>,
        Option<String>,
    )> {
        let branches = self.refs().list_branches()?;
        let current = self.refs().head_state()?.branch_name().map(str::to_string);
        Ok((branches, current))
    }
}
