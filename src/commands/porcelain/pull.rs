//! Fetch then merge

use crate::areas::repository::Repository;
use crate::commands::porcelain::merge::MergeOutcome;

impl Repository {
    /// Fetch one branch from a remote and merge it into the current branch
    pub fn pull(
        &mut self,
        remote: &str,
        branch: &str,
        token: &str,
    ) -> anyhow::Result<MergeOutcome> {
        if self.refs().head_state()?.branch_name().is_none() {
            anyhow::bail!("cannot pull with a detached HEAD");
        }
        if !self.is_workspace_clean()? {
            anyhow::bail!("workspace has uncommitted changes; commit or discard them first");
        }

        self.fetch(remote, token, Some(branch))?;

        if self
            .refs()
            .read_remote_ref(remote, branch)?
            .is_none()
        {
            anyhow::bail!("remote '{}' has no branch '{}'", remote, branch);
        }

        self.merge(&format!("{}/{}", remote, branch))
    }
}
