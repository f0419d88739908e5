//! Clone a remote repository into a new directory

use crate::areas::repository::Repository;
use crate::remote::client::{RemoteClient, RemoteUrl};
use std::path::Path;
use tracing::debug;

/// Provisional credential used to obtain a session token during clone.
/// It authenticates the transfer only and is never persisted to the new
/// repository.
const CLONE_USERNAME: &str = "cloneuser";
const CLONE_PASSWORD: &str = "clonepassword";

impl Repository {
    /// Clone `url` into `target_dir` (which must be empty or absent)
    pub fn clone(url: &str, target_dir: &Path) -> anyhow::Result<Repository> {
        if target_dir.exists() && target_dir.read_dir()?.next().is_some() {
            anyhow::bail!(
                "destination '{}' already exists and is not empty",
                target_dir.display()
            );
        }

        let parsed = RemoteUrl::parse(url)?;

        let mut repository = Repository::init(target_dir)?;
        repository.remote_add("origin", url)?;

        // log in with the provisional clone user for this transfer only
        let mut login_client = RemoteClient::connect(&parsed.host, parsed.port)?;
        let token = login_client
            .login_user(CLONE_USERNAME, CLONE_PASSWORD)?
            .map_err(|message| anyhow::anyhow!("clone login failed: {}", message))?;
        drop(login_client);

        repository.fetch("origin", &token, None)?;

        // check out whatever the remote HEAD names
        match repository.refs().read_remote_head("origin")? {
            Some(head_line) if head_line.starts_with("ref: refs/heads/") => {
                let branch = head_line
                    .trim_start_matches("ref: refs/heads/")
                    .to_string();
                match repository.refs().read_remote_ref("origin", &branch)? {
                    Some(tip) => {
                        repository.refs().create_branch(&branch, &tip)?;
                        repository
                            .config_mut()
                            .set(format!("branch.{}.remote", branch), "origin");
                        repository.config_mut().set(
                            format!("branch.{}.merge", branch),
                            format!("refs/heads/{}", branch),
                        );
                        repository.config().save()?;
                        repository.refs().set_head_to_branch(&branch)?;
                        repository.checkout_tip(&tip)?;
                    }
                    None => debug!(branch = %branch, "remote HEAD names a branch with no tip yet"),
                }
            }
            Some(detached_hash) => {
                let tip = crate::artifacts::objects::object_id::ObjectId::try_parse(
                    detached_hash.as_str(),
                )?;
                repository.refs().set_head_detached(&tip)?;
                repository.checkout_tip(&tip)?;
            }
            None => debug!("remote has no HEAD; leaving the clone empty"),
        }

        Ok(repository)
    }

    fn checkout_tip(
        &mut self,
        tip: &crate::artifacts::objects::object_id::ObjectId,
    ) -> anyhow::Result<()> {
        let commit = self.database().load_commit(tip)?;
        let new_map = self.tree_map_of_tree(commit.tree_oid())?;
        self.update_working_tree(&Default::default(), &new_map)?;
        self.populate_index_from_tree(commit.tree_oid())
    }
}
