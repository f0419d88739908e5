//! Push local history to a remote

use crate::areas::refs::is_fast_forward;
use crate::areas::repository::Repository;
use crate::artifacts::objects::object::{Unpackable, split_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::remote::client::RemoteClient;
use std::collections::HashSet;
use tracing::debug;

/// First-parent steps walked when collecting commits to send
pub const PUSH_HISTORY_LIMIT: usize = 500;

/// What a push attempt produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushOutcome {
    /// Remote tip already equals the local tip
    UpToDate,
    /// Ref moved on the server
    Updated {
        ref_name: String,
        new_tip: ObjectId,
        uploaded_objects: usize,
    },
}

impl Repository {
    /// Push `local_ref` to `remote_ref` on the configured remote
    pub fn push(
        &self,
        remote: &str,
        local_ref: &str,
        remote_ref: &str,
        force: bool,
        token: &str,
    ) -> anyhow::Result<PushOutcome> {
        let local_branch = local_ref.strip_prefix("refs/heads/").unwrap_or(local_ref);
        let local_tip = self
            .refs()
            .read_branch(local_branch)?
            .ok_or_else(|| anyhow::anyhow!("no local branch named '{}'", local_branch))?;

        let remote_ref_full = if remote_ref.starts_with("refs/") {
            remote_ref.to_string()
        } else {
            format!("refs/heads/{}", remote_ref)
        };

        let url = self.remote_url(remote)?;
        let mut client = RemoteClient::connect(&url.host, url.port)?;
        client.target_repository(&url.repo_path)?;

        let remote_refs = client.list_refs(token)?;
        let remote_tip = remote_refs
            .iter()
            .find(|(name, _)| name == &remote_ref_full)
            .and_then(|(_, value)| ObjectId::try_parse(value.as_str()).ok());

        if remote_tip.as_ref() == Some(&local_tip) {
            return Ok(PushOutcome::UpToDate);
        }

        // decide how far back history has to be shipped
        let fast_forward = match &remote_tip {
            Some(tip) => is_fast_forward(self.database(), tip, &local_tip),
            None => true,
        };
        let commits = if fast_forward {
            self.commits_between(&local_tip, remote_tip.as_ref())?
        } else {
            if !force {
                anyhow::bail!(
                    "push to '{}' is not a fast-forward; use --force to overwrite",
                    remote_ref_full
                );
            }
            let stop = match &remote_tip {
                Some(tip) => {
                    crate::artifacts::merge::find_common_ancestor(self.database(), &local_tip, tip)?
                }
                None => None,
            };
            self.commits_between(&local_tip, stop.as_ref())?
        };

        let closure = self.collect_object_closure(&commits)?;
        debug!(
            commits = commits.len(),
            objects = closure.len(),
            "collected push closure"
        );

        // existence probe, then upload whatever the server lacks
        let hashes: Vec<String> = closure.iter().map(|oid| oid.to_string()).collect();
        let present = client.check_objects(token, &hashes)?;
        let mut uploaded = 0;
        for (oid, on_server) in closure.iter().zip(present) {
            if on_server {
                continue;
            }
            let raw = self
                .database()
                .raw_object(oid.as_str())?
                .ok_or_else(|| anyhow::anyhow!("object {} disappeared during push", oid))?;
            client.put_object(token, oid.as_str(), &raw)?;
            uploaded += 1;
        }

        let expected_old = if fast_forward {
            remote_tip.as_ref().map(|oid| oid.as_str().to_string())
        } else {
            None
        };
        let (updated, reason) = client.update_ref(
            token,
            &remote_ref_full,
            local_tip.as_str(),
            expected_old.as_deref(),
            force,
        )?;
        if !updated {
            anyhow::bail!("server refused the ref update: {}", reason);
        }

        Ok(PushOutcome::Updated {
            ref_name: remote_ref_full,
            new_tip: local_tip,
            uploaded_objects: uploaded,
        })
    }

    /// Commits from `tip` back to (excluding) `stop`, oldest first
    fn commits_between(
        &self,
        tip: &ObjectId,
        stop: Option<&ObjectId>,
    ) -> anyhow::Result<Vec<ObjectId>> {
        let mut commits = Vec::new();
        let mut current = Some(tip.clone());
        let mut visited = HashSet::new();

        while let Some(oid) = current {
            if Some(&oid) == stop || commits.len() >= PUSH_HISTORY_LIMIT || !visited.insert(oid.clone())
            {
                break;
            }
            let commit = self.database().load_commit(&oid)?;
            current = commit.first_parent().cloned();
            commits.push(oid);
        }

        commits.reverse();
        Ok(commits)
    }

    /// Transitive object closure of a set of commits
    ///
    /// Explicit queue + visited set: commit to tree, tree to subtrees and
    /// blobs.
    fn collect_object_closure(&self, commits: &[ObjectId]) -> anyhow::Result<Vec<ObjectId>> {
        let mut closure = Vec::new();
        let mut visited = HashSet::new();
        let mut queue: std::collections::VecDeque<ObjectId> = commits.iter().cloned().collect();

        while let Some(oid) = queue.pop_front() {
            if !visited.insert(oid.clone()) {
                continue;
            }
            closure.push(oid.clone());

            let raw = self
                .database()
                .load_raw(&oid)
                .map_err(|e| e.context(format!("broken object graph at {}", oid)))?;
            let (object_type, _, body) = split_header(&raw)?;
            match object_type {
                ObjectType::Commit => {
                    let commit = crate::artifacts::objects::commit::Commit::deserialize(body)?;
                    queue.push_back(commit.tree_oid().clone());
                }
                ObjectType::Tree => {
                    let tree = crate::artifacts::objects::tree::Tree::deserialize(body)?;
                    for entry in tree.into_entries() {
                        queue.push_back(entry.oid);
                    }
                }
                ObjectType::Blob => {}
            }
        }

        Ok(closure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn commit_file(repository: &mut Repository, dir: &std::path::Path, name: &str, content: &str) -> ObjectId {
        std::fs::write(dir.join(name), content).unwrap();
        repository.add(&[PathBuf::from(name)]).unwrap();
        repository.commit(name).unwrap()
    }

    #[test]
    fn test_commits_between_is_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = Repository::init(dir.path()).unwrap();
        let c1 = commit_file(&mut repository, dir.path(), "a.txt", "1");
        let c2 = commit_file(&mut repository, dir.path(), "b.txt", "2");
        let c3 = commit_file(&mut repository, dir.path(), "c.txt", "3");

        let all = repository.commits_between(&c3, None).unwrap();
        assert_eq!(all, vec![c1.clone(), c2.clone(), c3.clone()]);

        let partial = repository.commits_between(&c3, Some(&c1)).unwrap();
        assert_eq!(partial, vec![c2, c3]);
    }

    #[test]
    fn test_closure_contains_all_reachable_objects() {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = Repository::init(dir.path()).unwrap();
        std::fs::create_dir_all(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("top.txt"), "top").unwrap();
        std::fs::write(dir.path().join("sub/leaf.txt"), "leaf").unwrap();
        repository.add(&[PathBuf::from(".")]).unwrap();
        let commit_oid = repository.commit("c1").unwrap();

        let closure = repository
            .collect_object_closure(std::slice::from_ref(&commit_oid))
            .unwrap();
        // 1 commit + root tree + sub tree + 2 blobs
        assert_eq!(closure.len(), 5);
        for oid in &closure {
            assert!(repository.database().exists(oid));
        }
    }
}
