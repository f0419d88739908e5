//! Fetch refs and objects from a remote

use crate::areas::repository::Repository;
use crate::artifacts::objects::object::{Unpackable, hash_bytes, split_header};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::remote::client::RemoteClient;
use std::collections::{HashSet, VecDeque};
use tracing::debug;

/// What a fetch brought home
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    /// Tracking refs (or tags) rewritten to new tips
    pub updated_refs: Vec<(String, ObjectId)>,
    /// Objects actually downloaded (cached objects are skipped)
    pub downloaded_objects: usize,
}

impl Repository {
    /// Fetch all branches and tags (or a single ref) from a remote
    ///
    /// Downloads the transitive object closure of every new tip with a
    /// breadth-first walk, verifying each object's hash before it is
    /// written, then rewrites the tracking refs.
    pub fn fetch(
        &mut self,
        remote: &str,
        token: &str,
        ref_filter: Option<&str>,
    ) -> anyhow::Result<FetchResult> {
        let url = self.remote_url(remote)?;
        let mut client = RemoteClient::connect(&url.host, url.port)?;
        client.target_repository(&url.repo_path)?;

        let remote_refs = client.list_refs(token)?;

        // cache the remote's HEAD line for clone and display
        if let Some((_, head_value)) = remote_refs.iter().find(|(name, _)| name == "HEAD") {
            self.refs().write_remote_head(remote, head_value)?;
        }

        // pick the branches and tags to update
        let mut selected: Vec<(String, ObjectId)> = Vec::new();
        for (name, value) in &remote_refs {
            let matches_filter = |short: &str| match ref_filter {
                Some(wanted) => short == wanted || name == wanted,
                None => true,
            };
            if let Some(short) = name.strip_prefix("refs/heads/") {
                if matches_filter(short) {
                    selected.push((name.clone(), ObjectId::try_parse(value.as_str())?));
                }
            } else if let Some(short) = name.strip_prefix("refs/tags/") {
                if matches_filter(short) {
                    selected.push((name.clone(), ObjectId::try_parse(value.as_str())?));
                }
            }
        }

        // queue tips whose tracking ref is stale
        let mut to_process: VecDeque<ObjectId> = VecDeque::new();
        let mut stale: Vec<(String, ObjectId)> = Vec::new();
        for (name, tip) in selected {
            let current = if let Some(branch) = name.strip_prefix("refs/heads/") {
                self.refs().read_remote_ref(remote, branch)?
            } else {
                let tag = name.strip_prefix("refs/tags/").unwrap_or(&name);
                self.refs().read_tag(tag)?
            };
            if current.as_ref() == Some(&tip) {
                continue;
            }
            to_process.push_back(tip.clone());
            stale.push((name, tip));
        }

        // breadth-first closure download
        let mut visited = HashSet::new();
        let mut downloaded = 0;
        while let Some(oid) = to_process.pop_front() {
            if !visited.insert(oid.clone()) {
                continue;
            }

            let raw = if self.database().exists(&oid) {
                self.database().load_raw(&oid)?
            } else {
                let (reported_hash, raw) = client
                    .get_object(token, oid.as_str())?
                    .ok_or_else(|| anyhow::anyhow!("server is missing object {}", oid))?;
                if reported_hash != oid.as_str() || hash_bytes(&raw) != oid {
                    anyhow::bail!("server sent corrupt data for object {}", oid);
                }
                self.database().write_raw(&oid, &raw)?;
                downloaded += 1;
                raw
            };

            // enqueue everything the object references
            let (object_type, _, body) = split_header(&raw)?;
            match object_type {
                ObjectType::Commit => {
                    let commit = crate::artifacts::objects::commit::Commit::deserialize(body)?;
                    to_process.push_back(commit.tree_oid().clone());
                    to_process.extend(commit.parents().iter().cloned());
                }
                ObjectType::Tree => {
                    let tree = crate::artifacts::objects::tree::Tree::deserialize(body)?;
                    for entry in tree.into_entries() {
                        to_process.push_back(entry.oid);
                    }
                }
                ObjectType::Blob => {}
            }
        }
        debug!(downloaded, refs = stale.len(), "fetch transfer complete");

        // every object landed; now move the refs
        for (name, tip) in &stale {
            if let Some(branch) = name.strip_prefix("refs/heads/") {
                self.refs().write_remote_ref(remote, branch, tip)?;
            } else if let Some(tag) = name.strip_prefix("refs/tags/") {
                self.refs().write_tag(tag, tip)?;
            }
        }

        Ok(FetchResult {
            updated_refs: stale,
            downloaded_objects: downloaded,
        })
    }
}
