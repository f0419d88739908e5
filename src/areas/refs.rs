//! References (HEAD, branches, tags, remote-tracking refs)
//!
//! A reference file holds a 40-hex commit hash followed by a newline. `HEAD`
//! is either symbolic (`ref: refs/heads/<name>`) or detached (a bare hash).
//! Branches live under `refs/heads/`, lightweight tags under `refs/tags/`,
//! remote-tracking refs under `refs/remotes/<remote>/`, and the remote HEAD
//! cache at `refs/remotes/<remote>/HEAD` keeps the server's symbolic HEAD
//! line verbatim.
//!
//! `update_ref` is the server-side mutation point: it validates the ref
//! name, requires the new hash to name an existing commit, honors an
//! optional expected-old-hash CAS and enforces fast-forward moves on
//! branches unless overridden.

use crate::areas::database::Database;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use derive_new::new;
use std::io::Write;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Name of the HEAD reference file
pub const HEAD_REF_NAME: &str = "HEAD";

/// Maximum first-parent steps walked when testing descent
pub const FAST_FORWARD_WALK_LIMIT: usize = 1000;

/// Regex for symbolic reference lines
const SYMREF_REGEX: &str = r"^ref: (.+)$";

/// Where HEAD currently points
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadState {
    /// Symbolic ref to a branch that has at least one commit
    Branch { name: String, oid: ObjectId },
    /// Symbolic ref to a branch with no commits yet
    Unborn { name: String },
    /// Detached: HEAD holds a bare commit hash
    Detached { oid: ObjectId },
}

impl HeadState {
    pub fn oid(&self) -> Option<&ObjectId> {
        match self {
            HeadState::Branch { oid, .. } | HeadState::Detached { oid } => Some(oid),
            HeadState::Unborn { .. } => None,
        }
    }

    pub fn branch_name(&self) -> Option<&str> {
        match self {
            HeadState::Branch { name, .. } | HeadState::Unborn { name } => Some(name),
            HeadState::Detached { .. } => None,
        }
    }
}

/// Result of a server-side ref update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateRefOutcome {
    Success,
    InvalidRefName,
    NewCommitNotFound,
    RefNotFoundForUpdate,
    OldHashMismatch,
    NotFastForward,
    IoError(String),
}

impl UpdateRefOutcome {
    pub fn reason(&self) -> &str {
        match self {
            UpdateRefOutcome::Success => "ref updated",
            UpdateRefOutcome::InvalidRefName => "invalid ref name",
            UpdateRefOutcome::NewCommitNotFound => "new commit not found",
            UpdateRefOutcome::RefNotFoundForUpdate => "ref not found for update",
            UpdateRefOutcome::OldHashMismatch => "old hash mismatch",
            UpdateRefOutcome::NotFastForward => "not a fast-forward",
            UpdateRefOutcome::IoError(_) => "io error",
        }
    }
}

/// Reference manager rooted at the `.biogit` directory
#[derive(Debug, new)]
pub struct Refs {
    /// Path to the `.biogit` directory
    path: Box<Path>,
}

impl Refs {
    pub fn head_path(&self) -> PathBuf {
        self.path.join(HEAD_REF_NAME)
    }

    pub fn refs_path(&self) -> PathBuf {
        self.path.join("refs")
    }

    pub fn heads_path(&self) -> PathBuf {
        self.refs_path().join("heads")
    }

    pub fn tags_path(&self) -> PathBuf {
        self.refs_path().join("tags")
    }

    pub fn remotes_path(&self) -> PathBuf {
        self.refs_path().join("remotes")
    }

    /// Validate a bare branch or tag name
    ///
    /// Rejects empty names, `HEAD`, and names containing `/`.
    pub fn validate_short_name(name: &str) -> anyhow::Result<()> {
        if name.is_empty() {
            anyhow::bail!("ref name must not be empty");
        }
        if name == HEAD_REF_NAME {
            anyhow::bail!("'{}' is not a valid ref name", HEAD_REF_NAME);
        }
        if name.contains('/') {
            anyhow::bail!("ref name must not contain '/': {}", name);
        }
        Ok(())
    }

    /// Validate a full ref path as accepted by `update_ref`
    pub fn validate_full_name(name: &str) -> bool {
        (name.starts_with("refs/heads/") || name.starts_with("refs/tags/"))
            && !name.contains("..")
            && !name.contains("//")
            && !name.ends_with('/')
            && name
                .strip_prefix("refs/heads/")
                .or_else(|| name.strip_prefix("refs/tags/"))
                .is_some_and(|rest| !rest.is_empty())
    }

    // ---- HEAD ----

    /// Initialize HEAD as a symbolic ref to the default branch
    pub fn init_head(&self, branch: &str) -> anyhow::Result<()> {
        self.write_ref_file(&self.head_path(), &format!("ref: refs/heads/{}", branch))
    }

    /// Read and classify the current HEAD
    pub fn head_state(&self) -> anyhow::Result<HeadState> {
        let content = std::fs::read_to_string(self.head_path())
            .with_context(|| format!("unable to read {}", self.head_path().display()))?;
        let content = content.trim();

        let symref = regex::Regex::new(SYMREF_REGEX)?.captures(content);
        if let Some(symref) = symref {
            let target = symref[1].to_string();
            let name = target
                .strip_prefix("refs/heads/")
                .unwrap_or(&target)
                .to_string();
            match self.read_ref_file(&self.path.join(&target))? {
                Some(oid) => Ok(HeadState::Branch { name, oid }),
                None => Ok(HeadState::Unborn { name }),
            }
        } else {
            Ok(HeadState::Detached {
                oid: ObjectId::try_parse(content)?,
            })
        }
    }

    /// Commit hash HEAD resolves to, if any
    pub fn read_head(&self) -> anyhow::Result<Option<ObjectId>> {
        Ok(self.head_state()?.oid().cloned())
    }

    /// Re-point HEAD symbolically at a branch
    pub fn set_head_to_branch(&self, branch: &str) -> anyhow::Result<()> {
        self.write_ref_file(&self.head_path(), &format!("ref: refs/heads/{}", branch))
    }

    /// Detach HEAD at a specific commit
    pub fn set_head_detached(&self, oid: &ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.head_path(), oid.as_str())
    }

    /// Advance whatever HEAD points at (the branch ref, or HEAD itself when
    /// detached) to a new commit
    pub fn advance_head(&self, oid: &ObjectId) -> anyhow::Result<()> {
        match self.head_state()? {
            HeadState::Branch { name, .. } | HeadState::Unborn { name } => {
                self.write_ref_file(&self.heads_path().join(&name), oid.as_str())
            }
            HeadState::Detached { .. } => self.set_head_detached(oid),
        }
    }

    /// Raw single-line content of HEAD (symbolic line or hash)
    pub fn raw_head(&self) -> anyhow::Result<String> {
        let content = std::fs::read_to_string(self.head_path())?;
        Ok(content.trim().to_string())
    }

    // ---- branches ----

    pub fn branch_exists(&self, name: &str) -> bool {
        self.heads_path().join(name).is_file()
    }

    pub fn create_branch(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        Self::validate_short_name(name)?;
        let branch_path = self.heads_path().join(name);
        if branch_path.exists() {
            anyhow::bail!("branch '{}' already exists", name);
        }
        self.write_ref_file(&branch_path, oid.as_str())
    }

    pub fn read_branch(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref_file(&self.heads_path().join(name))
    }

    /// Move an existing branch tip (no existence refusal)
    pub fn write_branch(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.heads_path().join(name), oid.as_str())
    }

    pub fn delete_branch(&self, name: &str) -> anyhow::Result<ObjectId> {
        let branch_path = self.heads_path().join(name);
        let oid = self
            .read_ref_file(&branch_path)?
            .ok_or_else(|| anyhow::anyhow!("branch '{}' does not exist", name))?;
        std::fs::remove_file(&branch_path)
            .with_context(|| format!("failed to delete branch file {}", branch_path.display()))?;
        Ok(oid)
    }

    pub fn list_branches(&self) -> anyhow::Result<Vec<(String, ObjectId)>> {
        self.list_ref_dir(&self.heads_path())
    }

    // ---- tags ----

    pub fn create_tag(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        Self::validate_short_name(name)?;
        let tag_path = self.tags_path().join(name);
        if tag_path.exists() {
            anyhow::bail!("tag '{}' already exists", name);
        }
        self.write_ref_file(&tag_path, oid.as_str())
    }

    pub fn read_tag(&self, name: &str) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref_file(&self.tags_path().join(name))
    }

    /// Rewrite a tag pointer (used by fetch; no existence refusal)
    pub fn write_tag(&self, name: &str, oid: &ObjectId) -> anyhow::Result<()> {
        self.write_ref_file(&self.tags_path().join(name), oid.as_str())
    }

    pub fn delete_tag(&self, name: &str) -> anyhow::Result<ObjectId> {
        let tag_path = self.tags_path().join(name);
        let oid = self
            .read_ref_file(&tag_path)?
            .ok_or_else(|| anyhow::anyhow!("tag '{}' does not exist", name))?;
        std::fs::remove_file(&tag_path)
            .with_context(|| format!("failed to delete tag file {}", tag_path.display()))?;
        Ok(oid)
    }

    pub fn list_tags(&self) -> anyhow::Result<Vec<(String, ObjectId)>> {
        self.list_ref_dir(&self.tags_path())
    }

    // ---- remote-tracking refs ----

    pub fn read_remote_ref(&self, remote: &str, branch: &str) -> anyhow::Result<Option<ObjectId>> {
        self.read_ref_file(&self.remotes_path().join(remote).join(branch))
    }

    pub fn write_remote_ref(
        &self,
        remote: &str,
        branch: &str,
        oid: &ObjectId,
    ) -> anyhow::Result<()> {
        self.write_ref_file(&self.remotes_path().join(remote).join(branch), oid.as_str())
    }

    /// Persist the remote's HEAD line (symbolic or hash) verbatim
    pub fn write_remote_head(&self, remote: &str, raw_value: &str) -> anyhow::Result<()> {
        self.write_ref_file(&self.remotes_path().join(remote).join(HEAD_REF_NAME), raw_value)
    }

    pub fn read_remote_head(&self, remote: &str) -> anyhow::Result<Option<String>> {
        let path = self.remotes_path().join(remote).join(HEAD_REF_NAME);
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(content.trim().to_string()))
    }

    // ---- server-side surface ----

    /// Ordered `(ref-name, value)` list: HEAD first (raw line), then
    /// branches and tags with their hashes
    pub fn all_local_refs(&self) -> anyhow::Result<Vec<(String, String)>> {
        let mut refs = Vec::new();

        if self.head_path().exists() {
            refs.push((HEAD_REF_NAME.to_string(), self.raw_head()?));
        }
        for (name, oid) in self.list_branches()? {
            refs.push((format!("refs/heads/{}", name), oid.to_string()));
        }
        for (name, oid) in self.list_tags()? {
            refs.push((format!("refs/tags/{}", name), oid.to_string()));
        }

        Ok(refs)
    }

    /// Update or create a ref under the CAS / fast-forward policy
    pub fn update_ref(
        &self,
        database: &Database,
        ref_full_name: &str,
        new_hash: &str,
        expected_old_hash: Option<&str>,
        allow_non_fast_forward: bool,
    ) -> UpdateRefOutcome {
        if !Self::validate_full_name(ref_full_name) {
            return UpdateRefOutcome::InvalidRefName;
        }

        let new_oid = match ObjectId::try_parse(new_hash) {
            Ok(oid) => oid,
            Err(_) => return UpdateRefOutcome::NewCommitNotFound,
        };
        match database.object_type(&new_oid) {
            Ok(ObjectType::Commit) => {}
            _ => return UpdateRefOutcome::NewCommitNotFound,
        }

        let ref_path = self.path.join(ref_full_name);
        let current = match self.read_ref_file(&ref_path) {
            Ok(current) => current,
            Err(error) => return UpdateRefOutcome::IoError(error.to_string()),
        };

        if let Some(expected) = expected_old_hash {
            match &current {
                None => return UpdateRefOutcome::RefNotFoundForUpdate,
                Some(current_oid) if current_oid.as_str() != expected => {
                    return UpdateRefOutcome::OldHashMismatch;
                }
                Some(_) => {}
            }
        }

        if ref_full_name.starts_with("refs/heads/")
            && !allow_non_fast_forward
            && let Some(current_oid) = &current
            && current_oid != &new_oid
            && !is_fast_forward(database, current_oid, &new_oid)
        {
            return UpdateRefOutcome::NotFastForward;
        }

        match self.write_ref_file(&ref_path, new_oid.as_str()) {
            Ok(()) => UpdateRefOutcome::Success,
            Err(error) => UpdateRefOutcome::IoError(error.to_string()),
        }
    }

    // ---- file plumbing ----

    fn read_ref_file(&self, path: &Path) -> anyhow::Result<Option<ObjectId>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read ref file at {}", path.display()))?;
        let content = content.trim();
        if content.is_empty() {
            return Ok(None);
        }
        Ok(Some(ObjectId::try_parse(content)?))
    }

    fn write_ref_file(&self, path: &Path, value: &str) -> anyhow::Result<()> {
        let parent = path
            .parent()
            .with_context(|| format!("ref path has no parent: {}", path.display()))?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create ref directory {}", parent.display()))?;

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .with_context(|| format!("failed to open ref file at {}", path.display()))?;
        writeln!(file, "{}", value)?;

        Ok(())
    }

    fn list_ref_dir(&self, dir: &Path) -> anyhow::Result<Vec<(String, ObjectId)>> {
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut refs = WalkDir::new(dir)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().is_file())
            .filter_map(|entry| {
                let name = entry
                    .path()
                    .strip_prefix(dir)
                    .ok()?
                    .to_string_lossy()
                    .to_string();
                let oid = self.read_ref_file(entry.path()).ok()??;
                Some((name, oid))
            })
            .collect::<Vec<_>>();
        refs.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(refs)
    }
}

/// Test whether `new` is a descendant of `old` along first-parent links
///
/// The walk is bounded at [`FAST_FORWARD_WALK_LIMIT`] steps and keeps a
/// visited set, so malformed cyclic histories terminate.
pub fn is_fast_forward(database: &Database, old: &ObjectId, new: &ObjectId) -> bool {
    if old == new {
        return true;
    }

    let mut visited = std::collections::HashSet::new();
    let mut current = new.clone();

    for _ in 0..FAST_FORWARD_WALK_LIMIT {
        if current == *old {
            return true;
        }
        if !visited.insert(current.clone()) {
            return false;
        }
        match database.load_commit(&current) {
            Ok(commit) => match commit.first_parent() {
                Some(parent) => current = parent.clone(),
                None => return false,
            },
            Err(_) => return false,
        }
    }

    current == *old
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::proptest;
    use rstest::rstest;

    #[test]
    fn test_validate_short_name() {
        assert!(Refs::validate_short_name("main").is_ok());
        assert!(Refs::validate_short_name("feature-1").is_ok());
        assert!(Refs::validate_short_name("").is_err());
        assert!(Refs::validate_short_name("HEAD").is_err());
        assert!(Refs::validate_short_name("feature/nested").is_err());
    }

    #[rstest]
    #[case("refs/heads/main", true)]
    #[case("refs/tags/v1.0", true)]
    #[case("refs/heads/feature/nested", true)]
    #[case("refs/heads/", false)]
    #[case("refs/heads/a..b", false)]
    #[case("refs/heads//double", false)]
    #[case("refs/heads/trailing/", false)]
    #[case("refs/remotes/origin/main", false)]
    #[case("HEAD", false)]
    fn test_validate_full_name(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(Refs::validate_full_name(name), expected);
    }

    proptest! {
        #[test]
        fn test_simple_branch_names_are_valid(name in "[a-zA-Z0-9_-]{1,24}") {
            if name != "HEAD" {
                assert!(Refs::validate_short_name(&name).is_ok());
            }
        }

        #[test]
        fn test_full_names_with_dotdot_are_invalid(
            prefix in "[a-z]{1,8}", suffix in "[a-z]{1,8}"
        ) {
            let name = format!("refs/heads/{}..{}", prefix, suffix);
            assert!(!Refs::validate_full_name(&name));
        }
    }

    #[test]
    fn test_head_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path());

        refs.init_head("main").unwrap();
        assert_eq!(
            refs.head_state().unwrap(),
            HeadState::Unborn {
                name: "main".into()
            }
        );

        let oid = ObjectId::try_parse("a".repeat(40)).unwrap();
        refs.advance_head(&oid).unwrap();
        assert_eq!(
            refs.head_state().unwrap(),
            HeadState::Branch {
                name: "main".into(),
                oid: oid.clone()
            }
        );
        assert_eq!(refs.read_branch("main").unwrap(), Some(oid.clone()));

        refs.set_head_detached(&oid).unwrap();
        assert_eq!(refs.head_state().unwrap(), HeadState::Detached { oid });
    }

    #[test]
    fn test_branch_create_refuses_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path());
        let oid = ObjectId::try_parse("b".repeat(40)).unwrap();

        refs.create_branch("main", &oid).unwrap();
        assert!(refs.create_branch("main", &oid).is_err());
    }

    #[test]
    fn test_fast_forward_walk_is_depth_bounded() {
        use crate::artifacts::objects::commit::{Commit, Signature};

        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        let tree = ObjectId::try_parse("0".repeat(40)).unwrap();
        let base_time = chrono::DateTime::from_timestamp(1700000000, 0)
            .unwrap()
            .fixed_offset();

        // a first-parent chain longer than the walk limit
        let mut chain = Vec::new();
        let mut parent: Option<ObjectId> = None;
        for i in 0..(FAST_FORWARD_WALK_LIMIT + 5) {
            let signature = Signature::new_with_timestamp(
                "t".into(),
                "t@example.com".into(),
                base_time + chrono::Duration::seconds(i as i64),
            );
            let commit = Commit::new(
                parent.iter().cloned().collect(),
                tree.clone(),
                signature,
                format!("c{}", i),
            );
            let oid = database.store(&commit).unwrap();
            chain.push(oid.clone());
            parent = Some(oid);
        }

        let root = &chain[0];
        let tip = chain.last().unwrap();
        let near_tip = &chain[chain.len() - 900];

        // within the limit the descent is found
        assert!(is_fast_forward(&database, near_tip, tip));
        // beyond the limit the walk gives up
        assert!(!is_fast_forward(&database, root, tip));
        // never a descent in the other direction
        assert!(!is_fast_forward(&database, tip, root));
    }

    #[test]
    fn test_all_local_refs_order() {
        let dir = tempfile::tempdir().unwrap();
        let refs = Refs::new(dir.path().to_path_buf().into_boxed_path());
        let oid = ObjectId::try_parse("c".repeat(40)).unwrap();

        refs.init_head("main").unwrap();
        refs.create_branch("main", &oid).unwrap();
        refs.create_branch("dev", &oid).unwrap();
        refs.create_tag("v1", &oid).unwrap();

        let all = refs.all_local_refs().unwrap();
        let names: Vec<_> = all.iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["HEAD", "refs/heads/dev", "refs/heads/main", "refs/tags/v1"]
        );
        assert_eq!(all[0].1, "ref: refs/heads/main");
    }
}
