//! Repository facade
//!
//! `Repository` wires the lower-level areas together (object database,
//! index, refs, workspace and config) and carries the helpers that several
//! porcelain operations share: flat tree maps, the bottom-up tree builder,
//! index repopulation and the clean-workspace check.
//!
//! The porcelain operations themselves live in `commands::porcelain`, one
//! file per command, as `impl Repository` blocks.

use crate::areas::config::Config;
use crate::areas::database::{self, Database};
use crate::areas::index::{EntryMetadata, Index, IndexEntry};
use crate::areas::refs::Refs;
use crate::areas::workspace::Workspace;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::object::Object;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::{EntryMode, Tree, TreeEntry};
use anyhow::Context;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Repository directory name inside the working tree
pub const BIOGIT_DIR: &str = ".biogit";

/// Object database directory name
const DATABASE_DIR: &str = "objects";

/// Index file name
const INDEX_FILE: &str = "index";

/// Config file name
const CONFIG_FILE: &str = "config";

/// Present during an unresolved merge; holds the THEIRS commit hash
const MERGE_HEAD_FILE: &str = "MERGE_HEAD";

/// Newline-delimited list of conflicted paths during a merge
const CONFLICTS_FILE: &str = "FILE_CONFLICTS";

/// Cached authentication token written by `login`
const TOKEN_FILE: &str = "biogit_token";

/// Default branch created by `init`
pub const DEFAULT_BRANCH: &str = "main";

/// Flat snapshot of a tree: repository-relative path to blob entry
pub type TreeMap = BTreeMap<PathBuf, TreeEntry>;

pub struct Repository {
    work_root: Box<Path>,
    biogit_dir: Box<Path>,
    database: Database,
    index: Index,
    workspace: Workspace,
    refs: Refs,
    config: Config,
}

impl Repository {
    /// Initialize a new repository at `path`
    ///
    /// Creates the working tree if missing and the `.biogit` skeleton with
    /// HEAD pointing symbolically at the default branch. Fails when
    /// `.biogit` already exists.
    pub fn init(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            std::fs::create_dir_all(path)
                .with_context(|| format!("unable to create {}", path.display()))?;
        }
        let work_root = path.canonicalize()?;
        let biogit_dir = work_root.join(BIOGIT_DIR);

        if biogit_dir.exists() {
            anyhow::bail!("repository already exists at {}", biogit_dir.display());
        }

        std::fs::create_dir_all(biogit_dir.join(DATABASE_DIR))?;
        std::fs::create_dir_all(biogit_dir.join("refs").join("heads"))?;
        std::fs::create_dir_all(biogit_dir.join("refs").join("tags"))?;

        let repository = Self::assemble(work_root)?;
        repository.refs().init_head(DEFAULT_BRANCH)?;
        repository.index.write()?;

        Ok(repository)
    }

    /// Load an existing repository whose working tree root is `path`
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let work_root = path
            .canonicalize()
            .with_context(|| format!("no such directory: {}", path.display()))?;
        if !work_root.join(BIOGIT_DIR).is_dir() {
            anyhow::bail!("not a biogit repository: {}", work_root.display());
        }

        let mut repository = Self::assemble(work_root)?;
        repository.index.load()?;
        repository.config.load()?;

        Ok(repository)
    }

    /// Walk upwards from `start` looking for a `.biogit` directory
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let mut current = Some(start.to_path_buf());
        while let Some(dir) = current {
            if dir.join(BIOGIT_DIR).is_dir() {
                return Some(dir);
            }
            current = dir.parent().map(Path::to_path_buf);
        }
        None
    }

    fn assemble(work_root: PathBuf) -> anyhow::Result<Self> {
        let biogit_dir = work_root.join(BIOGIT_DIR);

        let database = Database::new(biogit_dir.join(DATABASE_DIR).into_boxed_path());
        let index = Index::new(biogit_dir.join(INDEX_FILE).into_boxed_path());
        let workspace = Workspace::new(work_root.clone().into_boxed_path());
        let refs = Refs::new(biogit_dir.clone().into_boxed_path());
        let config = Config::new(biogit_dir.join(CONFIG_FILE).into_boxed_path());

        Ok(Repository {
            work_root: work_root.into_boxed_path(),
            biogit_dir: biogit_dir.into_boxed_path(),
            database,
            index,
            workspace,
            refs,
            config,
        })
    }

    /// Working tree root (the directory that holds `.biogit`)
    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    pub fn biogit_dir(&self) -> &Path {
        &self.biogit_dir
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn index(&self) -> &Index {
        &self.index
    }

    pub fn index_mut(&mut self) -> &mut Index {
        &mut self.index
    }

    pub fn workspace(&self) -> &Workspace {
        &self.workspace
    }

    pub fn refs(&self) -> &Refs {
        &self.refs
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut Config {
        &mut self.config
    }

    // ---- merge state files ----

    pub fn merge_head_path(&self) -> PathBuf {
        self.biogit_dir.join(MERGE_HEAD_FILE)
    }

    pub fn conflicts_path(&self) -> PathBuf {
        self.biogit_dir.join(CONFLICTS_FILE)
    }

    pub fn token_path(&self) -> PathBuf {
        self.biogit_dir.join(TOKEN_FILE)
    }

    pub fn merge_in_progress(&self) -> bool {
        self.merge_head_path().is_file()
    }

    pub fn read_merge_head(&self) -> anyhow::Result<Option<ObjectId>> {
        let path = self.merge_head_path();
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(Some(ObjectId::try_parse(content.trim())?))
    }

    pub fn write_merge_state(
        &self,
        theirs: &ObjectId,
        conflicted_paths: &[PathBuf],
    ) -> anyhow::Result<()> {
        std::fs::write(self.merge_head_path(), format!("{}\n", theirs))?;
        let listing = conflicted_paths
            .iter()
            .map(|path| path.to_string_lossy().to_string())
            .collect::<Vec<_>>()
            .join("\n");
        std::fs::write(self.conflicts_path(), format!("{}\n", listing))?;
        Ok(())
    }

    pub fn read_conflicted_paths(&self) -> anyhow::Result<Vec<PathBuf>> {
        let path = self.conflicts_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(PathBuf::from)
            .collect())
    }

    pub fn clear_merge_state(&self) -> anyhow::Result<()> {
        for path in [self.merge_head_path(), self.conflicts_path()] {
            if path.exists() {
                std::fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    pub fn read_cached_token(&self) -> Option<String> {
        std::fs::read_to_string(self.token_path())
            .ok()
            .map(|token| token.trim().to_string())
            .filter(|token| !token.is_empty())
    }

    pub fn write_cached_token(&self, token: &str) -> anyhow::Result<()> {
        std::fs::write(self.token_path(), format!("{}\n", token))?;
        Ok(())
    }

    // ---- shared helpers ----

    /// HEAD commit, if the current branch has any history
    pub fn head_commit(&self) -> anyhow::Result<Option<Commit>> {
        match self.refs.read_head()? {
            Some(oid) => Ok(Some(self.database.load_commit(&oid)?)),
            None => Ok(None),
        }
    }

    /// Flat path map of the tree behind a commit
    pub fn tree_map_of_commit(&self, commit_oid: &ObjectId) -> anyhow::Result<TreeMap> {
        let commit = self.database.load_commit(commit_oid)?;
        self.tree_map_of_tree(commit.tree_oid())
    }

    pub fn tree_map_of_tree(&self, tree_oid: &ObjectId) -> anyhow::Result<TreeMap> {
        let mut files = TreeMap::new();
        database::load_tree_contents(&self.database, tree_oid, Path::new(""), &mut files)?;
        Ok(files)
    }

    /// Flat path map of the HEAD commit's tree (empty when unborn)
    pub fn head_tree_map(&self) -> anyhow::Result<TreeMap> {
        match self.refs.read_head()? {
            Some(oid) => self.tree_map_of_commit(&oid),
            None => Ok(TreeMap::new()),
        }
    }

    /// Build and store the hierarchical trees for the current index
    ///
    /// Directories are built deepest-first (ties broken by decreasing
    /// lexicographic order) so every parent tree can reference its children
    /// by hash. Returns the root tree's ID.
    pub fn build_root_tree(&self) -> anyhow::Result<ObjectId> {
        // every directory ancestor of every indexed path, plus the root
        let mut directories = std::collections::BTreeSet::new();
        directories.insert(PathBuf::new());
        for entry in self.index.entries() {
            let mut parent = entry.path.parent();
            while let Some(dir) = parent {
                directories.insert(dir.to_path_buf());
                parent = dir.parent();
            }
        }

        let mut ordered: Vec<PathBuf> = directories.into_iter().collect();
        ordered.sort_by(|a, b| {
            let depth = |p: &PathBuf| p.components().count();
            depth(b)
                .cmp(&depth(a))
                .then_with(|| b.cmp(a))
        });

        let mut built: BTreeMap<PathBuf, ObjectId> = BTreeMap::new();
        let mut root_oid = None;

        for dir in ordered {
            let mut tree = Tree::default();

            for entry in self.index.entries() {
                if entry.path.parent() == Some(dir.as_path()) {
                    let name = entry
                        .path
                        .file_name()
                        .and_then(|n| n.to_str())
                        .ok_or_else(|| anyhow::anyhow!("invalid index path"))?;
                    tree.add_entry(TreeEntry::new(
                        entry.mode,
                        name.to_string(),
                        entry.oid.clone(),
                    ));
                }
            }

            for (child_dir, child_oid) in &built {
                if child_dir.parent() == Some(dir.as_path()) {
                    let name = child_dir
                        .file_name()
                        .and_then(|n| n.to_str())
                        .ok_or_else(|| anyhow::anyhow!("invalid directory name"))?;
                    tree.add_entry(TreeEntry::new(
                        EntryMode::Directory,
                        name.to_string(),
                        child_oid.clone(),
                    ));
                }
            }

            let oid = self.database.store(&tree)?;
            if dir.as_os_str().is_empty() {
                root_oid = Some(oid.clone());
            }
            built.insert(dir, oid);
        }

        root_oid.ok_or_else(|| anyhow::anyhow!("tree build produced no root"))
    }

    /// Rebuild the index from a tree snapshot
    ///
    /// Metadata is taken from the working tree when the file is present,
    /// which canonicalizes mtime and size after a commit or checkout.
    pub fn populate_index_from_tree(&mut self, tree_oid: &ObjectId) -> anyhow::Result<()> {
        let files = self.tree_map_of_tree(tree_oid)?;

        self.index.clear_in_memory();
        for (path, entry) in files {
            let metadata = self
                .workspace
                .stat_file(&path)
                .unwrap_or_else(|_| EntryMetadata::new(0, 0, 0));
            self.index
                .add_or_update_entry(IndexEntry::new(path, entry.oid, entry.mode, metadata));
        }
        self.index.write()?;

        Ok(())
    }

    /// Move the working tree from one snapshot to another
    ///
    /// Files present in `old` but absent in `new` are deleted (their empty
    /// parent directories pruned); everything in `new` is written out.
    pub fn update_working_tree(&self, old: &TreeMap, new: &TreeMap) -> anyhow::Result<()> {
        for path in old.keys() {
            if !new.contains_key(path) {
                self.workspace.remove_file(path)?;
            }
        }
        for (path, entry) in new {
            let blob = self.database.load_blob(&entry.oid)?;
            self.workspace.write_file(path, blob.content())?;
        }
        Ok(())
    }

    /// Whether the index matches HEAD and the working tree matches the index
    ///
    /// Untracked files never violate cleanliness.
    pub fn is_workspace_clean(&self) -> anyhow::Result<bool> {
        let head_map = self.head_tree_map()?;

        if head_map.len() != self.index.len() {
            return Ok(false);
        }
        for entry in self.index.entries() {
            match head_map.get(&entry.path) {
                Some(head_entry)
                    if head_entry.oid == entry.oid && head_entry.mode == entry.mode => {}
                _ => return Ok(false),
            }
        }

        for entry in self.index.entries() {
            if !self.workspace.file_exists(&entry.path) {
                return Ok(false);
            }
            let metadata = self.workspace.stat_file(&entry.path)?;
            if metadata == entry.metadata {
                continue;
            }
            let content = self.workspace.read_file(&entry.path)?;
            let blob = crate::artifacts::objects::blob::Blob::new(content);
            if blob.object_id()? != entry.oid {
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Read `user.name` / `user.email` with fallbacks
    pub fn author_signature(&self) -> crate::artifacts::objects::commit::Signature {
        let name = self
            .config
            .get("user.name")
            .unwrap_or("biogit user")
            .to_string();
        let email = self
            .config
            .get("user.email")
            .unwrap_or("biogit@localhost")
            .to_string();
        crate::artifacts::objects::commit::Signature::new(name, email)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_init_creates_layout() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::init(dir.path()).unwrap();

        assert!(repository.biogit_dir().join("objects").is_dir());
        assert!(repository.biogit_dir().join("refs/heads").is_dir());
        assert!(repository.biogit_dir().join("refs/tags").is_dir());
        assert_eq!(
            std::fs::read_to_string(repository.biogit_dir().join("HEAD")).unwrap(),
            "ref: refs/heads/main\n"
        );
        assert!(repository.biogit_dir().join("index").is_file());
        assert_eq!(
            repository.work_root(),
            dir.path().canonicalize().unwrap().as_path()
        );
    }

    #[test]
    fn test_init_twice_fails() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        assert!(Repository::init(dir.path()).is_err());
    }

    #[test]
    fn test_load_requires_repository() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Repository::load(dir.path()).is_err());
    }

    #[test]
    fn test_find_root_walks_upwards() {
        let dir = tempfile::tempdir().unwrap();
        Repository::init(dir.path()).unwrap();
        let nested = dir.path().join("a/b/c");
        std::fs::create_dir_all(&nested).unwrap();

        let root = Repository::find_root(&nested).unwrap();
        assert_eq!(root, dir.path().to_path_buf());
    }

    #[test]
    fn test_fresh_repository_is_clean() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        assert!(repository.is_workspace_clean().unwrap());
    }

    #[test]
    fn test_merge_state_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        let theirs = ObjectId::try_parse("d".repeat(40)).unwrap();

        repository
            .write_merge_state(&theirs, &[PathBuf::from("conflicted.txt")])
            .unwrap();
        assert!(repository.merge_in_progress());
        assert_eq!(repository.read_merge_head().unwrap(), Some(theirs));
        assert_eq!(
            repository.read_conflicted_paths().unwrap(),
            vec![PathBuf::from("conflicted.txt")]
        );

        repository.clear_merge_state().unwrap();
        assert!(!repository.merge_in_progress());
    }
}
