//! Content-addressed object database
//!
//! Objects live at `objects/<first-2-hex>/<remaining-38-hex>`, stored
//! uncompressed so an object file's bytes always hash back to its own name.
//! Writes go through a temp file followed by a rename, and an object that is
//! already present is never rewritten, so the store is append-only.

use crate::artifacts::objects::object::{self, Object, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::commit::Commit;
use crate::artifacts::objects::tree::Tree;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of resolving a hash prefix against the store
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrefixResolution {
    /// Exactly one object matches
    Unique(ObjectId),
    /// Multiple candidates match the prefix
    Ambiguous(Vec<ObjectId>),
    /// Nothing matches
    NotFound,
}

pub struct Database {
    path: Box<Path>,
}

impl Database {
    pub fn new(path: Box<Path>) -> Self {
        Database { path }
    }

    pub fn objects_path(&self) -> &Path {
        &self.path
    }

    /// Serialize, hash and persist an object; returns its ID
    ///
    /// Writing is skipped when the object file already exists, which makes
    /// `store` idempotent.
    pub fn store(&self, object: &impl Object) -> anyhow::Result<ObjectId> {
        let content = object.serialize()?;
        let oid = object.object_id()?;
        let object_path = self.path.join(oid.to_path());

        if !object_path.exists() {
            self.write_object_file(&object_path, &content)?;
        }

        Ok(oid)
    }

    /// Load an object's verified raw bytes (header included)
    ///
    /// The file content is re-hashed and compared against the requested ID;
    /// a mismatch means on-disk corruption and fails the load.
    pub fn load_raw(&self, oid: &ObjectId) -> anyhow::Result<Bytes> {
        let object_path = self.path.join(oid.to_path());
        let content = std::fs::read(&object_path)
            .with_context(|| format!("unable to read object {}", oid))?;

        let actual = object::hash_bytes(&content);
        if &actual != oid {
            anyhow::bail!("object {} is corrupt: content hashes to {}", oid, actual);
        }

        Ok(Bytes::from(content))
    }

    fn load_body(&self, oid: &ObjectId, expected: ObjectType) -> anyhow::Result<Bytes> {
        let raw = self.load_raw(oid)?;
        let (object_type, _, body) = object::split_header(&raw)?;
        if object_type != expected {
            anyhow::bail!(
                "object {} is a {}, expected a {}",
                oid,
                object_type,
                expected
            );
        }
        Ok(raw.slice_ref(body))
    }

    pub fn load_blob(&self, oid: &ObjectId) -> anyhow::Result<Blob> {
        Blob::deserialize(&self.load_body(oid, ObjectType::Blob)?)
    }

    pub fn load_tree(&self, oid: &ObjectId) -> anyhow::Result<Tree> {
        Tree::deserialize(&self.load_body(oid, ObjectType::Tree)?)
    }

    pub fn load_commit(&self, oid: &ObjectId) -> anyhow::Result<Commit> {
        Commit::deserialize(&self.load_body(oid, ObjectType::Commit)?)
    }

    /// Kind tag of a stored object, without deserializing the body
    pub fn object_type(&self, oid: &ObjectId) -> anyhow::Result<ObjectType> {
        let raw = self.load_raw(oid)?;
        let (object_type, _, _) = object::split_header(&raw)?;
        Ok(object_type)
    }

    /// Whether an object with the given hash exists on disk
    pub fn exists(&self, oid: &ObjectId) -> bool {
        self.path.join(oid.to_path()).exists()
    }

    /// Existence probe over a full hash or a prefix
    ///
    /// Prefixes shorter than six characters and ambiguous prefixes both
    /// report `false`; the wire protocol treats them as "not found".
    pub fn contains(&self, hash_or_prefix: &str) -> bool {
        match self.resolve_prefix(hash_or_prefix) {
            Ok(PrefixResolution::Unique(_)) => true,
            Ok(_) | Err(_) => false,
        }
    }

    /// Raw object bytes (header included) by full hash or unique prefix
    pub fn raw_object(&self, hash_or_prefix: &str) -> anyhow::Result<Option<Bytes>> {
        match self.resolve_prefix(hash_or_prefix)? {
            PrefixResolution::Unique(oid) => Ok(Some(self.load_raw(&oid)?)),
            _ => Ok(None),
        }
    }

    /// Write pre-serialized object bytes verbatim
    ///
    /// The caller has already verified that `raw` hashes to `oid`; this only
    /// places the bytes at the content address. Idempotent when present.
    pub fn write_raw(&self, oid: &ObjectId, raw: &[u8]) -> anyhow::Result<()> {
        let object_path = self.path.join(oid.to_path());
        if object_path.exists() {
            return Ok(());
        }
        self.write_object_file(&object_path, raw)
    }

    /// Resolve a hash prefix to the unique object it names
    ///
    /// Walks the fan-out directory named by the first two characters and
    /// collects every file the prefix matches.
    pub fn resolve_prefix(&self, prefix: &str) -> anyhow::Result<PrefixResolution> {
        if !ObjectId::is_valid_prefix(prefix) {
            anyhow::bail!("hash prefix must be 6 to 40 hex characters: {}", prefix);
        }
        let prefix = prefix.to_ascii_lowercase();

        let (dir_part, file_part) = prefix.split_at(2);
        let fan_out = self.path.join(dir_part);
        if !fan_out.is_dir() {
            return Ok(PrefixResolution::NotFound);
        }

        let mut matches = Vec::new();
        for entry in std::fs::read_dir(&fan_out)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if file_name.starts_with(file_part) {
                matches.push(ObjectId::try_parse(format!("{}{}", dir_part, file_name))?);
            }
        }

        match matches.len() {
            0 => Ok(PrefixResolution::NotFound),
            1 => Ok(PrefixResolution::Unique(matches.remove(0))),
            _ => {
                matches.sort();
                Ok(PrefixResolution::Ambiguous(matches))
            }
        }
    }

    fn write_object_file(&self, object_path: &Path, content: &[u8]) -> anyhow::Result<()> {
        let object_dir = object_path
            .parent()
            .with_context(|| format!("invalid object path {}", object_path.display()))?;
        if !object_dir.exists() {
            std::fs::create_dir_all(object_dir).with_context(|| {
                format!("unable to create object directory {}", object_dir.display())
            })?;
        }

        // write to a temp name, then rename into place so readers never see
        // a partially-written object
        let temp_path = object_dir.join(Self::generate_temp_name());
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&temp_path)
            .with_context(|| format!("unable to open object file {}", temp_path.display()))?;
        file.write_all(content)
            .with_context(|| format!("unable to write object file {}", temp_path.display()))?;

        std::fs::rename(&temp_path, object_path).with_context(|| {
            format!("unable to rename object file to {}", object_path.display())
        })?;

        Ok(())
    }

    fn generate_temp_name() -> String {
        format!("tmp-obj-{}", rand::random::<u32>())
    }
}

/// Collect every path reachable from a tree into a flat map
///
/// Keys are repository-relative paths; values are `(blob-oid, mode)` pairs.
pub fn load_tree_contents(
    database: &Database,
    tree_oid: &ObjectId,
    prefix: &Path,
    files: &mut std::collections::BTreeMap<PathBuf, crate::artifacts::objects::tree::TreeEntry>,
) -> anyhow::Result<()> {
    let tree = database.load_tree(tree_oid)?;
    for entry in tree.into_entries() {
        let entry_path = prefix.join(&entry.name);
        if entry.is_directory() {
            load_tree_contents(database, &entry.oid, &entry_path, files)?;
        } else {
            files.insert(entry_path, entry);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::objects::blob::Blob;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn database() -> (tempfile::TempDir, Database) {
        let dir = tempfile::tempdir().unwrap();
        let database = Database::new(dir.path().join("objects").into_boxed_path());
        (dir, database)
    }

    #[rstest]
    fn test_store_and_load_blob(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(b"hello\n".to_vec());

        let oid = database.store(&blob).unwrap();
        assert_eq!(oid.as_str(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert_eq!(database.load_blob(&oid).unwrap(), blob);
    }

    #[rstest]
    fn test_store_is_idempotent(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(b"same".to_vec());

        let first = database.store(&blob).unwrap();
        let second = database.store(&blob).unwrap();
        assert_eq!(first, second);
    }

    #[rstest]
    fn test_load_detects_corruption(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(b"pristine".to_vec());
        let oid = database.store(&blob).unwrap();

        let object_path = database.objects_path().join(oid.to_path());
        std::fs::write(&object_path, b"blob 7\0tainted").unwrap();

        assert!(database.load_blob(&oid).is_err());
    }

    #[rstest]
    fn test_type_mismatch_is_an_error(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(b"not a tree".to_vec());
        let oid = database.store(&blob).unwrap();

        assert!(database.load_tree(&oid).is_err());
    }

    #[rstest]
    fn test_prefix_resolution(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.store(&Blob::new(b"prefixed".to_vec())).unwrap();

        match database.resolve_prefix(&oid.as_str()[..8]).unwrap() {
            PrefixResolution::Unique(found) => assert_eq!(found, oid),
            other => panic!("expected unique resolution, got {:?}", other),
        }
        assert_eq!(
            database.resolve_prefix("ffffff").unwrap(),
            PrefixResolution::NotFound
        );
        assert!(database.resolve_prefix("abc").is_err());
    }

    #[rstest]
    fn test_ambiguous_prefix(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        // two object files sharing an 8-char prefix, placed verbatim
        let oid_a = ObjectId::try_parse(format!("deadbeef{}", "a".repeat(32))).unwrap();
        let oid_b = ObjectId::try_parse(format!("deadbeef{}", "b".repeat(32))).unwrap();
        database.write_raw(&oid_a, b"blob 1\0x").unwrap();
        database.write_raw(&oid_b, b"blob 1\0y").unwrap();

        match database.resolve_prefix("deadbeef").unwrap() {
            PrefixResolution::Ambiguous(candidates) => {
                assert_eq!(candidates, vec![oid_a.clone(), oid_b]);
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
        // ambiguity reads as "not found" for existence probes
        assert!(!database.contains("deadbeef"));
        assert!(database.contains("deadbeefaa"));
    }

    #[rstest]
    fn test_contains_accepts_prefix(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let oid = database.store(&Blob::new(b"probe me".to_vec())).unwrap();

        assert!(database.contains(oid.as_str()));
        assert!(database.contains(&oid.as_str()[..10]));
        assert!(!database.contains("0123456789"));
        // too short to be a prefix
        assert!(!database.contains("ce0"));
    }

    #[rstest]
    fn test_write_raw_round_trip(database: (tempfile::TempDir, Database)) {
        let (_dir, database) = database;
        let blob = Blob::new(b"shipped over the wire".to_vec());
        let raw = crate::artifacts::objects::object::Packable::serialize(&blob).unwrap();
        let oid = crate::artifacts::objects::object::hash_bytes(&raw);

        database.write_raw(&oid, &raw).unwrap();
        assert_eq!(database.raw_object(oid.as_str()).unwrap().unwrap(), raw);
    }
}
