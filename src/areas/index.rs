//! The index (staging area)
//!
//! The index tracks what the next commit will contain. On disk it is a
//! newline-delimited text file, one entry per line:
//!
//! ```text
//! <mode> <blob-hex> <mtime-seconds> <mtime-nanoseconds> <size> <relative-path>
//! ```
//!
//! Entries are kept sorted ascending by path: in memory by the backing
//! `BTreeMap`, on disk by writing in iteration order. The file is loaded
//! lazily, mutated in memory and rewritten whole (truncate-and-write).

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::tree::EntryMode;
use anyhow::Context;
use derive_new::new;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// File metadata captured when an entry is staged
///
/// Comparing these fields against a fresh `stat` lets change detection skip
/// re-hashing files whose metadata is untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, new)]
pub struct EntryMetadata {
    /// Modification time (seconds since Unix epoch)
    pub mtime: i64,
    /// Modification time, nanosecond part
    pub mtime_nsec: i64,
    /// File size in bytes
    pub size: u64,
}

/// Single staged file
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct IndexEntry {
    /// Path relative to the repository root
    pub path: PathBuf,
    /// Hash of the staged blob
    pub oid: ObjectId,
    /// Entry mode (always a regular file today)
    pub mode: EntryMode,
    /// Metadata snapshot for fast change detection
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    fn to_line(&self) -> anyhow::Result<String> {
        let path = self
            .path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("index entry path is not valid UTF-8"))?;
        Ok(format!(
            "{} {} {} {} {} {}",
            self.mode,
            self.oid,
            self.metadata.mtime,
            self.metadata.mtime_nsec,
            self.metadata.size,
            path
        ))
    }

    fn try_parse_line(line: &str) -> anyhow::Result<Self> {
        let mut parts = line.splitn(6, ' ');
        let mode = EntryMode::try_parse(parts.next().context("missing mode")?)?;
        let oid = ObjectId::try_parse(parts.next().context("missing blob hash")?)?;
        let mtime: i64 = parts.next().context("missing mtime")?.parse()?;
        let mtime_nsec: i64 = parts.next().context("missing mtime nanoseconds")?.parse()?;
        let size: u64 = parts.next().context("missing size")?.parse()?;
        let path = PathBuf::from(parts.next().context("missing path")?);

        Ok(IndexEntry::new(
            path,
            oid,
            mode,
            EntryMetadata::new(mtime, mtime_nsec, size),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct Index {
    path: Box<Path>,
    entries: BTreeMap<PathBuf, IndexEntry>,
}

impl Index {
    pub fn new(path: Box<Path>) -> Self {
        Index {
            path,
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the index file into memory
    ///
    /// A missing file loads as an empty index. Any unparseable non-blank
    /// line fails the load and clears whatever was read so far.
    pub fn load(&mut self) -> anyhow::Result<()> {
        self.entries.clear();

        if !self.path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("unable to read index at {}", self.path.display()))?;

        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match IndexEntry::try_parse_line(line) {
                Ok(entry) => {
                    self.entries.insert(entry.path.clone(), entry);
                }
                Err(error) => {
                    self.entries.clear();
                    return Err(error.context(format!("corrupt index line {}", line_no + 1)));
                }
            }
        }

        Ok(())
    }

    /// Rewrite the index file from memory (truncate-and-write, sorted)
    pub fn write(&self) -> anyhow::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("unable to open index at {}", self.path.display()))?;

        for entry in self.entries.values() {
            writeln!(file, "{}", entry.to_line()?)?;
        }

        Ok(())
    }

    pub fn add_or_update_entry(&mut self, entry: IndexEntry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove_entry(&mut self, path: &Path) -> Option<IndexEntry> {
        self.entries.remove(path)
    }

    pub fn get_entry(&self, path: &Path) -> Option<&IndexEntry> {
        self.entries.get(path)
    }

    pub fn entries(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear_in_memory(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::{fixture, rstest};

    #[fixture]
    fn oid() -> ObjectId {
        ObjectId::try_parse("ce013625030ba8dba906f756967f9e9ca394464a").unwrap()
    }

    fn entry(path: &str, oid: &ObjectId) -> IndexEntry {
        IndexEntry::new(
            PathBuf::from(path),
            oid.clone(),
            EntryMode::Regular,
            EntryMetadata::new(1700000000, 123456789, 6),
        )
    }

    #[rstest]
    fn test_missing_file_loads_empty(oid: ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new(dir.path().join("index").into_boxed_path());

        index.add_or_update_entry(entry("stale.txt", &oid));
        index.load().unwrap();
        assert!(index.is_empty());
    }

    #[rstest]
    fn test_write_then_load_round_trip(oid: ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new(dir.path().join("index").into_boxed_path());

        index.add_or_update_entry(entry("b.txt", &oid));
        index.add_or_update_entry(entry("a.txt", &oid));
        index.add_or_update_entry(entry("dir/c.txt", &oid));
        index.write().unwrap();

        let mut reloaded = Index::new(index.path().to_path_buf().into_boxed_path());
        reloaded.load().unwrap();

        let paths: Vec<_> = reloaded.entries().map(|e| e.path.clone()).collect();
        assert_eq!(
            paths,
            vec![
                PathBuf::from("a.txt"),
                PathBuf::from("b.txt"),
                PathBuf::from("dir/c.txt")
            ]
        );
        assert_eq!(reloaded.get_entry(Path::new("a.txt")), Some(&entry("a.txt", &oid)));
    }

    #[rstest]
    fn test_entries_stay_sorted_after_mutation(oid: ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new(dir.path().join("index").into_boxed_path());

        index.add_or_update_entry(entry("z.txt", &oid));
        index.add_or_update_entry(entry("a.txt", &oid));
        index.remove_entry(Path::new("z.txt"));
        index.add_or_update_entry(entry("m.txt", &oid));

        let paths: Vec<_> = index.entries().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec![PathBuf::from("a.txt"), PathBuf::from("m.txt")]);
    }

    #[rstest]
    fn test_corrupt_line_fails_load_and_clears(oid: ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("index");
        std::fs::write(
            &index_path,
            format!(
                "100644 {} 1 2 3 ok.txt\nthis is not an index line\n",
                oid
            ),
        )
        .unwrap();

        let mut index = Index::new(index_path.into_boxed_path());
        assert!(index.load().is_err());
        assert!(index.is_empty());
    }

    #[rstest]
    fn test_paths_with_spaces_survive(oid: ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let mut index = Index::new(dir.path().join("index").into_boxed_path());

        index.add_or_update_entry(entry("dir/with space.txt", &oid));
        index.write().unwrap();

        let mut reloaded = Index::new(index.path().to_path_buf().into_boxed_path());
        reloaded.load().unwrap();
        assert!(reloaded.get_entry(Path::new("dir/with space.txt")).is_some());
    }
}
