//! Tree object
//!
//! Trees snapshot one directory level: an ordered list of entries pointing
//! at blobs (files) or other trees (subdirectories).
//!
//! ## Format
//!
//! On disk: `tree <size>\0<entries>`, each entry `<mode> <name>\0<40-hex>`.
//! The referenced hash is embedded as 40 ASCII hex characters.
//!
//! ## Ordering
//!
//! Entries sort by `name` with `/` appended iff the entry is a subtree, so
//! `foo` (a file) orders before `foo.txt` but after `fo/`. This directory-
//! aware sort is part of the on-disk contract and `add_entry` restores it.

use crate::artifacts::objects::OBJECT_ID_LENGTH;
use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

/// File/directory mode carried by a tree entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EntryMode {
    #[default]
    Regular,
    Directory,
}

impl EntryMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryMode::Regular => "100644",
            EntryMode::Directory => "040000",
        }
    }

    pub fn try_parse(value: &str) -> anyhow::Result<Self> {
        match value {
            "100644" => Ok(EntryMode::Regular),
            "040000" => Ok(EntryMode::Directory),
            other => Err(anyhow::anyhow!("unsupported entry mode: {}", other)),
        }
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, EntryMode::Directory)
    }
}

impl std::fmt::Display for EntryMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Single tree entry: a named pointer to a blob or a subtree
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct TreeEntry {
    pub mode: EntryMode,
    pub name: String,
    pub oid: ObjectId,
}

impl TreeEntry {
    pub fn is_directory(&self) -> bool {
        self.mode.is_directory()
    }

    /// Sort key: directories compare with a trailing slash
    fn sort_key(&self) -> String {
        if self.is_directory() {
            format!("{}/", self.name)
        } else {
            self.name.clone()
        }
    }
}

/// Tree object representing one directory level
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Tree {
    entries: Vec<TreeEntry>,
}

impl Tree {
    /// Add an entry, keeping the directory-aware sort order
    pub fn add_entry(&mut self, entry: TreeEntry) {
        self.entries.push(entry);
        self.entries.sort_by_key(|e| e.sort_key());
    }

    pub fn entries(&self) -> &[TreeEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<TreeEntry> {
        self.entries
    }

    /// Human-readable listing, one `<mode> <type> <hash>\t<name>` per line
    pub fn display(&self) -> String {
        self.entries
            .iter()
            .map(|entry| {
                let object_type = if entry.is_directory() { "tree" } else { "blob" };
                format!(
                    "{} {} {}\t{}",
                    entry.mode.as_str(),
                    object_type,
                    entry.oid,
                    entry.name
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl Packable for Tree {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut content_bytes = Vec::new();
        for entry in &self.entries {
            write!(content_bytes, "{} {}", entry.mode.as_str(), entry.name)?;
            content_bytes.push(0);
            content_bytes.write_all(entry.oid.as_str().as_bytes())?;
        }

        let mut tree_bytes = Vec::with_capacity(content_bytes.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content_bytes.len());
        tree_bytes.write_all(header.as_bytes())?;
        tree_bytes.write_all(&content_bytes)?;

        Ok(Bytes::from(tree_bytes))
    }
}

impl Unpackable for Tree {
    fn deserialize(body: &[u8]) -> anyhow::Result<Self> {
        let mut entries = Vec::new();
        let mut rest = body;

        while !rest.is_empty() {
            // "<mode> <name>\0"
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| anyhow::anyhow!("unexpected end of tree entry mode"))?;
            let mode = EntryMode::try_parse(std::str::from_utf8(&rest[..space])?)?;
            rest = &rest[space + 1..];

            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| anyhow::anyhow!("unexpected end of tree entry name"))?;
            let name = std::str::from_utf8(&rest[..nul])?.to_string();
            rest = &rest[nul + 1..];

            // 40 hex chars follow the NUL
            if rest.len() < OBJECT_ID_LENGTH {
                anyhow::bail!("unexpected end of tree entry hash");
            }
            let oid = ObjectId::try_parse(std::str::from_utf8(&rest[..OBJECT_ID_LENGTH])?)?;
            rest = &rest[OBJECT_ID_LENGTH..];

            entries.push(TreeEntry::new(mode, name, oid));
        }

        Ok(Tree { entries })
    }
}

impl Object for Tree {
    fn object_type(&self) -> ObjectType {
        ObjectType::Tree
    }
}
