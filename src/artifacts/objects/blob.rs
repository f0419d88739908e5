//! Blob object
//!
//! Blobs store raw file content. They carry no metadata; filenames and
//! modes live in tree entries.
//!
//! ## Format
//!
//! On disk: `blob <size>\0<content>`

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_type::ObjectType;
use bytes::Bytes;
use derive_new::new;
use std::io::Write;

/// Blob object holding the raw byte content of a file
#[derive(Debug, Clone, PartialEq, Eq, new)]
pub struct Blob {
    content: Vec<u8>,
}

impl Blob {
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content split into lines, lossily decoded for diff and merge display
    pub fn lines(&self) -> Vec<String> {
        let text = String::from_utf8_lossy(&self.content);
        text.lines().map(str::to_string).collect()
    }
}

impl Packable for Blob {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let mut blob_bytes = Vec::with_capacity(self.content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), self.content.len());
        blob_bytes.write_all(header.as_bytes())?;
        blob_bytes.write_all(&self.content)?;

        Ok(Bytes::from(blob_bytes))
    }
}

impl Unpackable for Blob {
    fn deserialize(body: &[u8]) -> anyhow::Result<Self> {
        Ok(Self::new(body.to_vec()))
    }
}

impl Object for Blob {
    fn object_type(&self) -> ObjectType {
        ObjectType::Blob
    }
}
