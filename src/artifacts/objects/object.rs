//! Core object traits
//!
//! All objects are stored as `<type> <size>\0<content>` and named by the
//! SHA-1 of those bytes. The traits here define the canonical serialization
//! and the ID computation shared by every object kind:
//!
//! - `Packable`: serialization to the on-disk byte format (header included)
//! - `Unpackable`: deserialization from the body bytes (header stripped)
//! - `Object`: common operations (type tag, ID computation, store path)

use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Result;
use bytes::Bytes;
use sha1::{Digest, Sha1};
use std::path::PathBuf;

/// Trait for serializing objects to the canonical byte format
pub trait Packable {
    /// Serialize the object to bytes (including the `<type> <size>\0` header)
    fn serialize(&self) -> Result<Bytes>;
}

/// Trait for deserializing objects from the canonical byte format
pub trait Unpackable {
    /// Deserialize the object from its body bytes (header already consumed)
    fn deserialize(body: &[u8]) -> Result<Self>
    where
        Self: Sized;
}

/// Common object operations implemented by Blob, Tree and Commit
pub trait Object: Packable {
    /// Get the object's kind tag
    fn object_type(&self) -> ObjectType;

    /// Compute the object ID by hashing the serialized content
    fn object_id(&self) -> Result<ObjectId> {
        let content = self.serialize()?;
        let mut hasher = Sha1::new();
        hasher.update(&content);

        let oid = hasher.finalize();
        ObjectId::try_parse(format!("{oid:x}"))
    }

    /// Get the store path (`xx/yyyy…`) where this object would live
    fn object_path(&self) -> Result<PathBuf> {
        Ok(self.object_id()?.to_path())
    }
}

/// Compute the SHA-1 digest of an arbitrary byte sequence as a 40-hex ID
pub fn hash_bytes(data: &[u8]) -> ObjectId {
    let mut hasher = Sha1::new();
    hasher.update(data);
    let oid = hasher.finalize();
    // a 20-byte digest always formats to 40 hex chars
    ObjectId::try_parse(format!("{oid:x}")).expect("sha1 digest is always a valid object id")
}

/// Split a serialized object into `(type, declared size, body)`
///
/// Fails when the header is missing its NUL terminator, the type tag is
/// unknown, or the declared size does not match the body length.
pub fn split_header(raw: &[u8]) -> Result<(ObjectType, usize, &[u8])> {
    let nul = raw
        .iter()
        .position(|&b| b == 0)
        .ok_or_else(|| anyhow::anyhow!("object header is missing its NUL terminator"))?;

    let header = std::str::from_utf8(&raw[..nul])?;
    let (type_str, size_str) = header
        .split_once(' ')
        .ok_or_else(|| anyhow::anyhow!("malformed object header: {}", header))?;

    let object_type = ObjectType::try_parse(type_str)?;
    let size: usize = size_str
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid object size in header: {}", size_str))?;

    let body = &raw[nul + 1..];
    if body.len() != size {
        anyhow::bail!(
            "object size mismatch: header declares {} bytes, body has {}",
            size,
            body.len()
        );
    }

    Ok((object_type, size, body))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_hash_of_empty_blob_bytes() {
        // SHA1("blob 0\0")
        let id = hash_bytes(b"blob 0\0");
        assert_eq!(id.as_str(), "e69de29bb2d1d6434b8b29ae775ad8c2e48c5391");
    }

    #[test]
    fn test_split_header_round_trip() {
        let raw = b"blob 6\0hello\n";
        let (object_type, size, body) = split_header(raw).unwrap();
        assert_eq!(object_type, ObjectType::Blob);
        assert_eq!(size, 6);
        assert_eq!(body, b"hello\n");
    }

    #[test]
    fn test_split_header_rejects_size_mismatch() {
        assert!(split_header(b"blob 5\0hello\n").is_err());
    }

    #[test]
    fn test_split_header_rejects_missing_nul() {
        assert!(split_header(b"blob 6 hello").is_err());
    }

    #[test]
    fn test_split_header_rejects_unknown_type() {
        assert!(split_header(b"tag 1\0x").is_err());
    }
}
