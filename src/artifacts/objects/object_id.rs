//! Object identifier (SHA-1 hash)
//!
//! Object IDs are 40-character hexadecimal strings naming the SHA-1 digest of
//! an object's serialized form. They uniquely identify blobs, trees and
//! commits in the object store.
//!
//! ## Storage
//!
//! Objects are stored in `.biogit/objects/<first-2-chars>/<remaining-38-chars>`

use crate::artifacts::objects::{MIN_PREFIX_LENGTH, OBJECT_ID_LENGTH};
use std::path::PathBuf;

/// Object identifier (SHA-1 hash)
///
/// A 40-character lowercase hexadecimal string that uniquely identifies an
/// object. Trees and commits embed it verbatim as ASCII, so it round-trips
/// through serialization without a binary form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    /// Parse and validate an object ID from a string
    ///
    /// # Returns
    ///
    /// Validated ObjectId or an error if the length or characters are invalid
    pub fn try_parse(id: impl Into<String>) -> anyhow::Result<Self> {
        let id: String = id.into();
        if id.len() != OBJECT_ID_LENGTH {
            anyhow::bail!("invalid object ID length: {}", id.len());
        }
        if !id.bytes().all(|b| b.is_ascii_hexdigit()) {
            anyhow::bail!("invalid object ID characters: {}", id);
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Check whether a string is usable as a lookup prefix (6..=40 hex chars)
    pub fn is_valid_prefix(prefix: &str) -> bool {
        (MIN_PREFIX_LENGTH..=OBJECT_ID_LENGTH).contains(&prefix.len())
            && prefix.bytes().all(|b| b.is_ascii_hexdigit())
    }

    /// Convert to the object store path `xx/yyyy…`
    pub fn to_path(&self) -> PathBuf {
        let (dir, file) = self.0.split_at(2);
        PathBuf::from(dir).join(file)
    }

    /// Abbreviated form (first 7 characters) for display
    pub fn to_short_oid(&self) -> String {
        self.0[..7].to_string()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::proptest;

    #[test]
    fn test_try_parse_valid() {
        let id = "a".repeat(40);
        assert!(ObjectId::try_parse(id).is_ok());
    }

    #[test]
    fn test_try_parse_uppercase_is_normalized() {
        let id = ObjectId::try_parse("ABCDEF0123".repeat(4)).unwrap();
        assert_eq!(id.as_str(), &"abcdef0123".repeat(4));
    }

    #[test]
    fn test_try_parse_rejects_wrong_length() {
        assert!(ObjectId::try_parse("abc123").is_err());
        assert!(ObjectId::try_parse("a".repeat(41)).is_err());
    }

    #[test]
    fn test_try_parse_rejects_non_hex() {
        assert!(ObjectId::try_parse("g".repeat(40)).is_err());
    }

    #[test]
    fn test_to_path_splits_after_two_chars() {
        let id = ObjectId::try_parse(format!("ab{}", "c".repeat(38))).unwrap();
        assert_eq!(id.to_path(), PathBuf::from("ab").join("c".repeat(38)));
    }

    proptest! {
        #[test]
        fn test_valid_prefix_bounds(prefix in "[0-9a-f]{6,40}") {
            assert!(ObjectId::is_valid_prefix(&prefix));
        }

        #[test]
        fn test_short_prefix_rejected(prefix in "[0-9a-f]{1,5}") {
            assert!(!ObjectId::is_valid_prefix(&prefix));
        }
    }
}
