//! Pretty-print an object by hash prefix

use crate::areas::database::PrefixResolution;
use crate::areas::repository::Repository;
use crate::artifacts::objects::object_type::ObjectType;

impl Repository {
    /// Resolve a unique hash prefix and render the object's content
    ///
    /// Blobs print verbatim, trees print their entry listing, commits print
    /// headers plus message. Ambiguous prefixes list every candidate.
    pub fn show(&self, hash_prefix: &str) -> anyhow::Result<String> {
        let oid = match self.database().resolve_prefix(hash_prefix)? {
            PrefixResolution::Unique(oid) => oid,
            PrefixResolution::Ambiguous(candidates) => {
                let listing = candidates
                    .iter()
                    .map(|oid| oid.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::bail!("ambiguous prefix '{}': candidates {}", hash_prefix, listing);
            }
            PrefixResolution::NotFound => {
                anyhow::bail!("no object matches '{}'", hash_prefix);
            }
        };

        match self.database().object_type(&oid)? {
            ObjectType::Blob => {
                let blob = self.database().load_blob(&oid)?;
                Ok(String::from_utf8_lossy(blob.content()).to_string())
            }
            ObjectType::Tree => Ok(self.database().load_tree(&oid)?.display()),
            ObjectType::Commit => Ok(self.database().load_commit(&oid)?.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_show_blob_tree_and_commit() {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "file body\n").unwrap();
        repository.add(&[PathBuf::from("a.txt")]).unwrap();
        let commit_oid = repository.commit("c1").unwrap();

        let commit = repository.database().load_commit(&commit_oid).unwrap();
        let tree_text = repository.show(&commit.tree_oid().as_str()[..10]).unwrap();
        assert!(tree_text.contains("a.txt"));

        let commit_text = repository.show(&commit_oid.as_str()[..10]).unwrap();
        assert!(commit_text.starts_with("tree "));
        assert!(commit_text.contains("c1"));

        let tree = repository.database().load_tree(commit.tree_oid()).unwrap();
        let blob_oid = &tree.entries()[0].oid;
        assert_eq!(
            repository.show(blob_oid.as_str()).unwrap(),
            "file body\n"
        );
    }

    #[test]
    fn test_show_unknown_prefix_fails() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Repository::init(dir.path()).unwrap();
        assert!(repository.show("abcdef0").is_err());
    }
}
