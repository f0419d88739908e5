//! Commit-ish resolution
//!
//! Resolves the strings users hand to commands into full commit hashes.
//! Candidates are tried in a fixed order:
//!
//! 1. the literal `HEAD`
//! 2. a full ref path beginning with `refs/`
//! 3. `<remote>/<branch>` (expanded to `refs/remotes/<remote>/<branch>`)
//! 4. a bare branch name
//! 5. a bare tag name
//! 6. a 6–40 hex-digit prefix naming a unique commit object

use crate::areas::database::PrefixResolution;
use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;

/// Resolve a commit-ish string to a full commit hash
///
/// Returns `Ok(None)` when nothing matches. An ambiguous hash prefix is an
/// error naming each candidate.
pub fn resolve(repository: &Repository, ident: &str) -> anyhow::Result<Option<ObjectId>> {
    let refs = repository.refs();

    if ident == "HEAD" {
        return refs.read_head();
    }

    if let Some(rest) = ident.strip_prefix("refs/") {
        let full_path = repository.biogit_dir().join("refs").join(rest);
        if full_path.is_file() {
            let content = std::fs::read_to_string(&full_path)?;
            return Ok(Some(ObjectId::try_parse(content.trim())?));
        }
        return Ok(None);
    }

    if let Some((remote, branch)) = ident.split_once('/')
        && let Some(oid) = refs.read_remote_ref(remote, branch)?
    {
        return Ok(Some(oid));
    }

    if let Some(oid) = refs.read_branch(ident)? {
        return Ok(Some(oid));
    }

    if let Some(oid) = refs.read_tag(ident)? {
        return Ok(Some(oid));
    }

    if ObjectId::is_valid_prefix(ident) {
        match repository.database().resolve_prefix(ident)? {
            PrefixResolution::Unique(oid) => {
                if repository.database().object_type(&oid)? == ObjectType::Commit {
                    return Ok(Some(oid));
                }
                return Ok(None);
            }
            PrefixResolution::Ambiguous(candidates) => {
                let listing = candidates
                    .iter()
                    .map(|oid| oid.as_str())
                    .collect::<Vec<_>>()
                    .join(", ");
                anyhow::bail!("ambiguous hash prefix '{}': candidates {}", ident, listing);
            }
            PrefixResolution::NotFound => return Ok(None),
        }
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::areas::repository::Repository;
    use crate::artifacts::objects::blob::Blob;
    use pretty_assertions::assert_eq;

    fn repository_with_commit() -> (tempfile::TempDir, Repository, ObjectId) {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "hello\n").unwrap();
        repository.add(&[std::path::PathBuf::from("a.txt")]).unwrap();
        let oid = repository.commit("c1").unwrap();
        (dir, repository, oid)
    }

    #[test]
    fn test_resolve_head_and_branch() {
        let (_dir, repository, oid) = repository_with_commit();

        assert_eq!(resolve(&repository, "HEAD").unwrap(), Some(oid.clone()));
        assert_eq!(resolve(&repository, "main").unwrap(), Some(oid.clone()));
        assert_eq!(
            resolve(&repository, "refs/heads/main").unwrap(),
            Some(oid)
        );
    }

    #[test]
    fn test_resolve_tag() {
        let (_dir, repository, oid) = repository_with_commit();
        repository.refs().create_tag("v1", &oid).unwrap();

        assert_eq!(resolve(&repository, "v1").unwrap(), Some(oid));
    }

    #[test]
    fn test_resolve_hash_prefix_only_commits() {
        let (_dir, repository, oid) = repository_with_commit();

        let prefix = &oid.as_str()[..8];
        assert_eq!(resolve(&repository, prefix).unwrap(), Some(oid));

        // a blob prefix resolves to nothing commit-ish
        let blob_oid = repository
            .database()
            .store(&Blob::new(b"hello\n".to_vec()))
            .unwrap();
        assert_eq!(
            resolve(&repository, &blob_oid.as_str()[..10]).unwrap(),
            None
        );
    }

    #[test]
    fn test_resolve_unknown_name() {
        let (_dir, repository, _oid) = repository_with_commit();
        assert_eq!(resolve(&repository, "no-such-thing").unwrap(), None);
    }
}
