//! Lightweight tag management

use crate::areas::repository::Repository;
use crate::artifacts::revision;

impl Repository {
    /// Create a lightweight tag at `target` (default HEAD)
    pub fn tag_create(&self, name: &str, target: Option<&str>) -> anyhow::Result<()> {
        let oid = match target {
            Some(ident) => revision::resolve(self, ident)?
                .ok_or_else(|| anyhow::anyhow!("not a valid tag target: {}", ident))?,
            None => self
                .refs()
                .read_head()?
                .ok_or_else(|| anyhow::anyhow!("cannot create a tag before the first commit"))?,
        };

        self.refs().create_tag(name, &oid)
    }

    pub fn tag_delete(&self, name: &str) -> anyhow::Result<()> {
        self.refs().delete_tag(name)?;
        Ok(())
    }

    pub fn tag_list(
        &self,
    ) -> anyhow::Result<Vec<(String, crate::artifacts::objects::object_id::ObjectId)>> {
        self.refs().list_tags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_tag_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut repository = Repository::init(dir.path()).unwrap();
        std::fs::write(dir.path().join("a.txt"), "x\n").unwrap();
        repository.add(&[PathBuf::from("a.txt")]).unwrap();
        let oid = repository.commit("c1").unwrap();

        repository.tag_create("v1.0", None).unwrap();
        assert_eq!(repository.tag_list().unwrap(), vec![("v1.0".into(), oid)]);

        // duplicates and bad names refused
        assert!(repository.tag_create("v1.0", None).is_err());
        assert!(repository.tag_create("a/b", None).is_err());

        repository.tag_delete("v1.0").unwrap();
        assert!(repository.tag_list().unwrap().is_empty());
        assert!(repository.tag_delete("v1.0").is_err());
    }
}
