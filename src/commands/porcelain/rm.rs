//! Remove files from the index (and optionally the working tree)

use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use crate::artifacts::objects::object::Object;
use std::path::Path;

impl Repository {
    /// Remove a path from the index only, leaving the working tree alone
    pub fn rm_cached(&mut self, path: &Path) -> anyhow::Result<()> {
        if self.index().get_entry(path).is_none() {
            anyhow::bail!("'{}' is not tracked", path.display());
        }
        self.index_mut().remove_entry(path);
        self.index().write()?;
        Ok(())
    }

    /// Remove a path from the index and delete it from the working tree
    ///
    /// Refuses when the working-tree file no longer hashes to the staged
    /// blob, since deleting it would lose unstaged changes.
    pub fn rm(&mut self, path: &Path) -> anyhow::Result<()> {
        let entry = self
            .index()
            .get_entry(path)
            .ok_or_else(|| anyhow::anyhow!("'{}' is not tracked", path.display()))?
            .clone();

        if self.workspace().file_exists(path) {
            let content = self.workspace().read_file(path)?;
            let blob = Blob::new(content);
            if blob.object_id()? != entry.oid {
                anyhow::bail!(
                    "'{}' has local modifications; stage them or use rm-cached",
                    path.display()
                );
            }
            self.workspace().remove_file(path)?;
        }

        self.index_mut().remove_entry(path);
        self.index().write()?;
        Ok(())
    }
}
