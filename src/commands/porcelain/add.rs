//! Stage files into the index

use crate::areas::index::IndexEntry;
use crate::areas::repository::Repository;
use crate::artifacts::objects::blob::Blob;
use anyhow::Context;
use std::path::{Path, PathBuf};

impl Repository {
    /// Stage every regular file beneath the given paths
    ///
    /// Paths inside `.biogit/` are silently skipped. The first failing path
    /// aborts before the index file is rewritten; entries staged in memory
    /// before the failure are not rolled back.
    pub fn add(&mut self, paths: &[PathBuf]) -> anyhow::Result<Vec<PathBuf>> {
        let mut staged = Vec::new();

        for path in paths {
            let files = self
                .workspace()
                .list_files(Some(path))
                .with_context(|| format!("cannot add '{}'", path.display()))?;

            for file in files {
                self.stage_file(&file)
                    .with_context(|| format!("cannot add '{}'", file.display()))?;
                staged.push(file);
            }
        }

        self.index().write()?;
        Ok(staged)
    }

    fn stage_file(&mut self, relative: &Path) -> anyhow::Result<()> {
        let content = self.workspace().read_file(relative)?;
        let metadata = self.workspace().stat_file(relative)?;

        let blob = Blob::new(content);
        let oid = self.database().store(&blob)?;

        self.index_mut().add_or_update_entry(IndexEntry::new(
            relative.to_path_buf(),
            oid,
            crate::artifacts::objects::tree::EntryMode::Regular,
            metadata,
        ));

        Ok(())
    }
}
