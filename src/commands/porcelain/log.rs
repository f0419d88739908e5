//! Commit history display

use crate::areas::repository::Repository;
use crate::artifacts::objects::object_id::ObjectId;

/// History entries shown before the display cap kicks in
pub const LOG_DISPLAY_LIMIT: usize = 50;

/// One rendered history entry
#[derive(Debug, Clone)]
pub struct LogEntry {
    pub oid: ObjectId,
    pub author: String,
    pub date: String,
    pub message: String,
}

impl LogEntry {
    pub fn render(&self) -> String {
        let mut out = format!("commit {}\n", self.oid);
        out.push_str(&format!("Author: {}\n", self.author));
        out.push_str(&format!("Date:   {}\n\n", self.date));
        for line in self.message.lines() {
            out.push_str(&format!("    {}\n", line));
        }
        out
    }
}

impl Repository {
    /// Walk first parents from HEAD, newest first, capped for display
    pub fn log(&self) -> anyhow::Result<Vec<LogEntry>> {
        let mut entries = Vec::new();
        let mut current = self.refs().read_head()?;
        let mut visited = std::collections::HashSet::new();

        while let Some(oid) = current {
            if entries.len() >= LOG_DISPLAY_LIMIT || !visited.insert(oid.clone()) {
                break;
            }
            let commit = self.database().load_commit(&oid)?;
            entries.push(LogEntry {
                oid: oid.clone(),
                author: commit.author().display_name(),
                date: commit.author().readable_timestamp(),
                message: commit.message().to_string(),
            });
            current = commit.first_parent().cloned();
        }

        Ok(entries)
    }
}
