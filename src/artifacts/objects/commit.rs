//! Commit object
//!
//! Commits bind a root tree to its history: zero parents for the initial
//! commit, one for ordinary commits, two for merges.
//!
//! ## Format
//!
//! On disk:
//! ```text
//! commit <size>\0tree <tree-hex>
//! parent <parent-hex>
//! author <name> <email> <unix-seconds> <tz>
//! committer <name> <email> <unix-seconds> <tz>
//!
//! <message>
//! ```

use crate::artifacts::objects::object::{Object, Packable, Unpackable};
use crate::artifacts::objects::object_id::ObjectId;
use crate::artifacts::objects::object_type::ObjectType;
use anyhow::Context;
use bytes::Bytes;
use std::io::Write;

/// Author or committer identity with timestamp and timezone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    name: String,
    email: String,
    timestamp: chrono::DateTime<chrono::FixedOffset>,
}

impl Signature {
    /// Create a signature stamped with the current local time
    pub fn new(name: String, email: String) -> Self {
        Signature {
            name,
            email,
            timestamp: chrono::Local::now().fixed_offset(),
        }
    }

    pub fn new_with_timestamp(
        name: String,
        email: String,
        timestamp: chrono::DateTime<chrono::FixedOffset>,
    ) -> Self {
        Signature {
            name,
            email,
            timestamp,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    pub fn timestamp(&self) -> chrono::DateTime<chrono::FixedOffset> {
        self.timestamp
    }

    /// Format as a header line value: `Name <email> 1717777777 +0000`
    pub fn display(&self) -> String {
        format!(
            "{} <{}> {} {}",
            self.name,
            self.email,
            self.timestamp.timestamp(),
            self.timestamp.format("%z")
        )
    }

    /// Format name and email only: `Name <email>`
    pub fn display_name(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Human-readable timestamp for log output
    pub fn readable_timestamp(&self) -> String {
        self.timestamp
            .format("%a %b %-d %H:%M:%S %Y %z")
            .to_string()
    }
}

impl TryFrom<&str> for Signature {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // "name <email> timestamp timezone"; split from the right so names
        // may contain spaces
        let parts: Vec<&str> = value.rsplitn(3, ' ').collect();
        if parts.len() < 3 {
            anyhow::bail!("invalid signature line: {}", value);
        }

        let timezone = parts[0];
        let seconds: i64 = parts[1]
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid timestamp: {}", parts[1]))?;
        let name_email = parts[2];

        let email_start = name_email
            .find('<')
            .ok_or_else(|| anyhow::anyhow!("signature is missing '<'"))?;
        let email_end = name_email
            .find('>')
            .ok_or_else(|| anyhow::anyhow!("signature is missing '>'"))?;
        let name = name_email[..email_start].trim().to_string();
        let email = name_email[email_start + 1..email_end].to_string();

        let offset = parse_timezone_offset(timezone)?;
        let timestamp = chrono::DateTime::from_timestamp(seconds, 0)
            .ok_or_else(|| anyhow::anyhow!("timestamp out of range: {}", seconds))?
            .with_timezone(&offset);

        Ok(Signature {
            name,
            email,
            timestamp,
        })
    }
}

/// Parse a `+HHMM` / `-HHMM` timezone string into a fixed offset
fn parse_timezone_offset(value: &str) -> anyhow::Result<chrono::FixedOffset> {
    if value.len() != 5 || !(value.starts_with('+') || value.starts_with('-')) {
        anyhow::bail!("invalid timezone offset: {}", value);
    }
    let hours: i32 = value[1..3].parse()?;
    let minutes: i32 = value[3..5].parse()?;
    let total_seconds = (hours * 60 + minutes) * 60;

    let offset = if value.starts_with('-') {
        chrono::FixedOffset::west_opt(total_seconds)
    } else {
        chrono::FixedOffset::east_opt(total_seconds)
    };
    offset.ok_or_else(|| anyhow::anyhow!("timezone offset out of range: {}", value))
}

/// Commit object binding a tree snapshot to its parents and metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    parents: Vec<ObjectId>,
    tree_oid: ObjectId,
    author: Signature,
    committer: Signature,
    message: String,
}

impl Commit {
    pub fn new(
        parents: Vec<ObjectId>,
        tree_oid: ObjectId,
        author: Signature,
        message: String,
    ) -> Self {
        Commit {
            parents,
            tree_oid,
            author: author.clone(),
            committer: author,
            message,
        }
    }

    pub fn tree_oid(&self) -> &ObjectId {
        &self.tree_oid
    }

    pub fn parents(&self) -> &[ObjectId] {
        &self.parents
    }

    /// First parent, if any (the one history walks follow)
    pub fn first_parent(&self) -> Option<&ObjectId> {
        self.parents.first()
    }

    pub fn author(&self) -> &Signature {
        &self.author
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// First line of the message, for one-line displays
    pub fn short_message(&self) -> String {
        self.message.lines().next().unwrap_or("").to_string()
    }

    fn content_lines(&self) -> Vec<String> {
        let mut lines = vec![format!("tree {}", self.tree_oid)];
        for parent in &self.parents {
            lines.push(format!("parent {}", parent));
        }
        lines.push(format!("author {}", self.author.display()));
        lines.push(format!("committer {}", self.committer.display()));
        lines.push(String::new());
        lines.push(self.message.clone());
        lines
    }

    /// Human-readable representation (headers + message)
    pub fn display(&self) -> String {
        self.content_lines().join("\n")
    }
}

impl Packable for Commit {
    fn serialize(&self) -> anyhow::Result<Bytes> {
        let content = self.content_lines().join("\n");

        let mut commit_bytes = Vec::with_capacity(content.len() + 16);
        let header = format!("{} {}\0", self.object_type().as_str(), content.len());
        commit_bytes.write_all(header.as_bytes())?;
        commit_bytes.write_all(content.as_bytes())?;

        Ok(Bytes::from(commit_bytes))
    }
}

impl Unpackable for Commit {
    fn deserialize(body: &[u8]) -> anyhow::Result<Self> {
        let content = std::str::from_utf8(body).context("commit body is not valid UTF-8")?;
        let mut lines = content.lines();

        let tree_line = lines.next().context("commit is missing its tree line")?;
        let tree_oid = ObjectId::try_parse(
            tree_line
                .strip_prefix("tree ")
                .context("invalid tree line in commit")?,
        )?;

        let mut parents = Vec::new();
        let mut next_line = lines.next().context("commit is missing its author line")?;
        while let Some(parent_hex) = next_line.strip_prefix("parent ") {
            parents.push(ObjectId::try_parse(parent_hex)?);
            next_line = lines.next().context("commit is missing its author line")?;
        }

        let author = Signature::try_from(
            next_line
                .strip_prefix("author ")
                .context("invalid author line in commit")?,
        )?;

        let committer_line = lines.next().context("commit is missing its committer line")?;
        let committer = Signature::try_from(
            committer_line
                .strip_prefix("committer ")
                .context("invalid committer line in commit")?,
        )?;

        // blank separator line
        lines.next();

        let message = lines.collect::<Vec<&str>>().join("\n");
        Ok(Commit {
            parents,
            tree_oid,
            author,
            committer,
            message,
        })
    }
}

impl Object for Commit {
    fn object_type(&self) -> ObjectType {
        ObjectType::Commit
    }
}
