//! Durable user table
//!
//! One record per line: `<username>:<salt>:<hash>` with
//! `hash = SHA1(password || salt)`. The in-memory list and the file are
//! guarded by a single mutex; registration rewrites the whole file.

use anyhow::Context;
use rand::Rng;
use rand::distributions::Alphanumeric;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;

const SALT_LENGTH: usize = 16;

#[derive(Debug, Clone)]
struct UserRecord {
    username: String,
    salt: String,
    hash: String,
}

pub struct UserManager {
    path: PathBuf,
    records: Mutex<Vec<UserRecord>>,
}

impl UserManager {
    /// Load the user file (missing file means no users yet)
    pub fn new(path: PathBuf) -> anyhow::Result<Self> {
        let mut records = Vec::new();
        if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("unable to read user file {}", path.display()))?;
            for line in content.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                let mut parts = line.splitn(3, ':');
                let (username, salt, hash) = (parts.next(), parts.next(), parts.next());
                match (username, salt, hash) {
                    (Some(username), Some(salt), Some(hash)) => records.push(UserRecord {
                        username: username.to_string(),
                        salt: salt.to_string(),
                        hash: hash.to_string(),
                    }),
                    _ => anyhow::bail!("corrupt user record: {}", line),
                }
            }
        }

        Ok(UserManager {
            path,
            records: Mutex::new(records),
        })
    }

    fn password_hash(password: &str, salt: &str) -> String {
        let mut hasher = Sha1::new();
        hasher.update(password);
        hasher.update(salt);
        format!("{:x}", hasher.finalize())
    }

    fn generate_salt() -> String {
        rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SALT_LENGTH)
            .map(char::from)
            .collect()
    }

    /// Create a user; usernames may not contain `:` or already exist
    pub fn register(&self, username: &str, password: &str) -> anyhow::Result<()> {
        if username.is_empty() || username.contains(':') {
            anyhow::bail!("invalid username: {}", username);
        }

        let mut records = self.records.lock().expect("user table poisoned");
        if records.iter().any(|record| record.username == username) {
            anyhow::bail!("username '{}' is already taken", username);
        }

        let salt = Self::generate_salt();
        let hash = Self::password_hash(password, &salt);
        records.push(UserRecord {
            username: username.to_string(),
            salt,
            hash,
        });

        // rewrite the whole table under the lock
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("unable to open user file {}", self.path.display()))?;
        for record in records.iter() {
            writeln!(file, "{}:{}:{}", record.username, record.salt, record.hash)?;
        }

        Ok(())
    }

    /// Check a password against the stored salted hash
    pub fn verify(&self, username: &str, password: &str) -> bool {
        let records = self.records.lock().expect("user table poisoned");
        records
            .iter()
            .find(|record| record.username == username)
            .is_some_and(|record| Self::password_hash(password, &record.salt) == record.hash)
    }
}
