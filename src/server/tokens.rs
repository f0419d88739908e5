//! Stateless session tokens
//!
//! A token is `<username>:<expiry-unix-seconds>:<signature>` where the
//! signature is `SHA1(username:expiry || server-secret)`. Nothing is stored
//! server-side; validation recomputes the signature and checks the expiry.

use sha1::{Digest, Sha1};

pub struct TokenManager {
    secret: String,
}

impl TokenManager {
    /// Build a manager; the secret must be non-empty
    pub fn new(secret: &str) -> anyhow::Result<Self> {
        if secret.is_empty() {
            anyhow::bail!("token secret must not be empty");
        }
        Ok(TokenManager {
            secret: secret.to_string(),
        })
    }

    fn signature(&self, username: &str, expiry: i64) -> String {
        let mut hasher = Sha1::new();
        hasher.update(format!("{}:{}", username, expiry));
        hasher.update(&self.secret);
        format!("{:x}", hasher.finalize())
    }

    /// Mint a token valid for `ttl_seconds` from now
    pub fn generate(&self, username: &str, ttl_seconds: i64) -> String {
        let expiry = chrono::Utc::now().timestamp() + ttl_seconds;
        format!("{}:{}:{}", username, expiry, self.signature(username, expiry))
    }

    /// Check a token's signature and expiry; returns the username
    pub fn validate(&self, token: &str) -> Option<String> {
        let mut parts = token.rsplitn(2, ':');
        let signature = parts.next()?;
        let user_and_expiry = parts.next()?;
        let (username, expiry_str) = user_and_expiry.rsplit_once(':')?;
        let expiry: i64 = expiry_str.parse().ok()?;

        if self.signature(username, expiry) != signature {
            return None;
        }
        if chrono::Utc::now().timestamp() >= expiry {
            return None;
        }

        Some(username.to_string())
    }
}
