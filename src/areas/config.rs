//! Repository configuration
//!
//! `.biogit/config` is a small INI file with `[section]` and
//! `[section "subsection"]` headers, flattened in memory to dotted keys:
//! `user.name`, `remote.origin.url`, `branch.main.merge`. There is no global
//! scope; configuration is always repository-local.

use anyhow::Context;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone)]
pub struct Config {
    path: Box<Path>,
    values: BTreeMap<String, String>,
}

impl Config {
    pub fn new(path: Box<Path>) -> Self {
        Config {
            path,
            values: BTreeMap::new(),
        }
    }

    /// Parse the config file into the flat dotted-key map
    ///
    /// A missing file loads as an empty configuration.
    pub fn load(&mut self) -> anyhow::Result<()> {
        self.values.clear();
        if !self.path.exists() {
            return Ok(());
        }

        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("unable to read config at {}", self.path.display()))?;

        let mut section_prefix = String::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
                let header = header.trim();
                // `[remote "origin"]` flattens to the `remote.origin.` prefix
                if let Some((section, rest)) = header.split_once(' ') {
                    let subsection = rest.trim().trim_matches('"');
                    section_prefix = format!("{}.{}.", section.trim(), subsection);
                } else {
                    section_prefix = format!("{}.", header);
                }
            } else if let Some((key, value)) = line.split_once('=') {
                let key = format!("{}{}", section_prefix, key.trim());
                self.values.insert(key, value.trim().to_string());
            } else {
                anyhow::bail!("malformed config line: {}", line);
            }
        }

        Ok(())
    }

    /// Reconstruct the INI sections from the flat map and rewrite the file
    pub fn save(&self) -> anyhow::Result<()> {
        // group keys by their section header
        let mut sections: BTreeMap<String, Vec<(String, String)>> = BTreeMap::new();
        for (key, value) in &self.values {
            let (header, short_key) = Self::split_key(key)?;
            sections
                .entry(header)
                .or_default()
                .push((short_key, value.clone()));
        }

        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)
            .with_context(|| format!("unable to open config at {}", self.path.display()))?;

        for (header, entries) in sections {
            writeln!(file, "[{}]", header)?;
            for (key, value) in entries {
                writeln!(file, "\t{} = {}", key, value)?;
            }
        }

        Ok(())
    }

    /// Split `remote.origin.url` into (`remote "origin"`, `url`)
    fn split_key(key: &str) -> anyhow::Result<(String, String)> {
        let (section, rest) = key
            .split_once('.')
            .ok_or_else(|| anyhow::anyhow!("config key has no section: {}", key))?;
        match rest.rsplit_once('.') {
            Some((subsection, short_key)) => Ok((
                format!("{} \"{}\"", section, subsection),
                short_key.to_string(),
            )),
            None => Ok((section.to_string(), rest.to_string())),
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    /// Remove every key under a dotted prefix (`remote.origin.`)
    pub fn remove_prefix(&mut self, prefix: &str) -> usize {
        let keys: Vec<String> = self
            .values
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        for key in &keys {
            self.values.remove(key);
        }
        keys.len()
    }

    pub fn all(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    /// Names of configured remotes (`remote.<name>.url` keys)
    pub fn remote_names(&self) -> Vec<String> {
        self.values
            .keys()
            .filter_map(|key| {
                key.strip_prefix("remote.")
                    .and_then(|rest| rest.strip_suffix(".url"))
                    .map(str::to_string)
            })
            .collect()
    }
}
