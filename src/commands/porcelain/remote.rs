//! Remote configuration

use crate::areas::repository::Repository;
use crate::remote::client::RemoteUrl;

impl Repository {
    /// Configure a new remote with the default fetch refspec
    pub fn remote_add(&mut self, name: &str, url: &str) -> anyhow::Result<()> {
        if self.config().get(&format!("remote.{}.url", name)).is_some() {
            anyhow::bail!("remote '{}' already exists", name);
        }
        // validate the shape early so push/fetch never see a broken url
        RemoteUrl::parse(url)?;

        self.config_mut().set(format!("remote.{}.url", name), url);
        self.config_mut().set(
            format!("remote.{}.fetch", name),
            format!("+refs/heads/*:refs/remotes/{}/*", name),
        );
        self.config().save()
    }

    pub fn remote_remove(&mut self, name: &str) -> anyhow::Result<()> {
        let removed = self.config_mut().remove_prefix(&format!("remote.{}.", name));
        if removed == 0 {
            anyhow::bail!("no such remote: {}", name);
        }
        self.config().save()
    }

    /// `(name, url, fetch-refspec)` for every configured remote
    pub fn remote_list(&self) -> Vec<(String, String, String)> {
        let mut remotes: Vec<_> = self
            .config()
            .remote_names()
            .into_iter()
            .map(|name| {
                let url = self
                    .config()
                    .get(&format!("remote.{}.url", name))
                    .unwrap_or_default()
                    .to_string();
                let fetch = self
                    .config()
                    .get(&format!("remote.{}.fetch", name))
                    .unwrap_or_default()
                    .to_string();
                (name, url, fetch)
            })
            .collect();
        remotes.sort();
        remotes
    }

    /// URL of a configured remote
    pub fn remote_url(&self, name: &str) -> anyhow::Result<RemoteUrl> {
        let url = self
            .config()
            .get(&format!("remote.{}.url", name))
            .ok_or_else(|| anyhow::anyhow!("no such remote: {}", name))?;
        RemoteUrl::parse(url)
    }
}
