use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

/// Key under which a profile's token is stored.
pub fn token_key(profile: &str) -> String {
    format!("{profile}:api_token")
}

/// API tokens kept in a JSON file readable only by the owner.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Store under `~/.<app>/credentials`.
    pub fn new(app: &str) -> Result<Self> {
        let home = dirs::home_dir().context("Cannot determine home directory")?;
        Ok(Self::at(home.join(format!(".{app}")).join("credentials")))
    }

    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get_secret(&self, account: &str) -> Result<Option<String>> {
        Ok(self.read()?.remove(account))
    }

    pub fn set_secret(&self, account: &str, secret: &str) -> Result<()> {
        let mut creds = self.read()?;
        creds.insert(account.to_string(), secret.to_string());
        self.write(&creds)?;
        debug!(account, path = %self.path.display(), "Stored secret");
        Ok(())
    }

    /// Returns whether a secret was present.
    pub fn delete_secret(&self, account: &str) -> Result<bool> {
        let mut creds = self.read()?;
        let existed = creds.remove(account).is_some();
        if existed {
            self.write(&creds)?;
            debug!(account, "Deleted secret");
        }
        Ok(existed)
    }

    fn read(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }

        let content = fs::read_to_string(&self.path)
            .with_context(|| format!("Unable to read credentials at {}", self.path.display()))?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }

        serde_json::from_str(&content)
            .with_context(|| format!("Malformed credentials file {}", self.path.display()))
    }

    fn write(&self, creds: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Unable to create {}", parent.display()))?;
        }

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        options.mode(0o600);

        let mut file = options
            .open(&self.path)
            .with_context(|| format!("Unable to write credentials to {}", self.path.display()))?;
        let json = serde_json::to_string_pretty(creds)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}
