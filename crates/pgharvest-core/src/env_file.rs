use std::collections::BTreeMap;
use std::path::Path;

use crate::credentials::Credentials;
use crate::error::{Error, Result};

pub const DB_USERNAME: &str = "DB_USERNAME";
pub const DB_PASSWORD: &str = "DB_PASSWORD";
pub const SMTP_USERNAME: &str = "SMTP_USERNAME";
pub const SMTP_PASSWORD: &str = "SMTP_PASSWORD";

/// Parse a `KEY=VALUE` file. Blank lines and `#` comments are skipped and
/// values may be wrapped in single or double quotes.
pub fn load_env_file(path: &Path) -> Result<BTreeMap<String, String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_env(&content))
}

fn parse_env(content: &str) -> BTreeMap<String, String> {
    let mut values = BTreeMap::new();
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let line = line.strip_prefix("export ").unwrap_or(line);
        let mut parts = line.splitn(2, '=');
        let key = parts.next().unwrap_or("").trim();
        let value = parts.next().unwrap_or("").trim();
        if key.is_empty() {
            continue;
        }
        values.insert(key.to_string(), unquote(value).to_string());
    }
    values
}

fn missing(key: &str) -> Error {
    Error::Config(format!("{key} is not set in the env file or environment"))
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Values from an env file, overridden by the process environment.
#[derive(Debug, Clone, Default)]
pub struct EnvValues {
    file: BTreeMap<String, String>,
}

impl EnvValues {
    /// Load `path` when it exists; a missing file leaves only the process
    /// environment.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        Ok(Self {
            file: load_env_file(path)?,
        })
    }

    pub fn from_map(file: BTreeMap<String, String>) -> Self {
        Self { file }
    }

    /// Non-empty value of `key`.
    pub fn get(&self, key: &str) -> Option<String> {
        self.lookup(key).filter(|value| !value.is_empty())
    }

    /// Value of `key`, empty strings included.
    fn lookup(&self, key: &str) -> Option<String> {
        std::env::var(key)
            .ok()
            .or_else(|| self.file.get(key).cloned())
    }

    fn require(&self, key: &str) -> Result<String> {
        self.get(key).ok_or_else(|| missing(key))
    }

    /// Passwords may be set to an empty string, e.g. for trust authentication.
    fn require_password(&self, key: &str) -> Result<String> {
        self.lookup(key).ok_or_else(|| missing(key))
    }

    /// Credentials used for every target server during a harvest.
    pub fn target_credentials(&self) -> Result<Credentials> {
        Ok(Credentials::new(
            self.require(DB_USERNAME)?,
            self.require_password(DB_PASSWORD)?,
        ))
    }

    /// SMTP login, when a username and a password entry are present.
    pub fn smtp_credentials(&self) -> Option<Credentials> {
        match (self.get(SMTP_USERNAME), self.lookup(SMTP_PASSWORD)) {
            (Some(username), Some(password)) => Some(Credentials::new(username, password)),
            _ => None,
        }
    }
}
