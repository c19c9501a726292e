use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metric::Metric;
use crate::BOOTSTRAP_DATABASE;

/// Location of the central admin database and its directory/metric tables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdminSettings {
    pub host: String,
    pub port: u16,
    pub database: String,
    /// Schema holding `servers` and the metric tables.
    pub schema: String,
    pub acquire_timeout_secs: u64,
}

impl Default for AdminSettings {
    fn default() -> Self {
        Self {
            host: "DBA001".to_string(),
            port: 5432,
            database: "dbaadmin".to_string(),
            schema: "dba".to_string(),
            acquire_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TargetSettings {
    pub port: u16,
    pub bootstrap_database: String,
    /// Unset means connections to target servers never time out.
    pub connect_timeout_secs: Option<u64>,
}

impl Default for TargetSettings {
    fn default() -> Self {
        Self {
            port: 5432,
            bootstrap_database: BOOTSTRAP_DATABASE.to_string(),
            connect_timeout_secs: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestSettings {
    pub metrics: Vec<Metric>,
    /// Number of servers processed at the same time.
    pub concurrency: usize,
}

impl Default for HarvestSettings {
    fn default() -> Self {
        Self {
            metrics: Metric::DEFAULT_ORDER.to_vec(),
            concurrency: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    pub enabled: bool,
    pub smtp_host: String,
    pub smtp_port: u16,
    pub sender: String,
    pub recipient: String,
}

impl Default for NotifySettings {
    fn default() -> Self {
        Self {
            enabled: false,
            smtp_host: String::new(),
            smtp_port: 587,
            sender: String::new(),
            recipient: String::new(),
        }
    }
}

/// Contents of `pgharvest.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub admin: AdminSettings,
    pub target: TargetSettings,
    pub harvest: HarvestSettings,
    pub notify: NotifySettings,
}

impl Settings {
    pub fn from_toml(content: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(content).map_err(|err| Error::Config(err.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_sql_identifier(&self.admin.schema) {
            return Err(Error::Config(format!(
                "admin schema '{}' is not a plain identifier",
                self.admin.schema
            )));
        }
        if self.harvest.concurrency == 0 {
            return Err(Error::Config("harvest concurrency must be at least 1".to_string()));
        }
        if self.harvest.metrics.is_empty() {
            return Err(Error::Config("harvest metrics list is empty".to_string()));
        }
        if self.notify.enabled {
            for (field, value) in [
                ("smtp_host", &self.notify.smtp_host),
                ("sender", &self.notify.sender),
                ("recipient", &self.notify.recipient),
            ] {
                if value.trim().is_empty() {
                    return Err(Error::Config(format!(
                        "notify.{field} is required when notifications are enabled"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Load settings from `path`, falling back to defaults when the file is absent.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if path.exists() {
        let content = std::fs::read_to_string(path)?;
        return Settings::from_toml(&content);
    }

    let settings = Settings::default();
    settings.validate()?;
    Ok(settings)
}

/// True for unquoted SQL identifiers: a letter or underscore followed by
/// letters, digits or underscores.
pub fn is_sql_identifier(value: &str) -> bool {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    value.len() <= 63 && chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_')
}
