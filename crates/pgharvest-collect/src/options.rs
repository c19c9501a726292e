use std::time::Duration;

use pgharvest_core::{BOOTSTRAP_DATABASE, TargetSettings};

/// Options that control how target servers are reached.
#[derive(Debug, Clone)]
pub struct SourceOptions {
    pub port: u16,
    pub bootstrap_database: String,
    pub connect_timeout: Option<Duration>,
    pub application_name: String,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            port: 5432,
            bootstrap_database: BOOTSTRAP_DATABASE.to_string(),
            connect_timeout: None,
            application_name: "pgharvest".to_string(),
        }
    }
}

impl From<&TargetSettings> for SourceOptions {
    fn from(settings: &TargetSettings) -> Self {
        Self {
            port: settings.port,
            bootstrap_database: settings.bootstrap_database.clone(),
            connect_timeout: settings.connect_timeout_secs.map(Duration::from_secs),
            ..Self::default()
        }
    }
}
