use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A category of metadata harvested from target servers and loaded into the
/// admin database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    DatabaseSizes,
    TableSizes,
    TableUsage,
    IndexUsage,
    Indexes,
    Grants,
    Users,
}

/// Whether a metric is read once per server or once per database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Server,
    Database,
}

impl Metric {
    pub const ALL: [Metric; 7] = [
        Metric::DatabaseSizes,
        Metric::TableSizes,
        Metric::TableUsage,
        Metric::IndexUsage,
        Metric::Indexes,
        Metric::Grants,
        Metric::Users,
    ];

    /// Order used by `harvest` when the configuration does not name metrics.
    pub const DEFAULT_ORDER: [Metric; 5] = [
        Metric::DatabaseSizes,
        Metric::TableSizes,
        Metric::TableUsage,
        Metric::Users,
        Metric::Grants,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Metric::DatabaseSizes => "database_sizes",
            Metric::TableSizes => "table_sizes",
            Metric::TableUsage => "table_usage",
            Metric::IndexUsage => "index_usage",
            Metric::Indexes => "indexes",
            Metric::Grants => "grants",
            Metric::Users => "users",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            Metric::DatabaseSizes | Metric::Users => Scope::Server,
            Metric::TableSizes
            | Metric::TableUsage
            | Metric::IndexUsage
            | Metric::Indexes
            | Metric::Grants => Scope::Database,
        }
    }

    /// Unqualified admin table receiving rows for this metric.
    pub fn sink_table(self) -> &'static str {
        match self {
            Metric::DatabaseSizes => "databases",
            Metric::TableSizes => "tables",
            Metric::TableUsage => "table_usage",
            Metric::IndexUsage => "index_usage",
            Metric::Indexes => "indexes",
            Metric::Grants => "grants",
            Metric::Users => "users",
        }
    }

    /// Operation name used in failure notifications for extraction.
    pub fn extract_operation(self) -> String {
        format!("extract_{}", self.name())
    }

    /// Operation name used in failure notifications for loading.
    pub fn load_operation(self) -> String {
        format!("load_{}", self.name())
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Metric {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase().replace('-', "_");
        Metric::ALL
            .into_iter()
            .find(|metric| metric.name() == normalized)
            .ok_or_else(|| {
                let known: Vec<&str> = Metric::ALL.iter().map(|metric| metric.name()).collect();
                Error::Config(format!(
                    "unknown metric '{value}' (expected one of: {})",
                    known.join(", ")
                ))
            })
    }
}
