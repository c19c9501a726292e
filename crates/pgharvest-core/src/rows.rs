use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::metric::Metric;

/// Size of one non-template database, truncated to whole units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DatabaseSize {
    pub database: String,
    pub size_mb: i64,
    pub size_gb: i64,
}

/// On-disk footprint of an ordinary table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableSize {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub table_bytes: i64,
    pub index_bytes: i64,
    pub total_bytes: i64,
    /// Planner row estimate; `None` when the table was never analyzed.
    pub row_estimate: Option<i64>,
}

/// Scan counters from `pg_stat_user_tables`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TableUsage {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub sequential_scans: Option<i64>,
    pub sequential_tuples_read: Option<i64>,
    pub index_scans: Option<i64>,
    pub index_tuples_fetched: Option<i64>,
}

/// Scan counters from `pg_stat_user_indexes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexUsage {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub index: String,
    pub index_scans: Option<i64>,
    pub tuples_read: Option<i64>,
    pub tuples_fetched: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IndexDefinition {
    pub database: String,
    pub schema: String,
    pub table: String,
    pub index: String,
    pub size_bytes: i64,
    /// `pg_get_indexdef` output, cut to 255 characters.
    pub definition: String,
}

/// A privilege held on a table, routine, sequence or type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Grant {
    pub database: String,
    pub schema: String,
    pub object: String,
    pub object_type: Option<String>,
    pub grantor: String,
    pub grantee: String,
    pub privilege_type: String,
    pub is_grantable: bool,
    pub with_hierarchy: Option<bool>,
}

/// A login or group role and its attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Role {
    pub name: String,
    pub superuser: bool,
    pub inherit: bool,
    pub create_role: bool,
    pub create_db: bool,
    pub can_login: bool,
    pub replication: bool,
    pub connection_limit: i32,
    pub valid_until: Option<DateTime<Utc>>,
    pub member_of: Vec<String>,
    pub config: Option<Vec<String>>,
}

/// A base table visible in `information_schema.tables`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TableEntry {
    pub schema: String,
    pub table: String,
}

/// One harvested row, tagged with the metric it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "metric", rename_all = "snake_case")]
pub enum MetricRow {
    DatabaseSizes(DatabaseSize),
    TableSizes(TableSize),
    TableUsage(TableUsage),
    IndexUsage(IndexUsage),
    Indexes(IndexDefinition),
    Grants(Grant),
    Users(Role),
}

impl MetricRow {
    pub fn metric(&self) -> Metric {
        match self {
            MetricRow::DatabaseSizes(_) => Metric::DatabaseSizes,
            MetricRow::TableSizes(_) => Metric::TableSizes,
            MetricRow::TableUsage(_) => Metric::TableUsage,
            MetricRow::IndexUsage(_) => Metric::IndexUsage,
            MetricRow::Indexes(_) => Metric::Indexes,
            MetricRow::Grants(_) => Metric::Grants,
            MetricRow::Users(_) => Metric::Users,
        }
    }

    /// Database the row describes; roles are cluster-wide and have none.
    pub fn database(&self) -> Option<&str> {
        match self {
            MetricRow::DatabaseSizes(row) => Some(&row.database),
            MetricRow::TableSizes(row) => Some(&row.database),
            MetricRow::TableUsage(row) => Some(&row.database),
            MetricRow::IndexUsage(row) => Some(&row.database),
            MetricRow::Indexes(row) => Some(&row.database),
            MetricRow::Grants(row) => Some(&row.database),
            MetricRow::Users(_) => None,
        }
    }
}
