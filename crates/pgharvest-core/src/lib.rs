//! Core contracts and helpers for pgharvest.
//!
//! This crate defines the metric catalogue, the typed rows harvested from
//! target servers, the run report, and the configuration shared by the
//! collector, the loader, and the CLI.

pub mod config;
pub mod credentials;
pub mod env_file;
pub mod error;
pub mod metric;
pub mod report;
pub mod rows;
pub mod server;

pub use config::{
    AdminSettings, HarvestSettings, NotifySettings, Settings, TargetSettings,
    is_sql_identifier, load_settings,
};
pub use credentials::Credentials;
pub use env_file::{EnvValues, load_env_file};
pub use error::{Error, Result};
pub use metric::{Metric, Scope};
pub use report::{
    HarvestReport, MetricOutcome, OutcomeStatus, ServerReport, Stage, UnitFailure, render_report,
};
pub use rows::{
    DatabaseSize, Grant, IndexDefinition, IndexUsage, MetricRow, Role, TableEntry, TableSize,
    TableUsage,
};
pub use server::{ACTIVE_STATUS, ServerEntry, active_server_names};

/// Database every target connection falls back to when none is given.
pub const BOOTSTRAP_DATABASE: &str = "postgres";
