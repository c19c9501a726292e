use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::metric::Metric;

/// Step of a loader at which a failure happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    ListDatabases,
    Extract,
    Load,
}

/// A failed unit of work inside one loader run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct UnitFailure {
    pub stage: Stage,
    pub database: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Rows were extracted and committed with no failures.
    Loaded,
    /// Nothing failed and nothing was found.
    Empty,
    /// Some extraction units failed, the rest was committed.
    Partial,
    Failed,
}

/// Result of running one metric loader against one server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricOutcome {
    pub metric: Metric,
    pub databases_scanned: usize,
    pub rows_extracted: usize,
    pub rows_loaded: usize,
    pub failures: Vec<UnitFailure>,
}

impl MetricOutcome {
    pub fn new(metric: Metric) -> Self {
        Self {
            metric,
            databases_scanned: 0,
            rows_extracted: 0,
            rows_loaded: 0,
            failures: Vec::new(),
        }
    }

    pub fn status(&self) -> OutcomeStatus {
        let load_failed = self
            .failures
            .iter()
            .any(|failure| failure.stage == Stage::Load);
        if load_failed {
            return OutcomeStatus::Failed;
        }
        match (self.failures.is_empty(), self.rows_loaded > 0) {
            (true, true) => OutcomeStatus::Loaded,
            (true, false) => OutcomeStatus::Empty,
            (false, true) => OutcomeStatus::Partial,
            (false, false) => OutcomeStatus::Failed,
        }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ServerReport {
    pub server: String,
    pub metrics: Vec<MetricOutcome>,
}

impl ServerReport {
    pub fn rows_loaded(&self) -> usize {
        self.metrics.iter().map(|outcome| outcome.rows_loaded).sum()
    }

    pub fn failure_count(&self) -> usize {
        self.metrics.iter().map(|outcome| outcome.failures.len()).sum()
    }
}

/// Summary of one `harvest` run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HarvestReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Set when the active server list could not be read.
    pub directory_failure: Option<String>,
    pub servers: Vec<ServerReport>,
}

impl HarvestReport {
    pub fn new(run_id: impl Into<String>, started_at: DateTime<Utc>) -> Self {
        Self {
            run_id: run_id.into(),
            started_at,
            finished_at: None,
            directory_failure: None,
            servers: Vec::new(),
        }
    }

    pub fn rows_loaded(&self) -> usize {
        self.servers.iter().map(ServerReport::rows_loaded).sum()
    }

    pub fn failure_count(&self) -> usize {
        let directory = usize::from(self.directory_failure.is_some());
        directory + self.servers.iter().map(ServerReport::failure_count).sum::<usize>()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}

/// Render a deterministic markdown summary of a harvest run.
pub fn render_report(report: &HarvestReport) -> String {
    let mut lines = Vec::new();

    lines.push("# pgharvest run report".to_string());
    lines.push(String::new());
    lines.push(format!("- run_id: {}", report.run_id));
    lines.push(format!("- started_at: {}", report.started_at.to_rfc3339()));
    if let Some(finished_at) = report.finished_at {
        lines.push(format!("- finished_at: {}", finished_at.to_rfc3339()));
    }
    lines.push(format!("- servers: {}", report.servers.len()));
    lines.push(format!("- rows_loaded: {}", report.rows_loaded()));
    lines.push(format!("- failures: {}", report.failure_count()));
    lines.push(String::new());

    if let Some(message) = &report.directory_failure {
        lines.push("## Server directory".to_string());
        lines.push(format!("- failed: {message}"));
        lines.push(String::new());
    }

    lines.push("## Metrics".to_string());
    lines.push("| server | metric | status | databases | rows_extracted | rows_loaded |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for server in &report.servers {
        for outcome in &server.metrics {
            lines.push(format!(
                "| {} | {} | {} | {} | {} | {} |",
                server.server,
                outcome.metric,
                status_label(outcome.status()),
                outcome.databases_scanned,
                outcome.rows_extracted,
                outcome.rows_loaded
            ));
        }
    }
    lines.push(String::new());

    let failures: Vec<String> = report
        .servers
        .iter()
        .flat_map(|server| {
            server.metrics.iter().flat_map(move |outcome| {
                outcome.failures.iter().map(move |failure| {
                    let scope = failure
                        .database
                        .as_deref()
                        .map(|database| format!("{}/{database}", server.server))
                        .unwrap_or_else(|| server.server.clone());
                    format!(
                        "- {scope} {} ({}): {}",
                        outcome.metric,
                        stage_label(failure.stage),
                        failure.message
                    )
                })
            })
        })
        .collect();
    if !failures.is_empty() {
        lines.push("## Failures".to_string());
        lines.extend(failures);
        lines.push(String::new());
    }

    lines.join("\n")
}

fn status_label(status: OutcomeStatus) -> &'static str {
    match status {
        OutcomeStatus::Loaded => "loaded",
        OutcomeStatus::Empty => "empty",
        OutcomeStatus::Partial => "partial",
        OutcomeStatus::Failed => "failed",
    }
}

fn stage_label(stage: Stage) -> &'static str {
    match stage {
        Stage::ListDatabases => "list databases",
        Stage::Extract => "extract",
        Stage::Load => "load",
    }
}
