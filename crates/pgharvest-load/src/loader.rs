use pgharvest_collect::Source;
use pgharvest_core::{Error, Metric, MetricOutcome, MetricRow, Result, Scope, Stage, UnitFailure};
use pgharvest_notify::{Notification, Notifier, notify_best_effort};

use crate::sink::Sink;

/// Operation name reported when listing a server's databases fails.
pub const LIST_DATABASES_OPERATION: &str = "get_databases";

/// Runs one metric against one server: extract, then load in a single
/// transaction.
///
/// Failures never escape a loader. Each one is logged, notified and
/// recorded in the returned [`MetricOutcome`].
pub struct Loader<'a> {
    source: &'a dyn Source,
    sink: &'a dyn Sink,
    notifier: &'a dyn Notifier,
    bootstrap_database: String,
}

impl<'a> Loader<'a> {
    pub fn new(
        source: &'a dyn Source,
        sink: &'a dyn Sink,
        notifier: &'a dyn Notifier,
        bootstrap_database: impl Into<String>,
    ) -> Self {
        Self {
            source,
            sink,
            notifier,
            bootstrap_database: bootstrap_database.into(),
        }
    }

    pub fn notifier(&self) -> &'a dyn Notifier {
        self.notifier
    }

    pub async fn load(&self, server: &str, metric: Metric) -> MetricOutcome {
        let mut outcome = MetricOutcome::new(metric);
        tracing::info!(event = "load_started", server = %server, metric = %metric);

        let databases = match metric.scope() {
            Scope::Server => vec![self.bootstrap_database.clone()],
            Scope::Database => match self.source.databases(server).await {
                Ok(databases) => databases,
                Err(err) => {
                    self.record_failure(
                        &mut outcome,
                        server,
                        Stage::ListDatabases,
                        None,
                        LIST_DATABASES_OPERATION,
                        err,
                    )
                    .await;
                    return outcome;
                }
            },
        };

        let mut rows: Vec<MetricRow> = Vec::new();
        for database in databases {
            outcome.databases_scanned += 1;
            match self.source.extract(server, &database, metric).await {
                Ok(extracted) => rows.extend(extracted),
                Err(err) => {
                    let operation = metric.extract_operation();
                    self.record_failure(
                        &mut outcome,
                        server,
                        Stage::Extract,
                        Some(database),
                        &operation,
                        err,
                    )
                    .await;
                }
            }
        }
        outcome.rows_extracted = rows.len();

        if rows.is_empty() {
            tracing::info!(event = "load_skipped", server = %server, metric = %metric, reason = "no_rows");
            return outcome;
        }

        match self.store(server, &rows).await {
            Ok(()) => {
                outcome.rows_loaded = rows.len();
                tracing::info!(event = "load_finished", server = %server, metric = %metric, rows = rows.len());
            }
            Err(err) => {
                let operation = metric.load_operation();
                self.record_failure(&mut outcome, server, Stage::Load, None, &operation, err)
                    .await;
            }
        }

        outcome
    }

    /// Insert every row in one transaction, rolling back on the first failure.
    async fn store(&self, server: &str, rows: &[MetricRow]) -> Result<()> {
        let mut tx = self.sink.begin().await?;
        for row in rows {
            if let Err(err) = tx.insert(server, row).await {
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(event = "rollback_failed", server = %server, error = %rollback);
                }
                return Err(err);
            }
        }
        tx.commit().await
    }

    async fn record_failure(
        &self,
        outcome: &mut MetricOutcome,
        server: &str,
        stage: Stage,
        database: Option<String>,
        operation: &str,
        err: Error,
    ) {
        tracing::error!(
            event = "unit_failed",
            server = %server,
            metric = %outcome.metric,
            database = database.as_deref().unwrap_or(""),
            operation = %operation,
            error = %err
        );
        notify_best_effort(self.notifier, Notification::failure(operation, &err)).await;
        outcome.failures.push(UnitFailure {
            stage,
            database,
            message: err.to_string(),
        });
    }
}
