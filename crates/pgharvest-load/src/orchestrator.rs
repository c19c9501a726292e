use chrono::Utc;
use futures::stream::{self, StreamExt};

use pgharvest_core::{HarvestReport, HarvestSettings, Metric, ServerReport};
use pgharvest_notify::{Notification, notify_best_effort};

use crate::loader::Loader;
use crate::sink::ServerDirectory;

/// Operation name reported when the server directory cannot be read.
pub const DIRECTORY_OPERATION: &str = "get_servers";

#[derive(Debug, Clone)]
pub struct HarvestOptions {
    /// Loaders run for every server, in this order.
    pub metrics: Vec<Metric>,
    /// Servers harvested at the same time; 1 is strictly sequential.
    pub concurrency: usize,
}

impl Default for HarvestOptions {
    fn default() -> Self {
        Self {
            metrics: Metric::DEFAULT_ORDER.to_vec(),
            concurrency: 1,
        }
    }
}

impl From<&HarvestSettings> for HarvestOptions {
    fn from(settings: &HarvestSettings) -> Self {
        Self {
            metrics: settings.metrics.clone(),
            concurrency: settings.concurrency,
        }
    }
}

/// Runs every configured loader against every active server.
pub struct Harvester<'a> {
    directory: &'a dyn ServerDirectory,
    loader: Loader<'a>,
    options: HarvestOptions,
}

impl<'a> Harvester<'a> {
    pub fn new(directory: &'a dyn ServerDirectory, loader: Loader<'a>, options: HarvestOptions) -> Self {
        Self {
            directory,
            loader,
            options,
        }
    }

    pub async fn run(&self, run_id: &str) -> HarvestReport {
        let mut report = HarvestReport::new(run_id, Utc::now());

        let servers = match self.directory.active_servers().await {
            Ok(servers) => servers,
            Err(err) => {
                tracing::error!(event = "directory_failed", error = %err);
                notify_best_effort(
                    self.loader.notifier(),
                    Notification::failure(DIRECTORY_OPERATION, &err),
                )
                .await;
                report.directory_failure = Some(err.to_string());
                Vec::new()
            }
        };
        tracing::info!(
            event = "harvest_started",
            run_id = %run_id,
            servers = servers.len(),
            metrics = self.options.metrics.len(),
            concurrency = self.options.concurrency
        );

        report.servers = stream::iter(servers)
            .map(|server| self.harvest_server(server))
            .buffered(self.options.concurrency.max(1))
            .collect()
            .await;

        report.finished_at = Some(Utc::now());
        tracing::info!(
            event = "harvest_finished",
            run_id = %run_id,
            rows_loaded = report.rows_loaded(),
            failures = report.failure_count()
        );
        report
    }

    async fn harvest_server(&self, server: String) -> ServerReport {
        let mut metrics = Vec::with_capacity(self.options.metrics.len());
        for metric in &self.options.metrics {
            metrics.push(self.loader.load(&server, *metric).await);
        }
        ServerReport { server, metrics }
    }
}
