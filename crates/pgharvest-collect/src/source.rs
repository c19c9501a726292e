use async_trait::async_trait;

use pgharvest_core::{Metric, MetricRow, Result};

/// Read side of a harvest: something that can list databases on a target
/// server and run a metric's query against one of them.
#[async_trait]
pub trait Source: Send + Sync {
    /// Non-template databases on `server`.
    async fn databases(&self, server: &str) -> Result<Vec<String>>;

    /// Run the query behind `metric` against `database` on `server`.
    ///
    /// An empty vector means the query succeeded and matched nothing.
    async fn extract(&self, server: &str, database: &str, metric: Metric)
    -> Result<Vec<MetricRow>>;
}
