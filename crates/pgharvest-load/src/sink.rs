use async_trait::async_trait;

use pgharvest_core::{MetricRow, Result, ServerEntry, active_server_names};

/// Source of the servers a harvest should visit.
#[async_trait]
pub trait ServerDirectory: Send + Sync {
    /// Every directory entry, active or not, in directory order.
    async fn servers(&self) -> Result<Vec<ServerEntry>>;

    async fn active_servers(&self) -> Result<Vec<String>> {
        Ok(active_server_names(self.servers().await?))
    }
}

/// Destination for harvested rows.
#[async_trait]
pub trait Sink: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn SinkTransaction>>;
}

/// A batch of inserts that becomes visible only on commit.
#[async_trait]
pub trait SinkTransaction: Send {
    async fn insert(&mut self, server: &str, row: &MetricRow) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
