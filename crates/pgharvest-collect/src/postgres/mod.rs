use std::future::Future;

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection};

use pgharvest_core::{Credentials, Error, Metric, MetricRow, Result, TableEntry};

use crate::options::SourceOptions;
use crate::source::Source;

mod mapper;
mod queries;

/// Extractor for live PostgreSQL servers.
///
/// Every call opens its own connection and closes it before returning,
/// whether the query succeeded or not.
#[derive(Debug, Clone)]
pub struct PostgresSource {
    credentials: Credentials,
    options: SourceOptions,
}

impl PostgresSource {
    pub fn new(credentials: Credentials, options: SourceOptions) -> Self {
        Self {
            credentials,
            options,
        }
    }

    pub fn bootstrap_database(&self) -> &str {
        &self.options.bootstrap_database
    }

    fn connect_options(&self, server: &str, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(server)
            .port(self.options.port)
            .username(self.credentials.username())
            .password(self.credentials.password())
            .database(database)
            .application_name(&self.options.application_name)
    }

    async fn connect(&self, server: &str, database: &str) -> Result<PgConnection> {
        let options = self.connect_options(server, database);
        let connecting = PgConnection::connect_with(&options);

        let connected = match self.options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| Error::Timeout(limit.as_secs()))?,
            None => connecting.await,
        };

        connected.map_err(|err| Error::Connect {
            target: format!("{server}/{database}"),
            message: err.to_string(),
        })
    }

    /// Run `work` on a fresh connection, then close it.
    async fn scoped<T, F, Fut>(&self, server: &str, database: &str, work: F) -> Result<T>
    where
        F: FnOnce(PgConnection) -> Fut,
        Fut: Future<Output = (PgConnection, Result<T>)>,
    {
        let conn = self.connect(server, database).await?;
        let (conn, result) = work(conn).await;
        if let Err(err) = conn.close().await {
            tracing::debug!(event = "connection_close_failed", server = %server, database = %database, error = %err);
        }
        result
    }

    /// Base tables of `database`.
    pub async fn tables(&self, server: &str, database: &str) -> Result<Vec<TableEntry>> {
        self.scoped(server, database, |mut conn| async move {
            let result = queries::base_tables(&mut conn)
                .await
                .map(mapper::map_table_entries);
            (conn, result)
        })
        .await
    }
}

#[async_trait]
impl Source for PostgresSource {
    async fn databases(&self, server: &str) -> Result<Vec<String>> {
        self.scoped(server, self.bootstrap_database(), |mut conn| async move {
            let result = queries::list_databases(&mut conn).await;
            (conn, result)
        })
        .await
    }

    async fn extract(
        &self,
        server: &str,
        database: &str,
        metric: Metric,
    ) -> Result<Vec<MetricRow>> {
        tracing::debug!(event = "extract_started", server = %server, database = %database, metric = %metric);
        let rows = self
            .scoped(server, database, |mut conn| async move {
                let result = fetch_metric(&mut conn, metric).await;
                (conn, result)
            })
            .await?;
        tracing::debug!(event = "extract_finished", server = %server, database = %database, metric = %metric, rows = rows.len());
        Ok(rows)
    }
}

async fn fetch_metric(conn: &mut PgConnection, metric: Metric) -> Result<Vec<MetricRow>> {
    let rows = match metric {
        Metric::DatabaseSizes => mapper::map_database_sizes(queries::database_sizes(conn).await?),
        Metric::TableSizes => mapper::map_table_sizes(queries::table_sizes(conn).await?),
        Metric::TableUsage => mapper::map_table_usage(queries::table_usage(conn).await?),
        Metric::IndexUsage => mapper::map_index_usage(queries::index_usage(conn).await?),
        Metric::Indexes => mapper::map_indexes(queries::indexes(conn).await?),
        Metric::Grants => mapper::map_grants(queries::grants(conn).await?),
        Metric::Users => mapper::map_roles(queries::roles(conn).await?),
    };
    Ok(rows)
}
