use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::{PgPool, Postgres, Transaction};

use pgharvest_core::{
    AdminSettings, Credentials, Error, MetricRow, Result, ServerEntry, is_sql_identifier,
};

use crate::sink::{ServerDirectory, Sink, SinkTransaction};

mod statements;

pub use statements::{insert_statement, metric_columns};

/// The central admin database: server directory and metric tables.
#[derive(Debug, Clone)]
pub struct AdminDatabase {
    pool: PgPool,
    schema: String,
}

#[derive(Debug, sqlx::FromRow)]
struct RawServer {
    server_name: String,
    server_status: Option<i32>,
}

impl AdminDatabase {
    /// Connect with one pooled connection per concurrently harvested server.
    pub async fn connect(
        settings: &AdminSettings,
        credentials: &Credentials,
        max_connections: u32,
    ) -> Result<Self> {
        let options = PgConnectOptions::new()
            .host(&settings.host)
            .port(settings.port)
            .username(credentials.username())
            .password(credentials.password())
            .database(&settings.database)
            .application_name("pgharvest");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections.max(1))
            .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|err| Error::Connect {
                target: format!("{}/{}", settings.host, settings.database),
                message: err.to_string(),
            })?;

        tracing::debug!(event = "admin_connected", host = %settings.host, database = %settings.database);
        Self::from_pool(pool, &settings.schema)
    }

    pub fn from_pool(pool: PgPool, schema: &str) -> Result<Self> {
        if !is_sql_identifier(schema) {
            return Err(Error::Config(format!(
                "admin schema '{schema}' is not a plain identifier"
            )));
        }
        Ok(Self {
            pool,
            schema: schema.to_string(),
        })
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl ServerDirectory for AdminDatabase {
    async fn servers(&self) -> Result<Vec<ServerEntry>> {
        let statement = format!(
            "select server_name::text as server_name, server_status::int4 as server_status from {}.servers",
            self.schema
        );
        let rows = sqlx::query_as::<_, RawServer>(&statement)
            .fetch_all(&self.pool)
            .await
            .map_err(|err| Error::Query(err.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| ServerEntry {
                name: row.server_name,
                status: row.server_status.unwrap_or_default(),
            })
            .collect())
    }
}

#[async_trait]
impl Sink for AdminDatabase {
    async fn begin(&self) -> Result<Box<dyn SinkTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|err| Error::Transaction(err.to_string()))?;
        Ok(Box::new(AdminTransaction {
            tx,
            schema: self.schema.clone(),
        }))
    }
}

/// An open transaction on the admin database.
pub struct AdminTransaction {
    tx: Transaction<'static, Postgres>,
    schema: String,
}

#[async_trait]
impl SinkTransaction for AdminTransaction {
    async fn insert(&mut self, server: &str, row: &MetricRow) -> Result<()> {
        let statement = insert_statement(&self.schema, row.metric());
        statements::bind_row(sqlx::query(&statement), server, row)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| Error::Insert(format!("{}: {err}", row.metric().sink_table())))?;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx
            .commit()
            .await
            .map_err(|err| Error::Transaction(err.to_string()))
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx
            .rollback()
            .await
            .map_err(|err| Error::Transaction(err.to_string()))
    }
}
