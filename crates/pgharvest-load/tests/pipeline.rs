use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pgharvest_collect::Source;
use pgharvest_core::{
    DatabaseSize, Error, Metric, MetricRow, OutcomeStatus, Result, ServerEntry, Stage, TableSize,
};
use pgharvest_load::{HarvestOptions, Harvester, Loader, ServerDirectory, Sink, SinkTransaction};
use pgharvest_notify::{Notification, Notifier};

#[derive(Default)]
struct FakeSource {
    databases: BTreeMap<String, Vec<String>>,
    rows: BTreeMap<(String, String, Metric), Vec<MetricRow>>,
    unreachable: BTreeSet<(String, String)>,
    extract_calls: Mutex<Vec<(String, String, Metric)>>,
}

impl FakeSource {
    fn with_databases(mut self, server: &str, databases: &[&str]) -> Self {
        self.databases.insert(
            server.to_string(),
            databases.iter().map(|name| name.to_string()).collect(),
        );
        self
    }

    fn with_rows(mut self, server: &str, database: &str, metric: Metric, rows: Vec<MetricRow>) -> Self {
        self.rows
            .insert((server.to_string(), database.to_string(), metric), rows);
        self
    }

    fn unreachable(mut self, server: &str, database: &str) -> Self {
        self.unreachable
            .insert((server.to_string(), database.to_string()));
        self
    }
}

#[async_trait]
impl Source for FakeSource {
    async fn databases(&self, server: &str) -> Result<Vec<String>> {
        self.databases
            .get(server)
            .cloned()
            .ok_or_else(|| Error::Connect {
                target: format!("{server}/postgres"),
                message: "connection refused".to_string(),
            })
    }

    async fn extract(&self, server: &str, database: &str, metric: Metric) -> Result<Vec<MetricRow>> {
        self.extract_calls
            .lock()
            .unwrap()
            .push((server.to_string(), database.to_string(), metric));
        if self
            .unreachable
            .contains(&(server.to_string(), database.to_string()))
        {
            return Err(Error::Connect {
                target: format!("{server}/{database}"),
                message: "connection refused".to_string(),
            });
        }
        Ok(self
            .rows
            .get(&(server.to_string(), database.to_string(), metric))
            .cloned()
            .unwrap_or_default())
    }
}

#[derive(Debug, Clone)]
struct StoredRow {
    server: String,
    row: MetricRow,
    last_updated: DateTime<Utc>,
}

#[derive(Default)]
struct SinkState {
    committed: Vec<StoredRow>,
    begun: usize,
    rolled_back: usize,
    attempted_inserts: usize,
}

/// In-memory sink; rows become visible in `committed` only on commit.
#[derive(Clone, Default)]
struct MemorySink {
    state: Arc<Mutex<SinkState>>,
    fail_on_insert: Option<usize>,
}

impl MemorySink {
    fn failing_on_insert(index: usize) -> Self {
        Self {
            fail_on_insert: Some(index),
            ..Self::default()
        }
    }

    fn committed(&self) -> Vec<StoredRow> {
        self.state.lock().unwrap().committed.clone()
    }

    fn begun(&self) -> usize {
        self.state.lock().unwrap().begun
    }
}

struct MemoryTransaction {
    state: Arc<Mutex<SinkState>>,
    pending: Vec<StoredRow>,
    fail_on_insert: Option<usize>,
}

#[async_trait]
impl Sink for MemorySink {
    async fn begin(&self) -> Result<Box<dyn SinkTransaction>> {
        self.state.lock().unwrap().begun += 1;
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            pending: Vec::new(),
            fail_on_insert: self.fail_on_insert,
        }))
    }
}

#[async_trait]
impl SinkTransaction for MemoryTransaction {
    async fn insert(&mut self, server: &str, row: &MetricRow) -> Result<()> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state.attempted_inserts += 1;
            state.attempted_inserts
        };
        if self.fail_on_insert == Some(attempt) {
            return Err(Error::Insert("value too long for type character varying(255)".to_string()));
        }
        self.pending.push(StoredRow {
            server: server.to_string(),
            row: row.clone(),
            last_updated: Utc::now(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.committed.extend(self.pending);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.state.lock().unwrap().rolled_back += 1;
        Ok(())
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|notification| notification.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct FakeDirectory {
    entries: Result<Vec<ServerEntry>>,
}

impl FakeDirectory {
    fn with(entries: &[(&str, i32)]) -> Self {
        Self {
            entries: Ok(entries
                .iter()
                .map(|(name, status)| ServerEntry {
                    name: name.to_string(),
                    status: *status,
                })
                .collect()),
        }
    }
}

#[async_trait]
impl ServerDirectory for FakeDirectory {
    async fn servers(&self) -> Result<Vec<ServerEntry>> {
        match &self.entries {
            Ok(entries) => Ok(entries.clone()),
            Err(err) => Err(Error::Query(err.to_string())),
        }
    }
}

fn table_size(database: &str, table: &str, bytes: i64) -> MetricRow {
    MetricRow::TableSizes(TableSize {
        database: database.to_string(),
        schema: "public".to_string(),
        table: table.to_string(),
        table_bytes: bytes,
        index_bytes: 0,
        total_bytes: bytes,
        row_estimate: Some(1),
    })
}

fn database_size(database: &str) -> MetricRow {
    MetricRow::DatabaseSizes(DatabaseSize {
        database: database.to_string(),
        size_mb: 12,
        size_gb: 0,
    })
}

#[tokio::test]
async fn table_size_loader_inserts_one_row_per_table_tagged_with_server() {
    let source = FakeSource::default()
        .with_databases("pg-01", &["billing"])
        .with_rows(
            "pg-01",
            "billing",
            Metric::TableSizes,
            vec![table_size("billing", "invoices", 8192), table_size("billing", "customers", 16384)],
        );
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    let outcome = loader.load("pg-01", Metric::TableSizes).await;

    assert_eq!(outcome.status(), OutcomeStatus::Loaded);
    assert_eq!(outcome.databases_scanned, 1);
    assert_eq!(outcome.rows_loaded, 2);
    let committed = sink.committed();
    assert_eq!(committed.len(), 2);
    for stored in &committed {
        assert_eq!(stored.server, "pg-01");
        assert_eq!(stored.row.database(), Some("billing"));
        assert_eq!(stored.row.metric(), Metric::TableSizes);
    }
    assert_eq!(sink.begun(), 1);
    assert!(notifier.subjects().is_empty());
}

#[tokio::test]
async fn server_scoped_metrics_use_bootstrap_database_only() {
    let source = FakeSource::default().with_rows(
        "pg-01",
        "maintenance",
        Metric::DatabaseSizes,
        vec![database_size("billing"), database_size("maintenance")],
    );
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "maintenance");

    let outcome = loader.load("pg-01", Metric::DatabaseSizes).await;

    assert_eq!(outcome.rows_loaded, 2);
    let calls = source.extract_calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![("pg-01".to_string(), "maintenance".to_string(), Metric::DatabaseSizes)]
    );
}

#[tokio::test]
async fn no_rows_means_no_transaction() {
    let source = FakeSource::default().with_databases("pg-01", &["empty"]);
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    let outcome = loader.load("pg-01", Metric::IndexUsage).await;

    assert_eq!(outcome.status(), OutcomeStatus::Empty);
    assert_eq!(outcome.rows_extracted, 0);
    assert_eq!(sink.begun(), 0);
    assert!(notifier.subjects().is_empty());
}

#[tokio::test]
async fn running_twice_appends_a_second_set_of_rows() {
    let source = FakeSource::default()
        .with_databases("pg-01", &["billing"])
        .with_rows(
            "pg-01",
            "billing",
            Metric::TableSizes,
            vec![table_size("billing", "invoices", 8192)],
        );
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    loader.load("pg-01", Metric::TableSizes).await;
    loader.load("pg-01", Metric::TableSizes).await;

    let committed = sink.committed();
    assert_eq!(committed.len(), 2);
    assert_eq!(committed[0].server, committed[1].server);
    assert_eq!(committed[0].row, committed[1].row);
    assert!(committed[0].last_updated <= committed[1].last_updated);
    assert_eq!(sink.begun(), 2);
}

#[tokio::test]
async fn connection_failure_is_notified_and_nothing_is_inserted() {
    let source = FakeSource::default()
        .with_databases("pg-01", &["billing"])
        .unreachable("pg-01", "billing");
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    let outcome = loader.load("pg-01", Metric::TableSizes).await;

    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(outcome.failures.len(), 1);
    assert_eq!(outcome.failures[0].stage, Stage::Extract);
    assert_eq!(outcome.failures[0].database.as_deref(), Some("billing"));
    assert_eq!(sink.begun(), 0);
    assert!(sink.committed().is_empty());

    let sent = notifier.sent.lock().unwrap().clone();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].subject, "Failure: extract_table_sizes");
    assert!(sent[0]
        .body
        .starts_with("An error occurred in extract_table_sizes. The error is connection to pg-01/billing failed"));
}

#[tokio::test]
async fn failing_database_does_not_block_the_others() {
    let source = FakeSource::default()
        .with_databases("pg-01", &["billing", "crm"])
        .unreachable("pg-01", "billing")
        .with_rows(
            "pg-01",
            "crm",
            Metric::TableSizes,
            vec![table_size("crm", "contacts", 4096)],
        );
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    let outcome = loader.load("pg-01", Metric::TableSizes).await;

    assert_eq!(outcome.status(), OutcomeStatus::Partial);
    assert_eq!(outcome.databases_scanned, 2);
    assert_eq!(outcome.rows_loaded, 1);
    assert_eq!(sink.committed()[0].row.database(), Some("crm"));
}

#[tokio::test]
async fn insert_failure_rolls_back_every_row_for_the_server() {
    let source = FakeSource::default()
        .with_databases("pg-01", &["billing"])
        .with_rows(
            "pg-01",
            "billing",
            Metric::TableSizes,
            vec![
                table_size("billing", "a", 1),
                table_size("billing", "b", 2),
                table_size("billing", "c", 3),
            ],
        );
    let sink = MemorySink::failing_on_insert(2);
    let notifier = RecordingNotifier::default();
    let loader = Loader::new(&source, &sink, &notifier, "postgres");

    let outcome = loader.load("pg-01", Metric::TableSizes).await;

    assert_eq!(outcome.status(), OutcomeStatus::Failed);
    assert_eq!(outcome.rows_extracted, 3);
    assert_eq!(outcome.rows_loaded, 0);
    assert_eq!(outcome.failures[0].stage, Stage::Load);
    assert!(sink.committed().is_empty());
    let state = sink.state.lock().unwrap();
    assert_eq!(state.rolled_back, 1);
    assert_eq!(state.attempted_inserts, 2);
    drop(state);
    assert_eq!(notifier.subjects(), vec!["Failure: load_table_sizes"]);
}

#[tokio::test]
async fn harvester_skips_inactive_servers_and_keeps_directory_order() {
    let directory = FakeDirectory::with(&[("pg-b", 1), ("pg-off", 0), ("pg-a", 1), ("pg-retired", 2)]);
    let source = FakeSource::default()
        .with_rows("pg-b", "postgres", Metric::DatabaseSizes, vec![database_size("app")])
        .with_rows("pg-a", "postgres", Metric::DatabaseSizes, vec![database_size("app")]);
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let harvester = Harvester::new(
        &directory,
        Loader::new(&source, &sink, &notifier, "postgres"),
        HarvestOptions {
            metrics: vec![Metric::DatabaseSizes, Metric::Users],
            concurrency: 2,
        },
    );

    let report = harvester.run("run-1").await;

    let servers: Vec<&str> = report.servers.iter().map(|server| server.server.as_str()).collect();
    assert_eq!(servers, vec!["pg-b", "pg-a"]);
    assert!(report.servers.iter().all(|server| {
        let metrics: Vec<Metric> = server.metrics.iter().map(|outcome| outcome.metric).collect();
        metrics == vec![Metric::DatabaseSizes, Metric::Users]
    }));
    assert!(source
        .extract_calls
        .lock()
        .unwrap()
        .iter()
        .all(|(server, _, _)| server != "pg-off" && server != "pg-retired"));
    assert_eq!(report.rows_loaded(), 2);
    assert!(!report.has_failures());
    assert!(report.finished_at.is_some());
}

#[tokio::test]
async fn unreadable_directory_is_reported_as_nothing_to_process() {
    let directory = FakeDirectory {
        entries: Err(Error::Query("relation \"dba.servers\" does not exist".to_string())),
    };
    let source = FakeSource::default();
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let harvester = Harvester::new(
        &directory,
        Loader::new(&source, &sink, &notifier, "postgres"),
        HarvestOptions::default(),
    );

    let report = harvester.run("run-2").await;

    assert!(report.servers.is_empty());
    assert!(report.directory_failure.is_some());
    assert!(report.has_failures());
    assert_eq!(notifier.subjects(), vec!["Failure: get_servers"]);
    assert_eq!(sink.begun(), 0);
}

#[tokio::test]
async fn unreachable_server_fails_each_metric_without_stopping_the_run() {
    let directory = FakeDirectory::with(&[("pg-down", 1), ("pg-up", 1)]);
    let source = FakeSource::default()
        .with_databases("pg-up", &["app"])
        .with_rows("pg-up", "app", Metric::TableSizes, vec![table_size("app", "t", 1)]);
    let sink = MemorySink::default();
    let notifier = RecordingNotifier::default();
    let harvester = Harvester::new(
        &directory,
        Loader::new(&source, &sink, &notifier, "postgres"),
        HarvestOptions {
            metrics: vec![Metric::TableSizes, Metric::Grants],
            concurrency: 1,
        },
    );

    let report = harvester.run("run-3").await;

    let down = &report.servers[0];
    assert_eq!(down.server, "pg-down");
    assert_eq!(down.failure_count(), 2);
    assert!(down
        .metrics
        .iter()
        .all(|outcome| outcome.failures[0].stage == Stage::ListDatabases));
    assert_eq!(report.servers[1].rows_loaded(), 1);
    assert_eq!(
        notifier.subjects(),
        vec!["Failure: get_databases", "Failure: get_databases"]
    );
}
