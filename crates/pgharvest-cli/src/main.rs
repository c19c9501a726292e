mod registry;

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use pgharvest_collect::{PostgresSource, Source, SourceOptions};
use pgharvest_core::{
    Credentials, EnvValues, Error as CoreError, HarvestReport, Metric, Settings, load_settings,
};
use pgharvest_load::{
    AdminDatabase, DIRECTORY_OPERATION, HarvestOptions, Harvester, Loader, ServerDirectory,
};
use pgharvest_notify::{Notification, Notifier, SmtpNotifier, build_notifier, notify_best_effort};
use registry::{RunContext, init_logging, start_run, write_report};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum CliError {
    #[error("registry error: {0}")]
    Registry(#[from] registry::RegistryError),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("json serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("run finished with {0} failure(s)")]
    Failures(usize),
}

#[derive(Parser, Debug)]
#[command(name = "pgharvest", version, about = "PostgreSQL metadata harvester")]
struct Cli {
    /// Settings file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "pgharvest.toml")]
    config: PathBuf,
    /// KEY=VALUE file with target and SMTP credentials.
    #[arg(long, global = true, default_value = ".env")]
    env_file: PathBuf,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Harvest every configured metric from every active server.
    Harvest(HarvestArgs),
    /// Print the active servers from the admin directory.
    Servers(AdminLogin),
    /// Run one extractor and print its rows as JSON.
    Extract(ExtractArgs),
    /// Run one loader against one server.
    Load(LoadArgs),
    /// Send a single email through the configured SMTP relay.
    Notify(NotifyArgs),
}

#[derive(Args, Debug)]
struct AdminLogin {
    admin_username: String,
    admin_password: String,
}

impl AdminLogin {
    fn credentials(&self) -> Credentials {
        Credentials::new(&self.admin_username, &self.admin_password)
    }
}

#[derive(Args, Debug)]
struct HarvestArgs {
    #[command(flatten)]
    admin: AdminLogin,
    /// Output directory for runs.
    #[arg(long, default_value = "runs")]
    run_dir: PathBuf,
    /// Metric to harvest; repeat to run several. Overrides the settings file.
    #[arg(long = "metric", value_name = "METRIC")]
    metrics: Vec<Metric>,
    /// Servers harvested at the same time.
    #[arg(long)]
    concurrency: Option<usize>,
    /// Exit non-zero when any server, database or load step failed.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct ExtractArgs {
    /// A metric name, `databases` or `tables`.
    kind: ExtractKind,
    server: String,
    username: String,
    password: String,
    /// Defaults to the bootstrap database from the settings file.
    database: Option<String>,
}

#[derive(Args, Debug)]
struct LoadArgs {
    metric: Metric,
    target_server: String,
    target_username: String,
    target_password: String,
    #[command(flatten)]
    admin: AdminLogin,
    /// Exit non-zero when the loader recorded a failure.
    #[arg(long, default_value_t = false)]
    strict: bool,
}

#[derive(Args, Debug)]
struct NotifyArgs {
    subject: String,
    body: String,
    to: String,
}

#[derive(Debug, Clone, Copy)]
enum ExtractKind {
    Databases,
    Tables,
    Metric(Metric),
}

impl FromStr for ExtractKind {
    type Err = CoreError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "databases" => Ok(ExtractKind::Databases),
            "tables" => Ok(ExtractKind::Tables),
            _ => value.parse().map(ExtractKind::Metric),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    let Cli {
        config,
        env_file,
        command,
    } = cli;

    match command {
        Command::Harvest(args) => run_harvest(&config, &env_file, args).await,
        Command::Servers(args) => {
            init_logging(None)?;
            run_servers(&config, args).await
        }
        Command::Extract(args) => {
            init_logging(None)?;
            run_extract(&config, args).await
        }
        Command::Load(args) => {
            init_logging(None)?;
            run_load(&config, &env_file, args).await
        }
        Command::Notify(args) => {
            init_logging(None)?;
            run_notify(&config, &env_file, args).await
        }
    }
}

async fn run_harvest(config: &Path, env_file: &Path, args: HarvestArgs) -> Result<(), CliError> {
    let HarvestArgs {
        admin,
        run_dir,
        metrics,
        concurrency,
        strict,
    } = args;

    let mut settings = load_settings(config)?;
    if !metrics.is_empty() {
        settings.harvest.metrics = metrics;
    }
    if let Some(concurrency) = concurrency {
        settings.harvest.concurrency = concurrency;
    }
    settings.validate()?;

    let env = EnvValues::load(env_file)?;
    let target_credentials = env.target_credentials()?;
    let admin_credentials = admin.credentials();

    let run_id = Uuid::new_v4().to_string();
    let started_at = chrono::Utc::now();
    let run_ctx = RunContext {
        run_id: run_id.clone(),
        started_at,
        run_dir,
        strict,
        settings: settings.clone(),
        admin_username: admin_credentials.username().to_string(),
        target_username: target_credentials.username().to_string(),
    };

    let run_paths = start_run(&run_ctx)?;
    init_logging(Some(&run_paths.logs_path))?;

    tracing::info!(event = "run_started", run_id = %run_id, admin_host = %settings.admin.host);
    let timer = Instant::now();

    let notifier = build_notifier(&settings.notify, env.smtp_credentials())?;
    let source = PostgresSource::new(target_credentials, SourceOptions::from(&settings.target));
    let max_connections = u32::try_from(settings.harvest.concurrency).unwrap_or(u32::MAX);

    let report = match AdminDatabase::connect(&settings.admin, &admin_credentials, max_connections).await {
        Ok(admin) => {
            let loader = Loader::new(
                &source,
                &admin,
                notifier.as_ref(),
                settings.target.bootstrap_database.clone(),
            );
            let harvester = Harvester::new(&admin, loader, HarvestOptions::from(&settings.harvest));
            let report = harvester.run(&run_id).await;
            admin.close().await;
            report
        }
        Err(err) => unreachable_admin_report(&run_id, started_at, notifier.as_ref(), err).await,
    };

    write_report(&run_paths, &report)?;
    tracing::info!(event = "report_written", path = %run_paths.report_md_path.display());

    let duration_ms = timer.elapsed().as_millis();
    let status = if report.has_failures() { "partial" } else { "success" };
    tracing::info!(
        event = "run_finished",
        status = status,
        rows_loaded = report.rows_loaded(),
        failures = report.failure_count(),
        duration_ms = duration_ms
    );

    println!("{}", run_paths.root.display());

    if strict && report.has_failures() {
        return Err(CliError::Failures(report.failure_count()));
    }
    Ok(())
}

/// Report for a run whose admin database could not be reached: the server
/// list is unknown, so nothing is processed.
async fn unreachable_admin_report(
    run_id: &str,
    started_at: chrono::DateTime<chrono::Utc>,
    notifier: &dyn Notifier,
    err: CoreError,
) -> HarvestReport {
    tracing::error!(event = "directory_failed", error = %err);
    notify_best_effort(notifier, Notification::failure(DIRECTORY_OPERATION, &err)).await;

    let mut report = HarvestReport::new(run_id, started_at);
    report.directory_failure = Some(err.to_string());
    report.finished_at = Some(chrono::Utc::now());
    report
}

/// Open the admin database for a single loader run. A failure is logged and
/// notified under `operation` before it is returned.
async fn connect_admin_or_notify(
    settings: &Settings,
    credentials: &Credentials,
    notifier: &dyn Notifier,
    operation: &str,
) -> Result<AdminDatabase, CoreError> {
    match AdminDatabase::connect(&settings.admin, credentials, 1).await {
        Ok(admin) => Ok(admin),
        Err(err) => {
            tracing::error!(event = "admin_connect_failed", operation = %operation, error = %err);
            notify_best_effort(notifier, Notification::failure(operation, &err)).await;
            Err(err)
        }
    }
}

async fn run_servers(config: &Path, args: AdminLogin) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let admin = AdminDatabase::connect(&settings.admin, &args.credentials(), 1).await?;
    let servers = admin.active_servers().await;
    admin.close().await;

    for server in servers? {
        println!("{server}");
    }
    Ok(())
}

async fn run_extract(config: &Path, args: ExtractArgs) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let source = PostgresSource::new(
        Credentials::new(args.username, args.password),
        SourceOptions::from(&settings.target),
    );
    let database = args
        .database
        .unwrap_or_else(|| source.bootstrap_database().to_string());

    let output = match args.kind {
        ExtractKind::Databases => serde_json::to_string_pretty(&source.databases(&args.server).await?)?,
        ExtractKind::Tables => serde_json::to_string_pretty(&source.tables(&args.server, &database).await?)?,
        ExtractKind::Metric(metric) => {
            serde_json::to_string_pretty(&source.extract(&args.server, &database, metric).await?)?
        }
    };
    println!("{output}");
    Ok(())
}

async fn run_load(config: &Path, env_file: &Path, args: LoadArgs) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    let env = EnvValues::load(env_file)?;
    let notifier = build_notifier(&settings.notify, env.smtp_credentials())?;

    let source = PostgresSource::new(
        Credentials::new(args.target_username, args.target_password),
        SourceOptions::from(&settings.target),
    );
    let admin = connect_admin_or_notify(
        &settings,
        &args.admin.credentials(),
        notifier.as_ref(),
        &args.metric.load_operation(),
    )
    .await?;
    let loader = Loader::new(
        &source,
        &admin,
        notifier.as_ref(),
        settings.target.bootstrap_database.clone(),
    );

    let outcome = loader.load(&args.target_server, args.metric).await;
    admin.close().await;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if args.strict && !outcome.is_clean() {
        return Err(CliError::Failures(outcome.failures.len()));
    }
    Ok(())
}

async fn run_notify(config: &Path, env_file: &Path, args: NotifyArgs) -> Result<(), CliError> {
    let settings = load_settings(config)?;
    require_smtp(&settings)?;
    let env = EnvValues::load(env_file)?;

    let notifier = SmtpNotifier::from_settings(&settings.notify, env.smtp_credentials())?;
    notifier
        .send(&Notification::new(args.subject, args.body).to(args.to))
        .await?;
    Ok(())
}

/// `notify` sends even when harvest notifications are disabled, but still
/// needs a relay and a sender.
fn require_smtp(settings: &Settings) -> Result<(), CliError> {
    for (field, value) in [
        ("smtp_host", &settings.notify.smtp_host),
        ("sender", &settings.notify.sender),
    ] {
        if value.trim().is_empty() {
            return Err(CliError::InvalidConfig(format!(
                "notify.{field} must be set to send email"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn harvest_accepts_repeated_metrics() {
        let cli = Cli::try_parse_from([
            "pgharvest",
            "harvest",
            "dba_admin",
            "secret",
            "--metric",
            "users",
            "--metric",
            "index-usage",
            "--concurrency",
            "3",
        ])
        .expect("parse harvest");
        let Command::Harvest(args) = cli.command else {
            panic!("expected harvest");
        };
        assert_eq!(args.admin.admin_username, "dba_admin");
        assert_eq!(args.metrics, vec![Metric::Users, Metric::IndexUsage]);
        assert_eq!(args.concurrency, Some(3));
        assert_eq!(cli.config, PathBuf::from("pgharvest.toml"));
    }

    #[test]
    fn extract_kind_covers_lists_and_metrics() {
        assert!(matches!("databases".parse::<ExtractKind>(), Ok(ExtractKind::Databases)));
        assert!(matches!("Tables".parse::<ExtractKind>(), Ok(ExtractKind::Tables)));
        assert!(matches!(
            "grants".parse::<ExtractKind>(),
            Ok(ExtractKind::Metric(Metric::Grants))
        ));
        assert!("columns".parse::<ExtractKind>().is_err());
    }

    #[test]
    fn load_takes_target_then_admin_credentials() {
        let cli = Cli::try_parse_from([
            "pgharvest",
            "--config",
            "ops/pgharvest.toml",
            "load",
            "table_sizes",
            "pg-01",
            "monitor",
            "pw1",
            "dba_admin",
            "pw2",
        ])
        .expect("parse load");
        let Command::Load(args) = cli.command else {
            panic!("expected load");
        };
        assert_eq!(args.metric, Metric::TableSizes);
        assert_eq!(args.target_server, "pg-01");
        assert_eq!(args.admin.admin_password, "pw2");
        assert_eq!(cli.config, PathBuf::from("ops/pgharvest.toml"));
    }

    #[derive(Default)]
    struct RecordingNotifier {
        sent: std::sync::Mutex<Vec<Notification>>,
    }

    #[async_trait::async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, notification: &Notification) -> pgharvest_core::Result<()> {
            self.sent
                .lock()
                .expect("notifier lock")
                .push(notification.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreachable_admin_database_is_notified_for_load() {
        let mut settings = Settings::default();
        settings.admin.host = "127.0.0.1".to_string();
        settings.admin.port = 1;
        settings.admin.acquire_timeout_secs = 2;
        let notifier = RecordingNotifier::default();

        let result = connect_admin_or_notify(
            &settings,
            &Credentials::new("dba_admin", "secret"),
            &notifier,
            &Metric::IndexUsage.load_operation(),
        )
        .await;

        assert!(result.is_err());
        let sent = notifier.sent.lock().expect("notifier lock").clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "Failure: load_index_usage");
        assert!(sent[0]
            .body
            .starts_with("An error occurred in load_index_usage. The error is "));
    }

    #[test]
    fn notify_requires_relay_and_sender() {
        let settings = Settings::default();
        assert!(matches!(require_smtp(&settings), Err(CliError::InvalidConfig(_))));
    }
}
