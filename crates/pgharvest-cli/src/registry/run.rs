use std::fs::{OpenOptions, create_dir_all};
use std::path::{Path, PathBuf};
use std::process::Command;

use chrono::{DateTime, Utc};
use serde::Serialize;

use pgharvest_core::{HarvestReport, Settings, render_report};

use super::{RegistryError, RegistryResult};

/// Metadata captured at run start.
#[derive(Debug, Clone)]
pub struct RunContext {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub run_dir: PathBuf,
    pub strict: bool,
    pub settings: Settings,
    pub admin_username: String,
    pub target_username: String,
}

/// JSON config written to each run directory. Passwords are never part of it.
#[derive(Debug, Serialize)]
pub struct RunConfig<'a> {
    pub run_id: &'a str,
    pub started_at: String,
    pub strict: bool,
    pub admin_username: &'a str,
    pub target_username: &'a str,
    pub settings: &'a Settings,
    pub git: GitInfo,
}

/// Git metadata for reproducibility.
#[derive(Debug, Serialize)]
pub struct GitInfo {
    pub commit: Option<String>,
    pub dirty: Option<bool>,
}

/// Paths for run artifacts.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub root: PathBuf,
    pub logs_path: PathBuf,
    pub report_json_path: PathBuf,
    pub report_md_path: PathBuf,
}

pub fn start_run(ctx: &RunContext) -> RegistryResult<RunPaths> {
    let timestamp = ctx.started_at.format("%Y-%m-%dT%H-%M-%SZ").to_string();
    let root = ctx.run_dir.join(format!("{timestamp}__run_{}", ctx.run_id));

    create_dir_all(&root)?;

    let config = RunConfig {
        run_id: &ctx.run_id,
        started_at: ctx.started_at.to_rfc3339(),
        strict: ctx.strict,
        admin_username: &ctx.admin_username,
        target_username: &ctx.target_username,
        settings: &ctx.settings,
        git: collect_git_info(),
    };
    write_json(&root.join("config.json"), &config)?;

    let logs_path = root.join("logs.ndjson");
    OpenOptions::new().create(true).append(true).open(&logs_path)?;

    Ok(RunPaths {
        logs_path,
        report_json_path: root.join("report.json"),
        report_md_path: root.join("report.md"),
        root,
    })
}

pub fn write_report(paths: &RunPaths, report: &HarvestReport) -> RegistryResult<()> {
    write_json(&paths.report_json_path, report)?;
    std::fs::write(&paths.report_md_path, render_report(report))?;
    Ok(())
}

fn collect_git_info() -> GitInfo {
    let commit = Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| String::from_utf8_lossy(&output.stdout).trim().to_string())
        .filter(|value| !value.is_empty());

    let dirty = Command::new("git")
        .args(["status", "--porcelain"])
        .output()
        .ok()
        .filter(|output| output.status.success())
        .map(|output| !output.stdout.is_empty());

    GitInfo { commit, dirty }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> RegistryResult<()> {
    let file = OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(path)?;
    serde_json::to_writer_pretty(file, value).map_err(RegistryError::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgharvest_core::{Metric, MetricOutcome, ServerReport};

    fn context(run_dir: PathBuf) -> RunContext {
        RunContext {
            run_id: "4b7f".to_string(),
            started_at: Utc::now(),
            run_dir,
            strict: false,
            settings: Settings::default(),
            admin_username: "dba_admin".to_string(),
            target_username: "monitor".to_string(),
        }
    }

    #[test]
    fn writes_config_and_report_artifacts() {
        let run_dir = std::env::temp_dir().join(format!("pgharvest-run-{}", uuid::Uuid::new_v4()));
        let ctx = context(run_dir.clone());

        let paths = start_run(&ctx).expect("start run");
        assert!(paths.root.starts_with(&run_dir));
        assert!(paths
            .root
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.ends_with("__run_4b7f")));
        assert!(paths.logs_path.exists());

        let config: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(paths.root.join("config.json")).expect("read config"),
        )
        .expect("parse config");
        assert_eq!(config["admin_username"], "dba_admin");
        assert_eq!(config["settings"]["admin"]["schema"], "dba");

        let mut report = HarvestReport::new(&ctx.run_id, ctx.started_at);
        let mut outcome = MetricOutcome::new(Metric::Users);
        outcome.rows_extracted = 4;
        outcome.rows_loaded = 4;
        report.servers.push(ServerReport {
            server: "pg-01".to_string(),
            metrics: vec![outcome],
        });
        write_report(&paths, &report).expect("write report");

        let markdown = std::fs::read_to_string(&paths.report_md_path).expect("read markdown");
        assert!(markdown.contains("| pg-01 | users | loaded | 0 | 4 | 4 |"));
        let json: HarvestReport = serde_json::from_str(
            &std::fs::read_to_string(&paths.report_json_path).expect("read json"),
        )
        .expect("parse report");
        assert_eq!(json, report);

        std::fs::remove_dir_all(&run_dir).ok();
    }
}
