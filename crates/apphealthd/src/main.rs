//! apphealthd — watch an app's HTTP health endpoint.
//!
//! Runs a single `AppHealth` monitor against `http://{address}{path}` and
//! reports every healthy/unhealthy transition. The watched app (or an
//! operator) can push passive reports and request probes on stdin:
//!
//! ```text
//! probe                 request an immediate probe
//! healthy               passive healthy report
//! unhealthy [reason]    passive unhealthy report
//! status                print the current status
//! ```
//!
//! # Usage
//!
//! ```text
//! apphealthd watch --address 127.0.0.1:3000 --path /healthz --threshold 3
//! ```

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use apphealth::{AppHealth, AppHealthConfig, CancellationToken, Status, http_probe};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "apphealthd", about = "App health watcher")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Probe an HTTP endpoint until interrupted.
    Watch {
        /// Address of the app (ip:port).
        #[arg(long)]
        address: String,

        /// Health endpoint path.
        #[arg(long, default_value = "/healthz")]
        path: String,

        /// TOML file with probe settings.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Probe interval (e.g. "5s", "500ms").
        #[arg(long, value_parser = parse_duration_arg)]
        interval: Option<Duration>,

        /// Probe timeout (e.g. "500ms").
        #[arg(long, value_parser = parse_duration_arg)]
        timeout: Option<Duration>,

        /// Consecutive failures before reporting unhealthy.
        #[arg(long)]
        threshold: Option<u32>,

        /// Ignore passive reports from stdin.
        #[arg(long)]
        probe_only: bool,

        /// Print transitions to stdout as JSON lines.
        #[arg(long)]
        json: bool,
    },
}

/// One line of `--json` output.
#[derive(Serialize)]
struct TransitionEvent<'a> {
    address: &'a str,
    #[serde(flatten)]
    status: &'a Status,
}

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    apphealth::parse_duration(s).ok_or_else(|| format!("invalid duration: {s:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,apphealth=debug,apphealthd=debug".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Watch {
            address,
            path,
            config,
            interval,
            timeout,
            threshold,
            probe_only,
            json,
        } => {
            let file = match config {
                Some(file) => Some(
                    AppHealthConfig::from_file(&file)
                        .with_context(|| format!("loading {}", file.display()))?,
                ),
                None => None,
            };
            let settings = resolve_config(file, interval, timeout, threshold, probe_only);

            run_watch(address, path, settings, json).await
        }
    }
}

/// Flags override file values, file values override defaults.
fn resolve_config(
    file: Option<AppHealthConfig>,
    interval: Option<Duration>,
    timeout: Option<Duration>,
    threshold: Option<u32>,
    probe_only: bool,
) -> AppHealthConfig {
    let mut settings = file.unwrap_or_default();
    if let Some(interval) = interval {
        settings.probe_interval = interval;
    }
    if let Some(timeout) = timeout {
        settings.probe_timeout = timeout;
    }
    if let Some(threshold) = threshold {
        settings.threshold = threshold;
    }
    settings.probe_only |= probe_only;
    settings
}

async fn run_watch(
    address: String,
    path: String,
    settings: AppHealthConfig,
    json: bool,
) -> anyhow::Result<()> {
    info!(%address, %path, "apphealthd starting");

    let mut health = AppHealth::new(settings, Some(http_probe(address.clone(), path)));
    let label = address.clone();
    health.on_health_change(move |_token, status| {
        let label = label.clone();
        async move {
            if status.is_healthy {
                info!(address = %label, "app is healthy");
            } else {
                warn!(address = %label, reason = ?status.reason, "app is unhealthy");
            }
            if json {
                print_json(&TransitionEvent {
                    address: &label,
                    status: &status,
                });
            }
        }
    });

    let ctx = CancellationToken::new();
    health.start(&ctx)?;
    // First probe right away instead of one interval from now.
    health.enqueue();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let result = loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break Ok(());
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => handle_command(&health, line.trim()),
                Ok(None) => {
                    info!("stdin closed");
                    break Ok(());
                }
                Err(e) => break Err(anyhow::Error::new(e).context("reading stdin")),
            },
        }
    };

    ctx.cancel();
    health.close().await?;
    info!("apphealthd stopped");
    result
}

fn handle_command(health: &AppHealth, line: &str) {
    let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
    match command {
        "" => {}
        "probe" => health.enqueue(),
        "healthy" => health.report_health(Status::healthy()),
        "unhealthy" => {
            let reason = rest.trim();
            let reason = if reason.is_empty() { "reported by app" } else { reason };
            health.report_health(Status::unhealthy(reason));
        }
        "status" => print_json(&health.get_status()),
        other => warn!(command = other, "unknown command"),
    }
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(line) => println!("{line}"),
        Err(e) => warn!(error = %e, "failed to encode status"),
    }
}
