use anyhow::Context;
use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use weblog_monitor::{Alert, Monitor, MonitorConfig, Sites, Status};

#[derive(Parser)]
#[command(name = "weblog-monitor")]
#[command(about = "Monitor an access log in the Common Log Format", long_about = None)]
struct Cli {
    /// The log file to monitor
    filename: PathBuf,

    /// The average number of hits per second at which to alert
    alert_threshold: f64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Print events as JSON lines
    #[arg(long)]
    json: bool,

    /// Write logs to stderr as JSON
    #[arg(long)]
    json_logs: bool,
}

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

#[derive(Serialize)]
#[serde(tag = "event", rename_all = "lowercase")]
enum Output<'a> {
    Status(&'a Status),
    Sites(&'a Sites),
    Alert(&'a Alert),
}

fn print_event(output: Output<'_>, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(&output)?);
        return Ok(());
    }
    match output {
        Output::Status(status) => println!(
            "hits: {:>5}  2-minute average: {:>8.2}/s",
            status.hits_last_interval, status.average_hits
        ),
        Output::Sites(sites) => {
            let width = sites
                .sites
                .iter()
                .map(|s| s.total_hits.to_string().len())
                .max()
                .unwrap_or(1);
            println!("-- most visited sites --");
            for site in &sites.sites {
                println!("{:>width$}: {}", site.total_hits, site.site, width = width);
            }
        }
        Output::Alert(alert) if alert.in_alert => println!(
            "{} [ALERT] High traffic; hits = {:.1}/s",
            alert.time.format(TIME_FORMAT),
            alert.average_hits
        ),
        Output::Alert(alert) => println!(
            "{}         Recovered, hits = {:.1}/s",
            alert.time.format(TIME_FORMAT),
            alert.average_hits
        ),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging; stdout is reserved for events
    let level = if cli.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    if cli.json_logs {
        weblog_monitor::init_tracing(level);
    } else {
        tracing_subscriber::fmt()
            .with_max_level(level)
            .with_writer(std::io::stderr)
            .init();
    }

    let config = MonitorConfig::builder()
        .log_path(&cli.filename)
        .alert_threshold(cli.alert_threshold)
        .build();

    let cancel = CancellationToken::new();
    let (monitor, mut events) = Monitor::start(&config, cancel.clone())
        .await
        .with_context(|| format!("cannot monitor {}", cli.filename.display()))?;

    // A line containing just `r` on stdin resets the site counters
    let reset = monitor.reset_handle();
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if line.trim() == "r" && reset.reset().await.is_err() {
                break;
            }
        }
    });

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
            Some(status) = events.status.recv() => print_event(Output::Status(&status), cli.json)?,
            Some(sites) = events.sites.recv() => print_event(Output::Sites(&sites), cli.json)?,
            Some(alert) = events.alerts.recv() => print_event(Output::Alert(&alert), cli.json)?,
            else => break,
        }
    }

    if let Err(e) = monitor.shutdown().await {
        warn!("Unclean shutdown: {}", e);
    }
    if let Some(err) = events.errors.recv().await {
        return Err(err).context("monitoring stopped");
    }
    Ok(())
}
