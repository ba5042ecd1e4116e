use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use time::{format_description::well_known, OffsetDateTime};

use webhelper_rs::types::ScanReport;
use webhelper_rs::{
    logging, ports, ClientConfig, PortResult, PortScanner, ScanConfig, Session, StatusEvent,
    StatusQuery,
};

/// webhelper-rs: find the local web helper and talk to it.
#[derive(Debug, Parser)]
#[command(
    name = "webhelper-rs",
    version,
    about = "Find the local web helper on its unpredictable port and query or control it.",
    long_about = None
)]
struct Cli {
    /// JSON file with client settings (token URL, origin, host suffix, ...).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Port of the web helper (overrides the config file).
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Debug logging on stderr.
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Probe a port range and list the ports the web helper answers on.
    Scan {
        /// Inclusive range, e.g. 3000-5000, or a single port.
        #[arg(long, default_value = "3000-5000")]
        range: String,

        /// Socket connect timeout in milliseconds.
        #[arg(long = "timeout-ms", default_value_t = 300)]
        timeout_ms: u64,

        /// Also list ports that are in use but not the web helper.
        #[arg(long, default_value_t = false)]
        all: bool,

        /// Host to probe instead of a generated local host name.
        #[arg(long)]
        host: Option<String>,

        /// Write results as pretty JSON to this path.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Wait for a status change (or the timeout) and print the snapshot.
    Status {
        /// Seconds the web helper may hold the request.
        #[arg(long)]
        return_after: Option<u32>,

        /// Comma-separated events that end the wait early.
        #[arg(long, value_delimiter = ',')]
        return_on: Option<Vec<StatusEvent>>,
    },
    Pause,
    Unpause,
    /// Play a track or context URI.
    Play { uri: String },
    /// Print a generated local host name.
    Hostname,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose);

    let mut config = match cli.config.as_deref() {
        Some(path) => ClientConfig::load(path)?,
        None => ClientConfig::default(),
    };
    if let Some(port) = cli.port {
        config.port = port;
    }

    match cli.command {
        Command::Scan {
            range,
            timeout_ms,
            all,
            host,
            output,
        } => {
            let (low, high) = ports::parse_port_range(&range)?;
            let mut scan = ScanConfig::range(low, high)
                .with_timeout(Duration::from_millis(timeout_ms))
                .include_errors(all);
            let host = host.unwrap_or_else(|| config.local_hostname());
            scan = scan.with_host(host.clone());

            let started_at = now_rfc3339();
            let scanner = PortScanner::new(config)?;
            let results = scanner.scan_ports(&scan).await.context("port scan failed")?;
            print_results_table(&results);

            if let Some(path) = output.as_deref() {
                let report = ScanReport {
                    host,
                    low_port: low,
                    high_port: high,
                    started_at,
                    results,
                };
                write_report_json(path, &report)
                    .with_context(|| format!("failed to write JSON to {}", path.display()))?;
                println!("Wrote JSON results to {}", path.display());
            }
        }
        Command::Status {
            return_after,
            return_on,
        } => {
            let session = Session::new(config)?;
            let query = StatusQuery {
                return_after,
                return_on,
            };
            let status = session.status(&query).await?;
            match status.now_playing() {
                Some(track) => println!("Currently playing: {track}"),
                None => println!("Nothing playing"),
            }
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Pause => print_json(&Session::new(config)?.pause().await?)?,
        Command::Unpause => print_json(&Session::new(config)?.unpause().await?)?,
        Command::Play { uri } => print_json(&Session::new(config)?.play(&uri).await?)?,
        Command::Hostname => println!("{}", config.local_hostname()),
    }

    Ok(())
}

fn print_results_table(results: &[PortResult]) {
    let port_w = 5usize.max("port".len());
    let status_w = "bad protocol response".len();

    let valid = results.iter().filter(|r| r.is_valid()).count();
    println!("\nWeb helper ports: {} (listed: {})", valid, results.len());
    println!(
        "{:>port_w$}  {:<status_w$}",
        "port",
        "status",
        port_w = port_w,
        status_w = status_w
    );
    println!(
        "{:-<port_w$}  {:-<status_w$}",
        "",
        "",
        port_w = port_w,
        status_w = status_w
    );
    for r in results {
        let status = r
            .error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "ok".to_string());
        println!(
            "{:>port_w$}  {:<status_w$}",
            r.port,
            status,
            port_w = port_w,
            status_w = status_w
        );
    }
}

fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn write_report_json(path: &Path, report: &ScanReport) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}

fn now_rfc3339() -> String {
    OffsetDateTime::now_utc()
        .format(&well_known::Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
