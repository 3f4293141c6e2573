use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use netsweep_rs::probe::ConnectProbe;
use netsweep_rs::request::HostScanForm;
use netsweep_rs::session::ScanSession;
use netsweep_rs::types::{FinalReport, NeighborReport};
use netsweep_rs::{netdetect, server};

/// netsweep-rs — concurrent IPv4 host-discovery scanner with a tiny embedded web UI.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "netsweep-rs",
    version,
    about = "Concurrent IPv4 host-discovery scanner with a tiny embedded web UI.",
    long_about = None
)]
struct Cli {
    /// CIDR (e.g., 192.168.1.0/24) or comma/space separated hosts. If omitted, auto-detect the local /24.
    #[arg(long)]
    targets: Option<String>,

    /// Max TTL / hop limit carried to the probing backend.
    #[arg(long = "hop-limit", default_value_t = 64)]
    hop_limit: u8,

    /// Per-target probe timeout in milliseconds.
    #[arg(long = "timeout-ms", default_value_t = 1000)]
    timeout_ms: u64,

    /// Probe attempts per host before declaring it unreachable.
    #[arg(long, default_value_t = 1)]
    count: u32,

    /// Optional payload tag for backends that can carry one.
    #[arg(long)]
    payload: Option<String>,

    /// Probe targets sequentially in input order instead of shuffled.
    #[arg(long, default_value_t = false)]
    ordered: bool,

    /// Max concurrent in-flight probes (backend default if omitted).
    #[arg(long)]
    concurrency: Option<usize>,

    /// Scan the local segment of this interface (or the default one) instead of hosts.
    #[arg(long, num_args = 0..=1, default_missing_value = "")]
    neighbors: Option<String>,

    /// Write the final report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Start the embedded HTTP UI server instead of a one-shot scan.
    #[arg(long = "serve-ui", default_value_t = false)]
    serve_ui: bool,

    /// Bind address for the embedded UI server.
    #[arg(long, default_value = "127.0.0.1:8080")]
    bind: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let backend = Arc::new(ConnectProbe::new());

    if cli.serve_ui {
        println!("UI server starting at http://{} (Ctrl+C to stop)", cli.bind);
        return server::spawn_server(&cli.bind, backend).await;
    }

    if let Some(iface) = cli.neighbors.as_deref() {
        let iface = (!iface.is_empty()).then(|| iface.to_string());
        let session = ScanSession::new(backend);
        let report = session.run_neighbor_scan(iface).await?;
        print_neighbor_table(&report);
        if let Some(path) = cli.output.as_deref() {
            write_json(path, &report)?;
            println!("Wrote JSON report to {}", path.display());
        }
        return Ok(());
    }

    let target = match cli.targets.clone() {
        Some(t) => t,
        None => {
            let cidrs = netdetect::detect_local_cidrs()?;
            let first = cidrs
                .first()
                .ok_or_else(|| anyhow::anyhow!("no local IPv4 network detected"))?;
            println!("Detected local IPv4 CIDRs:");
            for cidr in &cidrs {
                println!("  - {cidr}");
            }
            first.to_string()
        }
    };

    let form = HostScanForm {
        target,
        hop_limit: cli.hop_limit,
        timeout_ms: cli.timeout_ms,
        count: cli.count,
        payload: cli.payload.clone(),
        ordered: cli.ordered,
        concurrency: cli.concurrency,
    };

    println!("netsweep-rs configuration:");
    println!("  targets      : {}", form.target);
    println!("  hop_limit    : {}", form.hop_limit);
    println!("  timeout_ms   : {}", form.timeout_ms);
    println!("  count        : {}", form.count);
    println!("  ordered      : {}", form.ordered);
    println!(
        "  concurrency  : {}",
        form.concurrency
            .map(|c| c.to_string())
            .unwrap_or_else(|| "<backend default>".to_string())
    );

    let session = ScanSession::new(backend);
    let report = session.run_host_scan(&form).await?;
    print_report_table(&report);

    if let Some(path) = cli.output.as_deref() {
        write_json(path, &report)?;
        println!("Wrote JSON report to {}", path.display());
    }

    Ok(())
}

fn print_report_table(report: &FinalReport) {
    let mut ip_w = "ip".len();
    let mut name_w = "hostname".len();
    for (host, _) in &report.alive {
        ip_w = ip_w.max(host.ip_addr.len());
        if let Some(name) = &host.hostname {
            name_w = name_w.max(name.len().min(40));
        }
    }
    let rtt_w = "rtt_ms".len();

    println!(
        "\nAlive: {} of {} (unreachable: {})",
        report.alive.len(),
        report.total,
        report.unreachable.len()
    );
    println!(
        "{:<ip_w$}  {:>rtt_w$}  {:<name_w$}",
        "ip",
        "rtt_ms",
        "hostname",
        ip_w = ip_w,
        rtt_w = rtt_w,
        name_w = name_w
    );
    println!(
        "{:-<ip_w$}  {:-<rtt_w$}  {:-<name_w$}",
        "",
        "",
        "",
        ip_w = ip_w,
        rtt_w = rtt_w,
        name_w = name_w
    );
    for (host, rtt) in &report.alive {
        let mut name = host.hostname.clone().unwrap_or_default();
        if name.len() > 40 {
            name.truncate(40);
        }
        println!(
            "{:<ip_w$}  {:>rtt_w$}  {:<name_w$}",
            host.ip_addr,
            rtt,
            name,
            ip_w = ip_w,
            rtt_w = rtt_w,
            name_w = name_w
        );
    }
}

fn print_neighbor_table(report: &NeighborReport) {
    println!(
        "\nNeighbors: {} of {} probed",
        report.neighbors.len(),
        report.total
    );
    for n in &report.neighbors {
        let rtt = n
            .rtt_ms
            .map(|r| format!("{r}ms"))
            .unwrap_or_else(|| "-".to_string());
        let mac = n.mac_addr.clone().unwrap_or_else(|| "-".to_string());
        println!("  {:<15}  {:>6}  {}", n.ip_addr, rtt, mac);
    }
}

fn write_json<T: serde::Serialize>(path: &std::path::Path, value: &T) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}
