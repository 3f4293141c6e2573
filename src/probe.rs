use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use rand::seq::SliceRandom;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{EventSink, ScanBackend};
use crate::netdetect;
use crate::types::{
    AliveEvent, FinalReport, HostRecord, NeighborHost, NeighborReport, ScanConfig,
};

/// Worker pool size when the request leaves `concurrency` unset.
pub const DEFAULT_CONCURRENCY: usize = 256;

const MAX_CONCURRENCY: usize = 5_000;

/// Ports whose connect outcome signals a live host. A completed handshake or
/// an active refusal both prove a reachable stack; only silence counts
/// against the host.
const SIGNAL_PORTS: &[u16] = &[80, 443, 22, 445, 3389, 8080];

/// Throttles high-frequency progress updates from probe workers: emit on
/// ~1% steps or after a minimum interval, and always let the final event
/// through.
#[derive(Debug)]
pub struct ProgressGate {
    total: u32,
    done: AtomicU32,
    last_emitted: AtomicU32,
    last_emit_at: Mutex<Instant>,
    min_interval: Duration,
    step: u32,
}

impl ProgressGate {
    pub fn new(total: u32) -> Self {
        // Roughly 1% resolution; step must never be zero.
        let step = (total / 100).max(1);
        Self {
            total,
            done: AtomicU32::new(0),
            last_emitted: AtomicU32::new(0),
            last_emit_at: Mutex::new(Instant::now()),
            min_interval: Duration::from_millis(80),
            step,
        }
    }

    /// Mark one target as finished; returns the new count and whether the
    /// caller should emit a progress event for it.
    pub fn on_advance(&self) -> (u32, bool) {
        let done = self.done.fetch_add(1, Ordering::Relaxed) + 1;

        if done >= self.total {
            self.last_emitted.store(done, Ordering::Relaxed);
            return (done, true);
        }

        let last = self.last_emitted.load(Ordering::Relaxed);
        let advanced_enough = done.saturating_sub(last) >= self.step;

        let mut last_ts = self
            .last_emit_at
            .lock()
            .expect("ProgressGate::last_emit_at poisoned");
        let time_ok = last_ts.elapsed() >= self.min_interval;

        let should_emit = advanced_enough || time_ok;
        if should_emit {
            self.last_emitted.store(done, Ordering::Relaxed);
            *last_ts = Instant::now();
        }

        (done, should_emit)
    }
}

/// Built-in probing backend using plain TCP connects — no raw sockets.
///
/// `hop_limit` and `payload` ride through the config for raw-socket
/// backends; shaping SYN TTL or ICMP payloads is not possible here and is
/// not pretended.
#[derive(Debug, Clone)]
pub struct ConnectProbe {
    signal_ports: Vec<u16>,
}

impl Default for ConnectProbe {
    fn default() -> Self {
        Self {
            signal_ports: SIGNAL_PORTS.to_vec(),
        }
    }
}

impl ConnectProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Probe against a custom port set instead of the default signal ports.
    pub fn with_ports(ports: Vec<u16>) -> Self {
        Self { signal_ports: ports }
    }

    async fn run_sweep(
        &self,
        config: &ScanConfig,
        events: &EventSink,
        cancel: &CancellationToken,
    ) -> Result<FinalReport> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let count = config.count.max(1);
        let concurrency = config
            .concurrency
            .unwrap_or(DEFAULT_CONCURRENCY)
            .clamp(1, MAX_CONCURRENCY);

        let (mut targets, unresolved) = resolve_targets(&config.targets).await;
        if !config.ordered {
            targets.shuffle(&mut rand::rng());
        }

        let total = (targets.len() + unresolved.len()) as u32;
        let gate = Arc::new(ProgressGate::new(total));
        debug!(total, concurrency, ordered = config.ordered, "connect sweep starting");

        // Tokens that never resolved count as finished immediately.
        for _ in &unresolved {
            let (done, should_emit) = gate.on_advance();
            if should_emit {
                events.progress(done, total);
            }
        }

        let sem = Arc::new(Semaphore::new(concurrency));
        let mut set = JoinSet::new();

        for (ip, record) in targets {
            if cancel.is_cancelled() {
                break;
            }
            let permit = sem.clone().acquire_owned().await?;
            let events = events.clone();
            let gate = gate.clone();
            let cancel = cancel.clone();
            let ports = self.signal_ports.clone();

            set.spawn(async move {
                let _permit = permit; // keep permit until the probe completes

                let rtt = if cancel.is_cancelled() {
                    None
                } else {
                    probe_host(ip, &ports, timeout, count, &cancel).await
                };

                if let Some(rtt) = rtt {
                    events.alive(AliveEvent {
                        ip_addr: record.ip_addr.clone(),
                        hostname: record.hostname.clone(),
                        rtt_ms: Some(rtt),
                    });
                }

                let (done, should_emit) = gate.on_advance();
                if should_emit {
                    events.progress(done, total);
                }

                (record, rtt)
            });
        }

        let mut alive: Vec<(HostRecord, u64)> = Vec::new();
        let mut unreachable: Vec<HostRecord> = unresolved;
        while let Some(joined) = set.join_next().await {
            if let Ok((record, rtt)) = joined {
                match rtt {
                    Some(rtt) => alive.push((record, rtt)),
                    None => unreachable.push(record),
                }
            }
        }

        Ok(FinalReport {
            alive,
            unreachable,
            total,
        })
    }
}

#[async_trait]
impl ScanBackend for ConnectProbe {
    async fn host_scan(
        &self,
        config: ScanConfig,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<FinalReport> {
        events.started();
        let report = self.run_sweep(&config, &events, &cancel).await?;
        events.done(report.clone());
        Ok(report)
    }

    async fn neighbor_scan(
        &self,
        interface_name: Option<String>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<NeighborReport> {
        let (iface, ip) = netdetect::pick_ipv4_interface(interface_name.as_deref())?;
        let net = netdetect::ipv4_to_default_cidr(ip);
        debug!(iface = %iface, net = %net, "neighbor sweep");

        let config = ScanConfig {
            targets: net.hosts().map(|h| h.to_string()).collect(),
            hop_limit: 64,
            timeout_ms: 1000,
            count: 1,
            payload: Some("ns:neigh".to_string()),
            ordered: true,
            concurrency: Some(100),
        };

        events.started();
        let report = self.run_sweep(&config, &events, &cancel).await?;

        // MAC/vendor enrichment needs link-layer access and stays with
        // external backends; the row shape still matches the contract.
        let neighbors: Vec<NeighborHost> = report
            .alive
            .into_iter()
            .map(|(host, rtt)| NeighborHost {
                ip_addr: host.ip_addr,
                mac_addr: None,
                vendor: None,
                rtt_ms: Some(rtt),
                tags: Vec::new(),
            })
            .collect();
        let total = report.total;

        Ok(NeighborReport { neighbors, total })
    }
}

/// Partition raw target tokens into probeable `(ip, record)` pairs and
/// tokens that never resolved. IP literals skip DNS entirely and keep no
/// hostname (reverse lookups are expensive and noisy); name tokens keep
/// their name on the record. Duplicate IPs are dropped, first token wins.
async fn resolve_targets(tokens: &[String]) -> (Vec<(IpAddr, HostRecord)>, Vec<HostRecord>) {
    let mut seen = std::collections::HashSet::new();
    let mut resolved: Vec<(IpAddr, HostRecord)> = Vec::new();
    let mut unresolved: Vec<HostRecord> = Vec::new();

    for token in tokens {
        if let Ok(ip) = token.parse::<IpAddr>() {
            if seen.insert(ip) {
                resolved.push((
                    ip,
                    HostRecord {
                        ip_addr: token.clone(),
                        hostname: None,
                    },
                ));
            }
            continue;
        }

        match tokio::net::lookup_host((token.as_str(), 0u16)).await {
            Ok(mut addrs) => match addrs.next() {
                Some(addr) => {
                    let ip = addr.ip();
                    if seen.insert(ip) {
                        resolved.push((
                            ip,
                            HostRecord {
                                ip_addr: ip.to_string(),
                                hostname: Some(token.clone()),
                            },
                        ));
                    }
                }
                None => unresolved.push(HostRecord {
                    ip_addr: token.clone(),
                    hostname: None,
                }),
            },
            Err(_) => unresolved.push(HostRecord {
                ip_addr: token.clone(),
                hostname: None,
            }),
        }
    }

    (resolved, unresolved)
}

/// Probe one host: up to `count` passes over the signal ports, bounding each
/// connect with `timeout`. A completed connect or an active refusal proves
/// the host; returns the elapsed time of the proving attempt.
async fn probe_host(
    ip: IpAddr,
    ports: &[u16],
    timeout: Duration,
    count: u32,
    cancel: &CancellationToken,
) -> Option<u64> {
    for _attempt in 0..count {
        for &port in ports {
            if cancel.is_cancelled() {
                return None;
            }
            let addr = SocketAddr::new(ip, port);
            let start = Instant::now();
            match time::timeout(timeout, TcpStream::connect(addr)).await {
                Ok(Ok(_stream)) => {
                    return Some(start.elapsed().as_millis() as u64);
                }
                Ok(Err(e)) if e.kind() == io::ErrorKind::ConnectionRefused => {
                    // RST came back: nothing listening, but the stack is up.
                    return Some(start.elapsed().as_millis() as u64);
                }
                _ => {
                    // Timed out or unreachable; try the next port / pass.
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gate_always_emits_the_final_tick() {
        let gate = ProgressGate::new(3);
        gate.on_advance();
        gate.on_advance();
        let (done, emit) = gate.on_advance();
        assert_eq!(done, 3);
        assert!(emit);
    }

    #[test]
    fn gate_skips_intermediate_ticks_within_step_and_interval() {
        let gate = ProgressGate::new(1000);
        // Step is 10; the first few advances fall inside both the step and
        // the 80ms interval, so at most the very first (interval not yet
        // started) can emit.
        let mut emitted = 0;
        for _ in 0..5 {
            if gate.on_advance().1 {
                emitted += 1;
            }
        }
        assert!(emitted <= 1);
    }

    #[tokio::test]
    async fn ip_literals_resolve_without_dns() {
        let (resolved, unresolved) = resolve_targets(&["127.0.0.1".to_string()]).await;
        assert_eq!(resolved.len(), 1);
        assert!(unresolved.is_empty());
        assert_eq!(resolved[0].0, "127.0.0.1".parse::<IpAddr>().unwrap());
        assert!(resolved[0].1.hostname.is_none());
    }

    #[tokio::test]
    async fn duplicate_ips_keep_the_first_token() {
        let (resolved, _) =
            resolve_targets(&["10.0.0.1".to_string(), "10.0.0.1".to_string()]).await;
        assert_eq!(resolved.len(), 1);
    }

    #[tokio::test]
    async fn refused_connect_counts_as_alive() {
        // Bind and drop a listener so the port is very likely closed, then
        // probe it: loopback answers with RST, which proves liveness.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let cancel = CancellationToken::new();
        let rtt = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[port],
            Duration::from_millis(500),
            1,
            &cancel,
        )
        .await;
        assert!(rtt.is_some());
    }

    #[tokio::test]
    async fn cancelled_probe_reports_nothing() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let rtt = probe_host(
            "127.0.0.1".parse().unwrap(),
            &[80],
            Duration::from_millis(100),
            1,
            &cancel,
        )
        .await;
        assert!(rtt.is_none());
    }
}
