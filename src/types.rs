use serde::{Deserialize, Serialize};

/// How the caller specified what to scan: a CIDR block or a free-form list
/// of host tokens (IP literals or hostnames).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSpec {
    Cidr(String),
    List(Vec<String>),
}

impl TargetSpec {
    /// Classify raw form text. Anything containing a `/` is treated as a
    /// CIDR; everything else is a token list to be split by the expander.
    pub fn parse(raw: &str) -> Self {
        let t = raw.trim();
        if t.contains('/') {
            TargetSpec::Cidr(t.to_string())
        } else {
            TargetSpec::List(vec![raw.to_string()])
        }
    }
}

/// Validated scan parameters handed to the probing backend.
///
/// `ordered` demands sequential input-order probing (deterministic
/// diagnostics); unordered scans let the backend shuffle for throughput.
/// `concurrency: None` leaves the worker pool size to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanConfig {
    pub targets: Vec<String>,
    pub hop_limit: u8,
    pub timeout_ms: u64,
    pub count: u32,
    pub payload: Option<String>,
    pub ordered: bool,
    pub concurrency: Option<usize>,
}

/// Periodic progress counters. `done` may appear to regress slightly under
/// out-of-order delivery; observers must tolerate that rather than treat it
/// as corruption.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressTick {
    pub done: u32,
    pub total: u32,
}

/// One host confirmed reachable, observed before the scan concludes.
/// Doubles as the accumulator row shape so swapping streamed rows for the
/// final report's rows does not change what a table renders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AliveEvent {
    pub ip_addr: String,
    pub hostname: Option<String>,
    pub rtt_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostRecord {
    pub ip_addr: String,
    pub hostname: Option<String>,
}

/// The authoritative outcome of one host scan. Supersedes all streamed
/// state for the same session once received.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub alive: Vec<(HostRecord, u64)>,
    pub unreachable: Vec<HostRecord>,
    pub total: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NeighborHost {
    pub ip_addr: String,
    pub mac_addr: Option<String>,
    pub vendor: Option<String>,
    pub rtt_ms: Option<u64>,
    pub tags: Vec<String>,
}

/// Authoritative outcome of a neighbor scan, obtained from the direct call's
/// return value; the event channel only signals lifecycle for this scan type.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeighborReport {
    pub neighbors: Vec<NeighborHost>,
    pub total: u32,
}

/// Events emitted by a backend while a scan call is outstanding. Best-effort
/// UI feed: correctness never depends on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanEvent {
    Started,
    Progress { done: u32, total: u32 },
    Alive(AliveEvent),
    Done(FinalReport),
}
