use serde::{Deserialize, Serialize};

use crate::error::ScanError;
use crate::expand::{expand, MAX_EXPAND};
use crate::types::{ScanConfig, TargetSpec};

/// Raw host-scan parameters as they arrive from a form or the HTTP API.
/// Defaults mirror the GUI form: 64 hops, 1s per-target timeout, one probe
/// per host, unordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostScanForm {
    /// CIDR (e.g. `192.168.1.0/24`) or a whitespace/comma/semicolon
    /// separated list of IPs and hostnames.
    pub target: String,
    #[serde(default = "default_hop_limit")]
    pub hop_limit: u8,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_count")]
    pub count: u32,
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub ordered: bool,
    #[serde(default)]
    pub concurrency: Option<usize>,
}

fn default_hop_limit() -> u8 {
    64
}

fn default_timeout_ms() -> u64 {
    1000
}

fn default_count() -> u32 {
    1
}

impl Default for HostScanForm {
    fn default() -> Self {
        Self {
            target: String::new(),
            hop_limit: default_hop_limit(),
            timeout_ms: default_timeout_ms(),
            count: default_count(),
            payload: None,
            ordered: false,
            concurrency: None,
        }
    }
}

/// Validate a form and assemble the request contract sent to the backend.
///
/// Fails fast before any network activity is requested: the probing path is
/// never invoked with an invalid configuration.
pub fn build(form: &HostScanForm) -> Result<ScanConfig, ScanError> {
    let spec = TargetSpec::parse(&form.target);
    let targets = expand(&spec, MAX_EXPAND)?;
    if targets.is_empty() {
        return Err(ScanError::EmptyTargetSet);
    }
    if form.hop_limit == 0 {
        return Err(ScanError::InvalidParameter {
            field: "hop_limit",
            reason: "must be between 1 and 255",
        });
    }
    if form.timeout_ms == 0 {
        return Err(ScanError::InvalidParameter {
            field: "timeout_ms",
            reason: "must be at least 1",
        });
    }
    if form.count == 0 {
        return Err(ScanError::InvalidParameter {
            field: "count",
            reason: "must be at least 1",
        });
    }
    if form.concurrency == Some(0) {
        return Err(ScanError::InvalidParameter {
            field: "concurrency",
            reason: "must be positive when set",
        });
    }

    Ok(ScanConfig {
        targets,
        hop_limit: form.hop_limit,
        timeout_ms: form.timeout_ms,
        count: form.count,
        payload: form.payload.clone(),
        ordered: form.ordered,
        concurrency: form.concurrency,
    })
}
