use thiserror::Error;

/// Errors surfaced by target expansion, request validation, and scan
/// execution.
///
/// Validation variants are resolved locally before any backend interaction
/// and never leave partial state behind. `Backend` carries the probing
/// layer's message verbatim; the orchestrator never retries on its own
/// (per-host retry is the backend's `count` parameter).
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid target spec: {0}")]
    InvalidTargetSpec(String),

    #[error("target set too large: {usable} usable hosts exceeds cap of {max}")]
    TargetSetTooLarge { usable: u64, max: u64 },

    #[error("resolved target set is empty")]
    EmptyTargetSet,

    #[error("invalid parameter `{field}`: {reason}")]
    InvalidParameter {
        field: &'static str,
        reason: &'static str,
    },

    #[error("backend failure: {0}")]
    Backend(String),

    #[error("scan cancelled")]
    Cancelled,
}
