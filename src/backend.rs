use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::types::{AliveEvent, FinalReport, NeighborReport, ScanConfig, ScanEvent};

/// Handle a backend uses to stream events while a scan call is outstanding.
///
/// Sends are fire-and-forget: once the session has detached (completed,
/// failed, or cancelled) the receiver is gone and events are simply dropped,
/// which is the documented best-effort contract for the stream.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ScanEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ScanEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink together with its receiving half. The receiver must
    /// exist before the scan call is issued so early events are not lost.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ScanEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: ScanEvent) {
        let _ = self.tx.send(event);
    }

    pub fn started(&self) {
        self.emit(ScanEvent::Started);
    }

    pub fn progress(&self, done: u32, total: u32) {
        self.emit(ScanEvent::Progress { done, total });
    }

    pub fn alive(&self, ev: AliveEvent) {
        self.emit(ScanEvent::Alive(ev));
    }

    pub fn done(&self, report: FinalReport) {
        self.emit(ScanEvent::Done(report));
    }
}

/// The probing layer behind the orchestrator. Implementations own the actual
/// fan-out across hosts (worker pool bounded by `config.concurrency`) and
/// may run for seconds to minutes; the orchestrator stays responsive by
/// consuming the event stream while the call is outstanding.
///
/// Cancellation is best effort: an implementation should observe `cancel`
/// and wind down early, but a result produced after the session detached is
/// simply discarded.
#[async_trait]
pub trait ScanBackend: Send + Sync {
    /// Probe every target in `config`, emitting `Alive` and throttled
    /// `Progress` events along the way, and return the authoritative report.
    async fn host_scan(
        &self,
        config: ScanConfig,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<FinalReport>;

    /// Discover hosts on one local network segment. Lifecycle is signalled
    /// on the event channel (`Started`, progress); the authoritative report
    /// is this call's return value only.
    async fn neighbor_scan(
        &self,
        interface_name: Option<String>,
        events: EventSink,
        cancel: CancellationToken,
    ) -> Result<NeighborReport>;
}
