use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::backend::{EventSink, ScanBackend};
use crate::error::ScanError;
use crate::reconcile::SessionState;
use crate::request::{build, HostScanForm};
use crate::types::{FinalReport, NeighborReport, ScanEvent};

/// Orchestrates one scan attempt end-to-end: validates the request,
/// subscribes to the event stream *before* issuing the backend call, applies
/// events one at a time in arrival order, and feeds the call's resolution
/// into the reconciler exactly once.
///
/// State is mutated only by this single event-handling path; observers (the
/// HTTP API, the CLI) take read locks on the shared handle. A second scan
/// must not be started on the same session while one is running — callers
/// disable the trigger until `running` is false; this is a usage
/// precondition, not enforced here.
pub struct ScanSession {
    backend: Arc<dyn ScanBackend>,
    state: Arc<RwLock<SessionState>>,
    cancel: CancellationToken,
}

impl ScanSession {
    /// Create a session with a fresh, idle state.
    pub fn new(backend: Arc<dyn ScanBackend>) -> Self {
        Self {
            backend,
            state: Arc::new(RwLock::new(SessionState::new())),
            cancel: CancellationToken::new(),
        }
    }

    /// Shared read handle to the session state, for observers polling
    /// progress and rows while the scan is outstanding.
    pub fn state(&self) -> Arc<RwLock<SessionState>> {
        self.state.clone()
    }

    /// Token that cancels this session. Cancellation is best effort: work
    /// already in flight on the backend may complete, and its result is
    /// discarded by the detached session.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run one host scan to completion.
    ///
    /// Validation failures surface immediately without contacting the
    /// backend. On every exit path — completion, backend failure, or
    /// cancellation — the event subscription is dropped and the state is
    /// left not-running.
    pub async fn run_host_scan(&self, form: &HostScanForm) -> Result<FinalReport, ScanError> {
        let config = build(form)?;
        debug!(targets = config.targets.len(), ordered = config.ordered, "starting host scan");

        // Subscribe before issuing the call: the backend may emit events
        // immediately, and a listener attached afterwards would lose them.
        let (sink, mut rx) = EventSink::channel();
        self.state.write().await.start();

        let backend = self.backend.clone();
        let call_cancel = self.cancel.clone();
        let call_config = config.clone();
        let mut call = tokio::spawn(async move {
            backend.host_scan(call_config, sink, call_cancel).await
        });

        let mut stream_open = true;
        loop {
            tokio::select! {
                ev = rx.recv(), if stream_open => match ev {
                    Some(ev) => self.state.write().await.apply(ev),
                    // Backend dropped its sink; keep waiting for the call.
                    None => stream_open = false,
                },
                res = &mut call => {
                    rx.close();
                    let mut st = self.state.write().await;
                    return match res {
                        Ok(Ok(report)) => {
                            st.on_done(report.clone());
                            Ok(report)
                        }
                        Ok(Err(err)) => {
                            let message = err.to_string();
                            st.on_error(&message);
                            Err(ScanError::Backend(message))
                        }
                        Err(join_err) => {
                            let message = join_err.to_string();
                            st.on_error(&message);
                            Err(ScanError::Backend(message))
                        }
                    };
                }
                _ = self.cancel.cancelled() => {
                    rx.close();
                    call.abort();
                    self.state.write().await.on_cancel();
                    return Err(ScanError::Cancelled);
                }
            }
        }
    }

    /// Run one neighbor scan against a local segment. Same reconciliation
    /// pattern as the host scan, but the event channel carries lifecycle
    /// signals only and the report comes from the call's return value.
    pub async fn run_neighbor_scan(
        &self,
        interface_name: Option<String>,
    ) -> Result<NeighborReport, ScanError> {
        let (sink, mut rx) = EventSink::channel();
        self.state.write().await.start();

        let backend = self.backend.clone();
        let call_cancel = self.cancel.clone();
        let mut call = tokio::spawn(async move {
            backend.neighbor_scan(interface_name, sink, call_cancel).await
        });

        let mut stream_open = true;
        loop {
            tokio::select! {
                ev = rx.recv(), if stream_open => match ev {
                    Some(ScanEvent::Done(_)) => {}
                    Some(ev) => self.state.write().await.apply(ev),
                    None => stream_open = false,
                },
                res = &mut call => {
                    rx.close();
                    let mut st = self.state.write().await;
                    return match res {
                        Ok(Ok(report)) => {
                            st.finish();
                            Ok(report)
                        }
                        Ok(Err(err)) => {
                            let message = err.to_string();
                            st.on_error(&message);
                            Err(ScanError::Backend(message))
                        }
                        Err(join_err) => {
                            let message = join_err.to_string();
                            st.on_error(&message);
                            Err(ScanError::Backend(message))
                        }
                    };
                }
                _ = self.cancel.cancelled() => {
                    rx.close();
                    call.abort();
                    self.state.write().await.on_cancel();
                    return Err(ScanError::Cancelled);
                }
            }
        }
    }
}
