use serde::Serialize;

use crate::types::{AliveEvent, FinalReport, ProgressTick, ScanEvent};

/// Lifecycle of one scan session. `Running` is the only phase that accepts
/// events; every transition is total, so stray or re-ordered deliveries are
/// ignored instead of panicking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Running => "running",
            Phase::Completed => "completed",
            Phase::Failed => "failed",
            Phase::Cancelled => "cancelled",
        }
    }
}

/// The single coherent view of scan state: progress counters, the streamed
/// alive rows, and the eventual authoritative report.
///
/// Owned exclusively by one session; the transitions here are pure functions
/// over `(state, event)` so tests can drive them directly. Streamed events
/// exist purely for responsiveness during a long scan — correctness never
/// depends on them, only on `on_done`.
#[derive(Debug, Clone, Serialize)]
pub struct SessionState {
    pub phase: Phase,
    pub progress: ProgressTick,
    pub rows: Vec<AliveEvent>,
    pub report: Option<FinalReport>,
    pub error: Option<String>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            progress: ProgressTick::default(),
            rows: Vec::new(),
            report: None,
            error: None,
        }
    }

    pub fn running(&self) -> bool {
        self.phase == Phase::Running
    }

    /// Begin a scan: reset counters and accumulated rows, clear any previous
    /// report or error.
    pub fn start(&mut self) {
        self.phase = Phase::Running;
        self.progress = ProgressTick::default();
        self.rows.clear();
        self.report = None;
        self.error = None;
    }

    /// Replace progress verbatim — last write wins. Progress events may
    /// arrive out of the backend's internal batching order, so `done` can
    /// legitimately appear to regress; do not "fix" it with monotonicity.
    pub fn on_progress(&mut self, tick: ProgressTick) {
        if self.running() {
            self.progress = tick;
        }
    }

    /// Append a streamed alive row. Duplicates are kept: a host may be
    /// reported more than once across retries, and the final report — not
    /// the stream — is authoritative for the deduplicated set.
    pub fn on_alive(&mut self, ev: AliveEvent) {
        if self.running() {
            self.rows.push(ev);
        }
    }

    /// Wholesale replace with the authoritative report: the streamed
    /// accumulator is discarded and the report's alive list substituted in
    /// the same row shape. Final state is therefore independent of lost,
    /// re-ordered, or duplicated stream events.
    pub fn on_done(&mut self, report: FinalReport) {
        if !self.running() {
            return;
        }
        self.rows = report
            .alive
            .iter()
            .map(|(host, rtt)| AliveEvent {
                ip_addr: host.ip_addr.clone(),
                hostname: host.hostname.clone(),
                rtt_ms: Some(*rtt),
            })
            .collect();
        self.progress = ProgressTick {
            done: report.total,
            total: report.total,
        };
        self.report = Some(report);
        self.phase = Phase::Completed;
    }

    /// Signal-only completion, used by scans whose authoritative report is
    /// the direct call's return value (neighbor scans).
    pub fn finish(&mut self) {
        if self.running() {
            self.phase = Phase::Completed;
        }
    }

    /// The scan call failed. Partial rows are retained for operator
    /// visibility; `report` stays absent.
    pub fn on_error(&mut self, message: &str) {
        if self.running() {
            self.phase = Phase::Failed;
            self.error = Some(message.to_string());
        }
    }

    /// Best-effort cancellation: same retention policy as `on_error`.
    pub fn on_cancel(&mut self) {
        if self.running() {
            self.phase = Phase::Cancelled;
        }
    }

    /// Apply one streamed event. `Started` is a lifecycle signal with no
    /// state of its own; a streamed `Done` completes the session early and
    /// the later return-value application becomes a no-op.
    pub fn apply(&mut self, event: ScanEvent) {
        match event {
            ScanEvent::Started => {}
            ScanEvent::Progress { done, total } => self.on_progress(ProgressTick { done, total }),
            ScanEvent::Alive(ev) => self.on_alive(ev),
            ScanEvent::Done(report) => self.on_done(report),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::HostRecord;

    fn alive(ip: &str) -> AliveEvent {
        AliveEvent {
            ip_addr: ip.to_string(),
            hostname: None,
            rtt_ms: None,
        }
    }

    fn report() -> FinalReport {
        FinalReport {
            alive: vec![(
                HostRecord {
                    ip_addr: "10.0.0.5".into(),
                    hostname: None,
                },
                12,
            )],
            unreachable: vec![HostRecord {
                ip_addr: "10.0.0.6".into(),
                hostname: None,
            }],
            total: 10,
        }
    }

    fn running_state() -> SessionState {
        let mut st = SessionState::new();
        st.start();
        st
    }

    #[test]
    fn start_resets_everything() {
        let mut st = running_state();
        st.on_alive(alive("10.0.0.1"));
        st.on_done(report());

        st.start();
        assert_eq!(st.phase, Phase::Running);
        assert_eq!(st.progress, ProgressTick::default());
        assert!(st.rows.is_empty());
        assert!(st.report.is_none());
        assert!(st.error.is_none());
    }

    #[test]
    fn progress_is_last_write_wins_even_on_regression() {
        let mut st = running_state();
        st.on_progress(ProgressTick { done: 7, total: 10 });
        st.on_progress(ProgressTick { done: 3, total: 10 });
        assert_eq!(st.progress, ProgressTick { done: 3, total: 10 });
    }

    #[test]
    fn alive_rows_are_not_deduplicated() {
        let mut st = running_state();
        st.on_alive(alive("10.0.0.5"));
        st.on_alive(alive("10.0.0.5"));
        assert_eq!(st.rows.len(), 2);
    }

    #[test]
    fn done_wholesale_replaces_streamed_rows() {
        let mut st = running_state();
        st.on_alive(alive("10.0.0.5"));
        st.on_alive(alive("10.0.0.9"));
        st.on_done(report());

        assert_eq!(st.phase, Phase::Completed);
        assert!(!st.running());
        assert_eq!(st.rows.len(), 1);
        assert_eq!(st.rows[0].ip_addr, "10.0.0.5");
        assert_eq!(st.rows[0].rtt_ms, Some(12));
        assert_eq!(st.progress, ProgressTick { done: 10, total: 10 });
        assert_eq!(st.report.as_ref().unwrap().unreachable.len(), 1);
    }

    #[test]
    fn events_in_any_order_end_in_the_report_implied_state() {
        // Every interleaving of two alives, one progress tick, and the done
        // event must converge on the same final state, including done first.
        let events = [
            ScanEvent::Alive(alive("10.0.0.5")),
            ScanEvent::Progress { done: 3, total: 10 },
            ScanEvent::Alive(alive("10.0.0.7")),
            ScanEvent::Done(report()),
        ];
        let mut order: Vec<usize> = (0..events.len()).collect();

        // Heap's algorithm, iterative: visit all permutations of the indices.
        let n = order.len();
        let mut c = vec![0usize; n];
        let check = |idx: &[usize]| {
            let mut st = running_state();
            for &i in idx {
                st.apply(events[i].clone());
            }
            assert_eq!(st.phase, Phase::Completed);
            assert_eq!(st.report.as_ref().unwrap(), &report());
            assert_eq!(st.rows.len(), 1);
            assert_eq!(st.rows[0].ip_addr, "10.0.0.5");
        };
        check(&order);
        let mut i = 0;
        while i < n {
            if c[i] < i {
                if i % 2 == 0 {
                    order.swap(0, i);
                } else {
                    order.swap(c[i], i);
                }
                check(&order);
                c[i] += 1;
                i = 0;
            } else {
                c[i] = 0;
                i += 1;
            }
        }
    }

    #[test]
    fn error_retains_rows_and_leaves_report_absent() {
        let mut st = running_state();
        st.on_alive(alive("10.0.0.5"));
        st.on_error("socket: permission denied");

        assert_eq!(st.phase, Phase::Failed);
        assert_eq!(st.rows.len(), 1);
        assert!(st.report.is_none());
        assert_eq!(st.error.as_deref(), Some("socket: permission denied"));
    }

    #[test]
    fn cancel_retains_rows() {
        let mut st = running_state();
        st.on_alive(alive("10.0.0.5"));
        st.on_cancel();

        assert_eq!(st.phase, Phase::Cancelled);
        assert_eq!(st.rows.len(), 1);
        assert!(st.report.is_none());
    }

    #[test]
    fn events_outside_running_are_ignored() {
        let mut st = running_state();
        st.on_done(report());

        st.on_alive(alive("10.0.0.99"));
        st.on_progress(ProgressTick { done: 1, total: 2 });
        st.on_error("late failure");
        assert_eq!(st.phase, Phase::Completed);
        assert_eq!(st.rows.len(), 1);
        assert!(st.error.is_none());
    }

    #[test]
    fn finish_completes_without_a_report() {
        let mut st = running_state();
        st.on_progress(ProgressTick { done: 5, total: 5 });
        st.finish();
        assert_eq!(st.phase, Phase::Completed);
        assert!(st.report.is_none());
    }
}
