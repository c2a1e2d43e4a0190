// Per-view connection state: reconciler, closed ledger and refresh gate

use crate::connection::ConnectionView;
use crate::filter::filter_connections;
use crate::gate::{RefreshGate, RefreshState};
use crate::ledger::ClosedLedger;
use crate::reconcile::Reconciler;
use crate::snapshot::Snapshot;
use std::sync::Arc;

/// What a tick did to the externally visible state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Previous and new snapshot were both empty: nothing to redraw
    Unchanged,
    /// The active view was replaced with this tick's result
    Published { closed: usize },
    /// Refresh is paused; bookkeeping advanced but the active view is frozen
    Suppressed { closed: usize },
}

impl TickOutcome {
    pub fn is_update(&self) -> bool {
        !matches!(self, TickOutcome::Unchanged)
    }
}

/// Proxy-wide byte totals from the most recent snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub upload: u64,
    pub download: u64,
}

/// Connection state for one viewing session. History lives until this is dropped.
#[derive(Debug, Default)]
pub struct ConnectionSession {
    reconciler: Reconciler,
    ledger: ClosedLedger,
    gate: RefreshGate,
    published: Arc<Vec<ConnectionView>>,
    totals: Totals,
    ticks: u64,
}

impl ConnectionSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Process one decoded snapshot to completion
    pub fn ingest(&mut self, snapshot: Snapshot) -> TickOutcome {
        self.ticks += 1;

        if let Some(upload) = snapshot.upload_total {
            self.totals.upload = upload;
        }
        if let Some(download) = snapshot.download_total {
            self.totals.download = download;
        }

        let result = self.reconciler.reconcile(&snapshot.connections);
        let closed = result.newly_closed.len();
        self.ledger.append(result.newly_closed);

        if !result.changed {
            log::trace!("Tick {}: no connections before or after", self.ticks);
            return TickOutcome::Unchanged;
        }

        if self.gate.is_live() {
            self.published = result.next_active;
            log::trace!(
                "Tick {}: published {} active, {} closed",
                self.ticks,
                self.published.len(),
                closed
            );
            TickOutcome::Published { closed }
        } else {
            log::trace!("Tick {}: paused, {} closed", self.ticks, closed);
            TickOutcome::Suppressed { closed }
        }
    }

    /// Visible active connections matching `keyword`
    pub fn active_view(&self, keyword: &str) -> Vec<&ConnectionView> {
        filter_connections(self.published.iter(), keyword)
    }

    /// Closed connections matching `keyword`, most recently closed first
    pub fn closed_view(&self, keyword: &str) -> Vec<&ConnectionView> {
        filter_connections(self.ledger.iter(), keyword)
    }

    pub fn refresh_state(&self) -> RefreshState {
        self.gate.state()
    }

    /// Flip pause/resume. Resuming publishes the latest reconciled set immediately.
    pub fn toggle_refresh(&mut self) -> RefreshState {
        let state = self.gate.toggle();
        if state == RefreshState::Live {
            self.published = Arc::clone(self.reconciler.previous());
        }
        state
    }

    pub fn totals(&self) -> Totals {
        self.totals
    }

    pub fn active_count(&self) -> usize {
        self.published.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionSnapshot;
    use crate::connection::tests::record;
    use crate::ledger::MAX_CLOSED_CONNECTIONS;

    fn snapshot(connections: Vec<ConnectionSnapshot>) -> Snapshot {
        Snapshot {
            download_total: None,
            upload_total: None,
            connections,
        }
    }

    fn ids(views: Vec<&ConnectionView>) -> Vec<String> {
        views.into_iter().map(|v| v.id.clone()).collect()
    }

    #[test]
    fn test_empty_empty_is_no_update() {
        let mut session = ConnectionSession::new();
        let outcome = session.ingest(snapshot(vec![]));

        assert_eq!(outcome, TickOutcome::Unchanged);
        assert!(!outcome.is_update());
        assert!(session.active_view("").is_empty());
        assert!(session.closed_view("").is_empty());
    }

    #[test]
    fn test_publish_and_close() {
        let mut session = ConnectionSession::new();
        session.ingest(snapshot(vec![record("a", 1, 1), record("b", 1, 1)]));

        let outcome = session.ingest(snapshot(vec![record("b", 3, 3)]));
        assert_eq!(outcome, TickOutcome::Published { closed: 1 });
        assert_eq!(ids(session.active_view("")), vec!["b"]);
        assert_eq!(ids(session.closed_view("")), vec!["a"]);

        // Last connection closes: still an update
        let outcome = session.ingest(snapshot(vec![]));
        assert_eq!(outcome, TickOutcome::Published { closed: 1 });
        assert!(session.active_view("").is_empty());
        assert_eq!(ids(session.closed_view("")), vec!["b", "a"]);
    }

    #[test]
    fn test_refresh_gate_publishes_latest_on_resume() {
        let mut session = ConnectionSession::new();
        session.ingest(snapshot(vec![record("a", 1, 1), record("b", 1, 1)]));

        assert_eq!(session.toggle_refresh(), RefreshState::Paused);

        let first = session.ingest(snapshot(vec![record("b", 2, 2), record("c", 1, 1)]));
        assert_eq!(first, TickOutcome::Suppressed { closed: 1 });
        let second = session.ingest(snapshot(vec![record("c", 2, 2), record("d", 1, 1)]));
        assert_eq!(second, TickOutcome::Suppressed { closed: 1 });

        // Frozen while paused, closures still recorded from both paused ticks
        assert_eq!(ids(session.active_view("")), vec!["a", "b"]);
        assert_eq!(ids(session.closed_view("")), vec!["b", "a"]);

        assert_eq!(session.toggle_refresh(), RefreshState::Live);
        assert_eq!(ids(session.active_view("")), vec!["c", "d"]);

        // Rates continued from paused bookkeeping, not from the frozen view
        let c = session.active_view("")[0];
        assert_eq!(c.upload_speed_curr, 1);
    }

    #[test]
    fn test_views_are_filtered() {
        let mut session = ConnectionSession::new();
        let mut github = record("gh", 1, 1);
        github.metadata.host = "GitHub.com".to_string();
        session.ingest(snapshot(vec![github, record("other", 1, 1)]));
        session.ingest(snapshot(vec![record("other", 1, 1)]));

        assert_eq!(ids(session.active_view("github")), Vec::<String>::new());
        assert_eq!(ids(session.closed_view("github")), vec!["gh"]);
        assert_eq!(ids(session.active_view("OTHER")), vec!["other"]);
    }

    #[test]
    fn test_ledger_bound_across_ticks() {
        let mut session = ConnectionSession::new();
        for tick in 0..3 {
            let batch: Vec<_> = (0..60)
                .map(|i| record(&format!("t{}-{}", tick, i), 0, 0))
                .collect();
            session.ingest(snapshot(batch));
        }
        session.ingest(snapshot(vec![]));

        assert_eq!(session.closed_view("").len(), MAX_CLOSED_CONNECTIONS);
        let closed = session.closed_view("");
        assert_eq!(closed[0].id, "t2-0");
        assert_eq!(closed[60].id, "t1-0");
    }

    #[test]
    fn test_totals() {
        let mut session = ConnectionSession::new();
        session.ingest(Snapshot {
            download_total: Some(900),
            upload_total: Some(300),
            connections: vec![record("a", 0, 0)],
        });
        assert_eq!(
            session.totals(),
            Totals {
                upload: 300,
                download: 900
            }
        );
        assert_eq!(session.active_count(), 1);
    }
}
