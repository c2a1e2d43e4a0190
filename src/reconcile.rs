// Snapshot diffing: previous active set + new snapshot -> next active set + closures

use crate::connection::{ConnectionSnapshot, ConnectionView};
use crate::rate::{Counters, compute_rates};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Result of reconciling one snapshot against the previous tick
#[derive(Debug, Clone)]
pub struct Reconciliation {
    /// One view per snapshot record, in snapshot order
    pub next_active: Arc<Vec<ConnectionView>>,
    /// Previous records whose id is absent from the new snapshot, in previous order
    pub newly_closed: Vec<ConnectionView>,
    /// False only when both the previous and the new set are empty
    pub changed: bool,
}

/// Owns the previous tick's active set and replaces it on every reconciliation
#[derive(Debug, Default)]
pub struct Reconciler {
    previous: Arc<Vec<ConnectionView>>,
}

impl Reconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// The active set produced by the most recent tick
    pub fn previous(&self) -> &Arc<Vec<ConnectionView>> {
        &self.previous
    }

    pub fn reconcile(&mut self, snapshot: &[ConnectionSnapshot]) -> Reconciliation {
        let changed = !(snapshot.is_empty() && self.previous.is_empty());

        // id -> counters of the previous tick; duplicate ids resolve last-write-wins
        let previous_counters: HashMap<&str, Counters> = self
            .previous
            .iter()
            .map(|view| (view.id.as_str(), view.counters()))
            .collect();

        let mut current_ids: HashSet<&str> = HashSet::with_capacity(snapshot.len());
        let mut next_active = Vec::with_capacity(snapshot.len());

        for record in snapshot {
            if !current_ids.insert(record.id.as_str()) {
                log::warn!(
                    "Duplicate connection id {} in snapshot, last record wins",
                    record.id
                );
            }

            let previous = previous_counters.get(record.id.as_str()).copied();
            let rates = compute_rates(record.counters(), previous);
            if rates.is_reset() {
                log::debug!(
                    "Counter reset on connection {} (upload {}, download {})",
                    record.id,
                    rates.upload,
                    rates.download
                );
            }

            next_active.push(ConnectionView::from_snapshot(record, rates));
        }

        let newly_closed: Vec<ConnectionView> = self
            .previous
            .iter()
            .filter(|view| !current_ids.contains(view.id.as_str()))
            .cloned()
            .collect();

        if !newly_closed.is_empty() {
            log::debug!("{} connection(s) closed this tick", newly_closed.len());
        }

        let next_active = Arc::new(next_active);
        self.previous = Arc::clone(&next_active);

        Reconciliation {
            next_active,
            newly_closed,
            changed,
        }
    }
}
