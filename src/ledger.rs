// Closed connection history

use crate::connection::ConnectionView;
use std::collections::VecDeque;

/// Maximum number of closed connections to keep
pub const MAX_CLOSED_CONNECTIONS: usize = 101;

/// Bounded newest-first buffer of connections that have disappeared.
///
/// Append is the only mutation. Overflow silently drops the oldest entries.
#[derive(Debug, Clone)]
pub struct ClosedLedger {
    entries: VecDeque<ConnectionView>,
    capacity: usize,
}

impl ClosedLedger {
    pub fn new() -> Self {
        Self::with_capacity(MAX_CLOSED_CONNECTIONS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Put a tick's closures in front of everything older, keeping the batch's order
    pub fn append(&mut self, batch: Vec<ConnectionView>) {
        if batch.is_empty() {
            return;
        }

        for view in batch.into_iter().rev() {
            self.entries.push_front(view);
        }

        // Remove old entries if we exceed the limit
        self.entries.truncate(self.capacity);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConnectionView> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ClosedLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::tests::record;
    use crate::rate::Rates;

    fn batch(prefix: &str, count: usize) -> Vec<ConnectionView> {
        (0..count)
            .map(|i| {
                ConnectionView::from_snapshot(
                    &record(&format!("{}{}", prefix, i), 0, 0),
                    Rates::default(),
                )
            })
            .collect()
    }

    #[test]
    fn test_newest_batch_first() {
        let mut ledger = ClosedLedger::new();
        ledger.append(batch("old", 2));
        ledger.append(batch("new", 2));

        let ids: Vec<_> = ledger.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["new0", "new1", "old0", "old1"]);
    }

    #[test]
    fn test_ledger_limit() {
        let mut ledger = ClosedLedger::new();

        // 3 ticks, 120 closures in total
        ledger.append(batch("a", 50));
        ledger.append(batch("b", 40));
        ledger.append(batch("c", 30));

        assert_eq!(ledger.len(), MAX_CLOSED_CONNECTIONS);

        let ids: Vec<_> = ledger.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids[0], "c0");
        assert_eq!(ids[29], "c29");
        assert_eq!(ids[30], "b0");
        assert_eq!(ids[70], "a0");
        // Oldest 19 of the first batch were dropped
        assert_eq!(ids[100], "a30");
    }

    #[test]
    fn test_oversized_single_batch() {
        let mut ledger = ClosedLedger::with_capacity(3);
        ledger.append(batch("x", 5));

        let ids: Vec<_> = ledger.iter().map(|v| v.id.as_str()).collect();
        assert_eq!(ids, vec!["x0", "x1", "x2"]);
    }

    #[test]
    fn test_empty_batch_is_noop() {
        let mut ledger = ClosedLedger::new();
        ledger.append(Vec::new());
        assert!(ledger.is_empty());
        assert_eq!(ledger.len(), 0);
    }
}
