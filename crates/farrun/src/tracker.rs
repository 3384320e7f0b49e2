//! # Call Tracker
//!
//! The per-agent table of pending call continuations, keyed by
//! `(namespace, key)`. Correlation is purely by key: completion order
//! across concurrent calls carries no meaning.

use dashmap::DashMap;
use farrpc::Value;
use tokio::sync::oneshot;

/// The callee's eventual answer: result value or opaque failure payload.
pub type Outcome = std::result::Result<Value, Value>;

struct Pending {
    tx: oneshot::Sender<Outcome>,
}

/// Pending continuations for one agent.
#[derive(Default)]
pub struct CallTracker {
    pending: DashMap<(String, u64), Pending>,
}

impl CallTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a pending continuation. The caller guarantees the key is not
    /// already tracked for the namespace.
    pub fn track(&self, namespace: &str, key: u64) -> oneshot::Receiver<Outcome> {
        let (tx, rx) = oneshot::channel();
        self.pending.insert((namespace.to_string(), key), Pending { tx });
        rx
    }

    /// Looks up, removes, and settles the continuation. A late or duplicate
    /// return finds nothing and is a no-op.
    pub fn settle(&self, namespace: &str, key: u64, outcome: Outcome) {
        let Some((_, pending)) = self.pending.remove(&(namespace.to_string(), key)) else {
            return;
        };
        // The caller may have given up; a dead receiver is fine.
        let _ = pending.tx.send(outcome);
    }

    /// Drops a continuation without settling it (the call never went out).
    pub fn abandon(&self, namespace: &str, key: u64) {
        self.pending.remove(&(namespace.to_string(), key));
    }

    /// Drops every continuation; waiting callers observe the closed sender.
    pub fn abandon_all(&self) {
        self.pending.clear();
    }

    pub fn outstanding(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_settle_resolves_tracked_call() {
        let tracker = CallTracker::new();
        let rx = tracker.track("fn", 1);

        tracker.settle("fn", 1, Ok(Value::U64(3)));
        assert_eq!(rx.await.unwrap(), Ok(Value::U64(3)));
        assert_eq!(tracker.outstanding(), 0);
    }

    #[tokio::test]
    async fn test_settle_unknown_key_is_noop() {
        let tracker = CallTracker::new();
        let _rx = tracker.track("fn", 1);

        // Wrong key and wrong namespace both fall through silently.
        tracker.settle("fn", 2, Ok(Value::Null));
        tracker.settle("other", 1, Ok(Value::Null));
        assert_eq!(tracker.outstanding(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_settle_is_noop() {
        let tracker = CallTracker::new();
        let rx = tracker.track("fn", 7);

        tracker.settle("fn", 7, Err(Value::text("first")));
        tracker.settle("fn", 7, Err(Value::text("second")));

        assert_eq!(rx.await.unwrap(), Err(Value::text("first")));
    }

    #[tokio::test]
    async fn test_abandon_all_closes_receivers() {
        let tracker = CallTracker::new();
        let rx = tracker.track("fn", 1);

        tracker.abandon_all();
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn test_same_key_across_namespaces() {
        let tracker = CallTracker::new();
        let rx_a = tracker.track("a", 1);
        let rx_b = tracker.track("b", 1);

        tracker.settle("b", 1, Ok(Value::U64(2)));
        tracker.settle("a", 1, Ok(Value::U64(1)));

        assert_eq!(rx_a.await.unwrap(), Ok(Value::U64(1)));
        assert_eq!(rx_b.await.unwrap(), Ok(Value::U64(2)));
    }
}
