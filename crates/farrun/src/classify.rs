//! # Transferable Classifier
//!
//! Decides whether a value is handed to the peer by reference-transfer
//! (consuming the sender's copy) or by deep copy.
//!
//! ## Policy, in priority order
//!
//! 1. An explicit per-call selector wins outright and is trusted as-is.
//! 2. `All` scans the payload for eligible sub-values and transfers every
//!    one found; `Never` forces full copy.
//! 3. `Auto` transfers direct top-level values whose kind is among the
//!    kinds probed on the channel.
//!
//! Probing happens once per binding: only the kinds the channel actually
//! supports are ever tested, so an absent kind can never fail a check.

use std::sync::Arc;

use farrpc::TransferList;
use farrpc::Value;

use crate::channel::Channel;

/// The fixed set of reference-transferable kinds.
///
/// Not every kind exists on every channel; `Classifier::probe` narrows the
/// set per binding.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Buffer,
    Port,
}

impl TransferKind {
    pub const ALL: [TransferKind; 2] = [TransferKind::Buffer, TransferKind::Port];

    /// Whether the value is of this kind.
    pub fn matches(self, value: &Value) -> bool {
        match self {
            Self::Buffer => matches!(value, Value::Buffer(_)),
            Self::Port => matches!(value, Value::Port(_)),
        }
    }
}

/// How a function entry or call wants its payload handed off.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum TransferPolicy {
    /// Transfer direct top-level values of a supported kind.
    #[default]
    Auto,
    /// Scan the payload and transfer every eligible sub-value.
    All,
    /// Deep-copy everything.
    Never,
}

/// A per-call override that picks the transfer list directly.
pub type TransferSelector = Arc<dyn Fn(&[Value]) -> TransferList + Send + Sync>;

/// The probed set of transfer kinds for one channel.
#[derive(Clone, Debug)]
pub struct Classifier {
    kinds: Vec<TransferKind>,
}

impl Classifier {
    /// Probes which kinds the channel supports. Kinds the channel does not
    /// know are excluded, never errors.
    pub fn probe(channel: &dyn Channel) -> Self {
        let kinds = TransferKind::ALL
            .iter()
            .copied()
            .filter(|kind| channel.supports(*kind))
            .collect();
        Self { kinds }
    }

    pub fn kinds(&self) -> &[TransferKind] {
        &self.kinds
    }

    /// Whether the value is of a kind present on this channel.
    pub fn eligible(&self, value: &Value) -> bool {
        self.kinds.iter().any(|kind| kind.matches(value))
    }

    /// Computes the transfer list for a payload under the given policy.
    pub fn select(&self, policy: TransferPolicy, payload: &[Value]) -> TransferList {
        match policy {
            TransferPolicy::Never => TransferList::new(),
            TransferPolicy::Auto => self.top_level(payload),
            TransferPolicy::All => self.scan_all(payload),
        }
    }

    /// Default heuristic: only direct top-level values are considered.
    fn top_level(&self, payload: &[Value]) -> TransferList {
        let mut transfers = TransferList::new();
        for value in payload {
            if self.eligible(value) {
                transfers.push_value(value);
            }
        }
        transfers
    }

    /// Deep scan: every eligible sub-value is transferred.
    fn scan_all(&self, payload: &[Value]) -> TransferList {
        let mut transfers = TransferList::new();
        for value in payload {
            self.walk(value, &mut transfers);
        }
        transfers
    }

    fn walk(&self, value: &Value, transfers: &mut TransferList) {
        if self.eligible(value) {
            transfers.push_value(value);
            return;
        }
        match value {
            Value::List(items) => {
                for item in items {
                    self.walk(item, transfers);
                }
            }
            Value::Record(fields) => {
                for (_, item) in fields {
                    self.walk(item, transfers);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use farrpc::ByteBuf;
    use farrpc::PortHandle;
    use farrpc::RawPort;

    use super::*;
    use crate::channel::Result;
    use crate::pipe::DuplexPipe;

    /// A channel that only knows byte buffers.
    struct BytesOnlyChannel;

    #[async_trait::async_trait]
    impl Channel for BytesOnlyChannel {
        async fn send(&self, _message: Value) -> Result<()> {
            Ok(())
        }

        async fn recv(&self) -> Option<Value> {
            None
        }
    }

    #[test]
    fn test_probe_narrows_kinds() {
        let bytes_only = Classifier::probe(&BytesOnlyChannel);
        assert_eq!(bytes_only.kinds(), &[TransferKind::Buffer]);

        let (pipe, _peer) = DuplexPipe::pair();
        let duplex = Classifier::probe(&pipe);
        assert_eq!(duplex.kinds(), &[TransferKind::Buffer, TransferKind::Port]);
    }

    #[test]
    fn test_absent_kind_is_never_eligible() {
        let classifier = Classifier::probe(&BytesOnlyChannel);
        let (a, _b) = RawPort::pair();
        let port = Value::Port(PortHandle::new(a));

        assert!(!classifier.eligible(&port));
        assert!(classifier.select(TransferPolicy::Auto, &[port]).is_empty());
    }

    #[test]
    fn test_auto_takes_top_level_only() {
        let classifier = Classifier::probe(&BytesOnlyChannel);
        let top = ByteBuf::new(vec![1]);
        let nested = ByteBuf::new(vec![2]);
        let payload = vec![
            Value::Buffer(top.clone()),
            Value::List(vec![Value::Buffer(nested.clone())]),
        ];

        let transfers = classifier.select(TransferPolicy::Auto, &payload);
        assert!(transfers.contains_buf(&top));
        assert!(!transfers.contains_buf(&nested));
    }

    #[test]
    fn test_all_scans_nested_values() {
        let classifier = Classifier::probe(&BytesOnlyChannel);
        let top = ByteBuf::new(vec![1]);
        let nested = ByteBuf::new(vec![2]);
        let payload = vec![
            Value::Buffer(top.clone()),
            Value::Record(vec![(
                "inner".to_string(),
                Value::List(vec![Value::Buffer(nested.clone())]),
            )]),
        ];

        let transfers = classifier.select(TransferPolicy::All, &payload);
        assert!(transfers.contains_buf(&top));
        assert!(transfers.contains_buf(&nested));
    }

    #[test]
    fn test_never_transfers_nothing() {
        let classifier = Classifier::probe(&BytesOnlyChannel);
        let payload = vec![Value::Buffer(ByteBuf::new(vec![1]))];
        assert!(classifier.select(TransferPolicy::Never, &payload).is_empty());
    }
}
