//! # In-Process Duplex Pipe
//!
//! A channel implementation over a pair of unbounded mpsc halves. Used for
//! task workers in the same process and for tests.

use farrpc::RawPort;
use farrpc::Value;
use tokio::sync::Mutex;
use tokio::sync::mpsc;

use crate::channel::Channel;
use crate::channel::Error;
use crate::channel::Result;
use crate::classify::TransferKind;

/// One endpoint of an in-process duplex channel.
///
/// Messages sent on one endpoint appear on the peer's `recv` and vice versa.
pub struct DuplexPipe {
    tx: mpsc::UnboundedSender<Value>,
    rx: Mutex<mpsc::UnboundedReceiver<Value>>,
}

impl DuplexPipe {
    /// Creates a pair of connected endpoints.
    pub fn pair() -> (Self, Self) {
        let (tx_a, rx_a) = mpsc::unbounded_channel();
        let (tx_b, rx_b) = mpsc::unbounded_channel();

        let a = Self { tx: tx_a, rx: Mutex::new(rx_b) };
        let b = Self { tx: tx_b, rx: Mutex::new(rx_a) };
        (a, b)
    }

    /// Builds an endpoint from pre-split halves.
    ///
    /// This is the normalization path for host pipes that hand out their
    /// send and receive sides separately.
    pub fn from_halves(
        tx: mpsc::UnboundedSender<Value>,
        rx: mpsc::UnboundedReceiver<Value>,
    ) -> Self {
        Self { tx, rx: Mutex::new(rx) }
    }

    /// Adopts a transferred port endpoint as a full channel.
    pub fn from_port(port: RawPort) -> Self {
        Self::from_halves(port.tx, port.rx)
    }
}

#[async_trait::async_trait]
impl Channel for DuplexPipe {
    async fn send(&self, message: Value) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::Closed)
    }

    async fn recv(&self) -> Option<Value> {
        self.rx.lock().await.recv().await
    }

    fn supports(&self, kind: TransferKind) -> bool {
        matches!(kind, TransferKind::Buffer | TransferKind::Port)
    }
}

#[cfg(test)]
mod tests {
    use farrpc::PortHandle;
    use farrpc::TransferList;
    use farrpc::seal;

    use super::*;

    #[tokio::test]
    async fn test_pair_is_duplex() {
        let (a, b) = DuplexPipe::pair();

        a.send(Value::text("ping")).await.unwrap();
        assert_eq!(b.recv().await, Some(Value::text("ping")));

        b.send(Value::text("pong")).await.unwrap();
        assert_eq!(a.recv().await, Some(Value::text("pong")));
    }

    #[tokio::test]
    async fn test_recv_none_after_peer_drop() {
        let (a, b) = DuplexPipe::pair();
        drop(b);
        assert_eq!(a.recv().await, None);
    }

    #[tokio::test]
    async fn test_transferred_port_becomes_channel() {
        let (a, b) = DuplexPipe::pair();

        // Seal a port for transfer, ship it over the pipe, adopt it.
        let (near, far) = RawPort::pair();
        let handle = PortHandle::new(far);
        let mut transfers = TransferList::new();
        transfers.push_port(&handle);
        let sealed = seal(&Value::Port(handle.clone()), &transfers).unwrap();
        assert!(handle.is_detached());

        a.send(sealed).await.unwrap();
        let received = b.recv().await.unwrap();
        let Value::Port(received_port) = received else {
            panic!("Expected a port");
        };

        let adopted = DuplexPipe::from_port(received_port.detach().unwrap());
        let ours = DuplexPipe::from_port(near);

        ours.send(Value::U64(7)).await.unwrap();
        assert_eq!(adopted.recv().await, Some(Value::U64(7)));
    }
}
