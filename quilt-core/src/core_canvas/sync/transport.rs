//! Transport seam for sync sessions
//!
//! The engine never opens connections itself. Anything that can move
//! opaque frames in order between two replicas can carry a session.

use crate::core_canvas::store::{StoreError, StoreResult};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Ordered, reliable frame channel to one peer
///
/// `recv` must be cancel safe: a session polls it inside `tokio::select!`
/// and may drop the future before it completes. `send` must not wait for
/// the peer to read.
#[async_trait]
pub trait Transport: Send {
    async fn send(&mut self, frame: Vec<u8>) -> StoreResult<()>;

    /// Next frame, or `None` once the peer has closed the channel
    async fn recv(&mut self) -> StoreResult<Option<Vec<u8>>>;

    async fn close(&mut self) -> StoreResult<()> {
        Ok(())
    }
}

/// One end of an in-process transport pair
pub struct MemoryTransport {
    tx: Option<mpsc::UnboundedSender<Vec<u8>>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Two connected in-process transport ends
pub fn memory_transport() -> (MemoryTransport, MemoryTransport) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (MemoryTransport { tx: Some(a_tx), rx: a_rx }, MemoryTransport { tx: Some(b_tx), rx: b_rx })
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(&mut self, frame: Vec<u8>) -> StoreResult<()> {
        let tx = self.tx.as_ref().ok_or_else(|| StoreError::TransportFailure("transport closed".to_string()))?;
        tx.send(frame).map_err(|_| StoreError::TransportFailure("peer hung up".to_string()))
    }

    async fn recv(&mut self) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.rx.recv().await)
    }

    async fn close(&mut self) -> StoreResult<()> {
        self.tx = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_transport_delivers_in_order() {
        let (mut a, mut b) = memory_transport();
        a.send(vec![1]).await.unwrap();
        a.send(vec![2]).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), Some(vec![1]));
        assert_eq!(b.recv().await.unwrap(), Some(vec![2]));
    }

    #[tokio::test]
    async fn test_close_signals_end_of_stream() {
        let (mut a, mut b) = memory_transport();
        a.close().await.unwrap();
        assert_eq!(b.recv().await.unwrap(), None);
        assert!(matches!(a.send(vec![0]).await, Err(StoreError::TransportFailure(_))));
    }

    #[tokio::test]
    async fn test_send_after_peer_dropped_fails() {
        let (mut a, b) = memory_transport();
        drop(b);
        assert!(matches!(a.send(vec![0]).await, Err(StoreError::TransportFailure(_))));
    }
}
