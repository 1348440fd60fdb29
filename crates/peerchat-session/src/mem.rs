//! In-process transport: endpoints register in a shared table keyed by
//! assigned id, and channels are paired mpsc pipes. Used by the test
//! suite and by anything that wants two supervisors in one process.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{BoxedChannel, Channel, ChannelEvent, Dialer, Endpoint, Transport};

type Registry = Arc<Mutex<HashMap<String, mpsc::Sender<BoxedChannel>>>>;

fn lock_registry(registry: &Registry) -> std::sync::MutexGuard<'_, HashMap<String, mpsc::Sender<BoxedChannel>>> {
    registry.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// An in-process peer network. Clones share the same id table, so every
/// endpoint bound through any clone can reach every other.
#[derive(Clone, Default)]
pub struct MemoryTransport {
    registry: Registry,
    counter: Arc<AtomicU64>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn bind(&self) -> Result<Endpoint, TransportError> {
        let id = format!("peer-{}", self.counter.fetch_add(1, Ordering::Relaxed) + 1);
        let (tx, rx) = mpsc::channel(8);
        lock_registry(&self.registry).insert(id.clone(), tx);
        debug!(id, "memory endpoint bound");
        Ok(Endpoint::new(
            id,
            rx,
            Arc::new(MemoryDialer {
                registry: self.registry.clone(),
            }),
        ))
    }
}

struct MemoryDialer {
    registry: Registry,
}

#[async_trait]
impl Dialer for MemoryDialer {
    async fn open(&self, remote_id: &str) -> Result<BoxedChannel, TransportError> {
        let entry = lock_registry(&self.registry)
            .get(remote_id)
            .cloned()
            .ok_or_else(|| TransportError::UnknownPeer(remote_id.to_owned()))?;

        let (ours, theirs) = MemoryChannel::pair();
        if entry.send(Box::new(theirs)).await.is_err() {
            // Remote endpoint was dropped; clean up its stale entry.
            lock_registry(&self.registry).remove(remote_id);
            return Err(TransportError::UnknownPeer(remote_id.to_owned()));
        }
        Ok(Box::new(ours))
    }
}

/// One side of a paired in-memory channel.
pub struct MemoryChannel {
    tx: Option<mpsc::Sender<Bytes>>,
    rx: mpsc::Receiver<Bytes>,
    open: bool,
}

impl MemoryChannel {
    /// A connected pair; payloads sent on one side arrive on the other.
    pub fn pair() -> (MemoryChannel, MemoryChannel) {
        let (tx_a, rx_a) = mpsc::channel(64);
        let (tx_b, rx_b) = mpsc::channel(64);
        (
            MemoryChannel {
                tx: Some(tx_a),
                rx: rx_b,
                open: true,
            },
            MemoryChannel {
                tx: Some(tx_b),
                rx: rx_a,
                open: true,
            },
        )
    }
}

#[async_trait]
impl Channel for MemoryChannel {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        let tx = self.tx.as_ref().ok_or(TransportError::ChannelClosed)?;
        tx.send(payload)
            .await
            .map_err(|_| TransportError::ChannelClosed)
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if !self.open {
            return None;
        }
        match self.rx.recv().await {
            Some(payload) => Some(ChannelEvent::Data(payload)),
            None => {
                self.open = false;
                self.tx = None;
                Some(ChannelEvent::Close)
            }
        }
    }

    async fn close(&mut self) {
        // Dropping our sender surfaces Close on the peer side.
        self.tx = None;
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
