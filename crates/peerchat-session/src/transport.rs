//! The seam between the session protocol and the external transport
//! collaborator. Everything about negotiating the raw channel
//! (addressing, NAT traversal, channel-open signaling) lives behind
//! these traits; the session layer only consumes ordered, reliable
//! payload delivery.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex};

use crate::error::TransportError;

/// Events a channel delivers to its consumer.
#[derive(Debug)]
pub enum ChannelEvent {
    /// A complete payload from the peer.
    Data(Bytes),
    /// The peer closed the channel, or it was torn down underneath us.
    Close,
    /// The channel failed; it is unusable afterwards.
    Error(String),
}

/// One ordered, reliable, bidirectional channel to a single peer.
/// Channels are yielded already open by [`Endpoint::accept`] and
/// [`Endpoint::open`].
#[async_trait]
pub trait Channel: Send {
    /// Send one payload to the peer.
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError>;

    /// Wait for the next channel event. Returns `None` once the
    /// channel is fully closed and drained.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    /// Close the channel. Closing an already-closed channel is a no-op.
    async fn close(&mut self);

    fn is_open(&self) -> bool;
}

pub type BoxedChannel = Box<dyn Channel>;

/// Opens outbound channels to remote endpoints by id.
#[async_trait]
pub trait Dialer: Send + Sync {
    async fn open(&self, remote_id: &str) -> Result<BoxedChannel, TransportError>;
}

/// A bound transport endpoint: the process-wide, addressable object
/// through which channels are opened and accepted. Created lazily by
/// the supervisor and reused across sequential sessions; whoever
/// replaces one tears the previous one down first (dropping it stops
/// its accept loop).
pub struct Endpoint {
    local_id: String,
    incoming: Mutex<mpsc::Receiver<BoxedChannel>>,
    dialer: Arc<dyn Dialer>,
}

impl Endpoint {
    pub fn new(
        local_id: String,
        incoming: mpsc::Receiver<BoxedChannel>,
        dialer: Arc<dyn Dialer>,
    ) -> Self {
        Self {
            local_id,
            incoming: Mutex::new(incoming),
            dialer,
        }
    }

    /// The identifier assigned to this endpoint, shared out-of-band so
    /// a peer can reach us.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    /// Wait for the next inbound channel. Returns `None` once the
    /// transport side has shut down.
    pub async fn accept(&self) -> Option<BoxedChannel> {
        self.incoming.lock().await.recv().await
    }

    /// Open an outbound channel to a remote endpoint.
    pub async fn open(&self, remote_id: &str) -> Result<BoxedChannel, TransportError> {
        self.dialer.open(remote_id).await
    }
}

/// A transport collaborator capable of binding an [`Endpoint`].
/// `bind` resolves once the endpoint is ready and has its assigned id.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn bind(&self) -> Result<Endpoint, TransportError>;
}
