//! TCP transport: endpoints are listening sockets (id = bound address),
//! channels are TCP streams carrying length-prefixed payload frames.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use peerchat_protocol::codec::{try_decode_frame, MAX_MSG_SIZE};

use crate::error::TransportError;
use crate::transport::{BoxedChannel, Channel, ChannelEvent, Dialer, Endpoint, Transport};

/// TCP transport collaborator. `bind` starts an accept loop; dropping
/// the resulting [`Endpoint`] stops it and releases the socket.
pub struct TcpTransport {
    bind_addr: String,
}

impl TcpTransport {
    /// `bind_addr` in `host:port` form; port 0 lets the OS pick and the
    /// assigned address becomes the endpoint id.
    pub fn new(bind_addr: impl Into<String>) -> Self {
        Self {
            bind_addr: bind_addr.into(),
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn bind(&self) -> Result<Endpoint, TransportError> {
        let listener = TcpListener::bind(&self.bind_addr).await?;
        let local_id = listener.local_addr()?.to_string();
        let (tx, rx) = mpsc::channel::<BoxedChannel>(8);
        tokio::spawn(accept_loop(listener, tx));
        debug!(id = %local_id, "TCP endpoint bound");
        Ok(Endpoint::new(local_id, rx, Arc::new(TcpDialer)))
    }
}

async fn accept_loop(listener: TcpListener, tx: mpsc::Sender<BoxedChannel>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer_addr)) => {
                debug!(peer = %peer_addr, "inbound TCP channel");
                if tx.send(Box::new(TcpChannel::new(stream))).await.is_err() {
                    // Endpoint dropped; stop accepting.
                    break;
                }
            }
            Err(e) => {
                warn!("TCP accept error: {e}");
            }
        }
    }
    debug!("TCP accept loop ended");
}

struct TcpDialer;

#[async_trait]
impl Dialer for TcpDialer {
    async fn open(&self, remote_id: &str) -> Result<BoxedChannel, TransportError> {
        let stream = TcpStream::connect(remote_id).await?;
        Ok(Box::new(TcpChannel::new(stream)))
    }
}

/// One TCP stream framed into discrete payloads with a 4-byte
/// big-endian length prefix.
pub struct TcpChannel {
    stream: Option<TcpStream>,
    buf: BytesMut,
}

impl TcpChannel {
    fn new(stream: TcpStream) -> Self {
        Self {
            stream: Some(stream),
            buf: BytesMut::with_capacity(4096),
        }
    }
}

#[async_trait]
impl Channel for TcpChannel {
    async fn send(&mut self, payload: Bytes) -> Result<(), TransportError> {
        if payload.len() > MAX_MSG_SIZE as usize {
            return Err(TransportError::PayloadTooLarge(payload.len()));
        }
        let stream = self.stream.as_mut().ok_or(TransportError::ChannelClosed)?;
        let mut frame = Vec::with_capacity(4 + payload.len());
        frame.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        frame.extend_from_slice(&payload);
        stream.write_all(&frame).await?;
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            match try_decode_frame(&mut self.buf) {
                Ok(Some(payload)) => return Some(ChannelEvent::Data(payload.into())),
                Ok(None) => {}
                Err(e) => {
                    self.stream = None;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
            }
            let read = match self.stream.as_mut() {
                Some(stream) => stream.read_buf(&mut self.buf).await,
                None => return None,
            };
            match read {
                Ok(0) => {
                    self.stream = None;
                    return Some(ChannelEvent::Close);
                }
                Ok(_) => {}
                Err(e) => {
                    self.stream = None;
                    return Some(ChannelEvent::Error(e.to_string()));
                }
            }
        }
    }

    async fn close(&mut self) {
        if let Some(mut stream) = self.stream.take() {
            // Already-closed streams are fine here.
            let _ = stream.shutdown().await;
        }
    }

    fn is_open(&self) -> bool {
        self.stream.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frames_roundtrip_over_loopback() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let server = transport.bind().await.unwrap();
        let client = transport.bind().await.unwrap();

        let mut outbound = client.open(server.local_id()).await.unwrap();
        let mut inbound = server.accept().await.unwrap();

        outbound.send(Bytes::from_static(b"first")).await.unwrap();
        outbound.send(Bytes::from_static(b"second")).await.unwrap();

        match inbound.next_event().await.unwrap() {
            ChannelEvent::Data(payload) => assert_eq!(&payload[..], b"first"),
            other => panic!("expected data, got {other:?}"),
        }
        match inbound.next_event().await.unwrap() {
            ChannelEvent::Data(payload) => assert_eq!(&payload[..], b"second"),
            other => panic!("expected data, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn close_surfaces_on_peer_side() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let server = transport.bind().await.unwrap();
        let client = transport.bind().await.unwrap();

        let mut outbound = client.open(server.local_id()).await.unwrap();
        let mut inbound = server.accept().await.unwrap();

        outbound.close().await;
        assert!(!outbound.is_open());
        assert!(matches!(
            inbound.next_event().await,
            Some(ChannelEvent::Close)
        ));
    }

    #[tokio::test]
    async fn oversized_payload_is_rejected() {
        let transport = TcpTransport::new("127.0.0.1:0");
        let server = transport.bind().await.unwrap();
        let client = transport.bind().await.unwrap();

        let mut outbound = client.open(server.local_id()).await.unwrap();
        let huge = Bytes::from(vec![0u8; MAX_MSG_SIZE as usize + 1]);
        assert!(matches!(
            outbound.send(huge).await,
            Err(TransportError::PayloadTooLarge(_))
        ));
    }
}
