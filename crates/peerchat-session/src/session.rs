//! The session actor. One tokio task owns the channel, the handshake
//! machine and the liveness timer; the [`PeerSession`] handle talks to
//! it over an mpsc command queue and watches its phase through a
//! `watch` channel.

use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use peerchat_crypto::{encrypt_text, SessionKeys};
use peerchat_protocol::wire::REASON_PING_TIMEOUT;
use peerchat_protocol::{decode, encode, WireMessage};

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::{Handshake, HandshakeAction, Role};
use crate::observer::{ObserverCell, SessionObserver};
use crate::transport::{BoxedChannel, ChannelEvent, Endpoint};

/// Disconnect reason for a locally initiated, orderly teardown.
pub const REASON_SESSION_CLOSED: &str = "session-closed";
/// Reason recorded when the peer closed the channel without a
/// `disconnect` message.
pub const REASON_CONNECTION_CLOSED: &str = "connection-closed";
/// Reason recorded when the channel failed underneath the session.
pub const REASON_CONNECTION_ERROR: &str = "connection-error";

/// Shown in place of a message body the local keys cannot decrypt.
const UNDECRYPTABLE_PLACEHOLDER: &str = "[unable to decrypt message]";

/// Where the session currently is in its lifecycle. `Closed` carries
/// the disconnect reason, local or remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    Connecting,
    Authenticated,
    Closed(String),
}

enum SessionCommand {
    SendMessage {
        text: String,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    },
    Disconnect {
        reason: String,
    },
    Destroy,
}

/// Cloneable handle to a running session task. All methods are safe to
/// call from any task; once the session is closed they fail with
/// [`SessionError::Closed`] instead of panicking.
#[derive(Clone)]
pub struct PeerSession {
    role: Role,
    local_id: String,
    cmd_tx: mpsc::Sender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
    observer: Arc<ObserverCell>,
}

impl PeerSession {
    pub fn role(&self) -> Role {
        self.role
    }

    /// The id of the local transport endpoint this session runs over.
    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(*self.phase.borrow(), SessionPhase::Authenticated)
    }

    /// Wait until the session closes and return the disconnect reason.
    pub async fn closed(&self) -> String {
        let mut phase = self.phase.clone();
        let reason = match phase
            .wait_for(|phase| matches!(phase, SessionPhase::Closed(_)))
            .await
        {
            Ok(phase) => match &*phase {
                SessionPhase::Closed(reason) => reason.clone(),
                _ => REASON_SESSION_CLOSED.to_owned(),
            },
            Err(_) => REASON_SESSION_CLOSED.to_owned(),
        };
        reason
    }

    /// Register the observer that receives session callbacks,
    /// replacing any previous one.
    pub fn set_observer(&self, observer: Arc<dyn SessionObserver>) {
        self.observer.set(observer);
    }

    pub fn clear_observer(&self) {
        self.observer.clear();
    }

    /// Encrypt `text` for the peer and send it. Resolves with the
    /// timestamp stamped on the wire message. If encryption fails
    /// nothing is sent and the error is returned; plaintext never
    /// leaves the process.
    pub async fn send_message(&self, text: impl Into<String>) -> Result<u64, SessionError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.cmd_tx
            .send(SessionCommand::SendMessage {
                text: text.into(),
                reply: reply_tx,
            })
            .await
            .map_err(|_| self.closed_error())?;
        reply_rx.await.map_err(|_| self.closed_error())?
    }

    /// Ask the session to announce `reason` to the peer and shut down.
    /// Best effort; a no-op once the session is already closed.
    pub async fn send_disconnect(&self, reason: impl Into<String>) {
        let _ = self
            .cmd_tx
            .send(SessionCommand::Disconnect {
                reason: reason.into(),
            })
            .await;
    }

    /// Tear the session down. The observer is cleared first so no
    /// callback fires after this returns. Idempotent.
    pub async fn destroy(&self) {
        self.observer.clear();
        let _ = self.cmd_tx.send(SessionCommand::Destroy).await;
    }

    fn closed_error(&self) -> SessionError {
        match &*self.phase.borrow() {
            SessionPhase::Closed(reason) => SessionError::Closed(reason.clone()),
            _ => SessionError::Closed(REASON_SESSION_CLOSED.to_owned()),
        }
    }
}

impl std::fmt::Debug for PeerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PeerSession")
            .field("role", &self.role)
            .field("local_id", &self.local_id)
            .field("phase", &*self.phase.borrow())
            .finish_non_exhaustive()
    }
}

pub(crate) struct SessionParts {
    pub session: PeerSession,
    pub task: JoinHandle<()>,
    pub phase: watch::Receiver<SessionPhase>,
}

/// Spawn a session task. A host passes `channel: None` and waits for
/// the first inbound channel on the endpoint; a client passes the
/// channel it just opened.
pub(crate) fn spawn_session(
    role: Role,
    config: SessionConfig,
    keys: Arc<SessionKeys>,
    endpoint: Arc<Endpoint>,
    channel: Option<BoxedChannel>,
) -> SessionParts {
    let (cmd_tx, cmd_rx) = mpsc::channel(16);
    let (phase_tx, phase_rx) = watch::channel(SessionPhase::Connecting);
    let observer = Arc::new(ObserverCell::default());
    let local_id = endpoint.local_id().to_owned();

    let task = SessionTask {
        role,
        config,
        keys: keys.clone(),
        endpoint,
        cmd_rx,
        phase: phase_tx,
        observer: observer.clone(),
        handshake: Handshake::new(role, keys),
        peer_enc_key: None,
        authenticated: false,
        last_ping_received: Instant::now(),
        reject_surplus: true,
    };
    let task = tokio::spawn(task.run(channel));

    SessionParts {
        session: PeerSession {
            role,
            local_id,
            cmd_tx,
            phase: phase_rx.clone(),
            observer,
        },
        task,
        phase: phase_rx,
    }
}

struct Finish {
    reason: String,
    /// Whether to announce the reason to the peer with a `disconnect`
    /// message before closing. False when the peer already went away.
    announce: bool,
}

enum Step {
    Continue,
    Finish(Finish),
}

struct SessionTask {
    role: Role,
    config: SessionConfig,
    keys: Arc<SessionKeys>,
    endpoint: Arc<Endpoint>,
    cmd_rx: mpsc::Receiver<SessionCommand>,
    phase: watch::Sender<SessionPhase>,
    observer: Arc<ObserverCell>,
    handshake: Handshake,
    peer_enc_key: Option<String>,
    authenticated: bool,
    last_ping_received: Instant,
    /// While true, inbound channels beyond the one we own are closed
    /// on arrival. One session, one peer.
    reject_surplus: bool,
}

impl SessionTask {
    async fn run(mut self, channel: Option<BoxedChannel>) {
        let mut channel = match channel {
            Some(ch) => ch,
            None => match self.wait_for_channel().await {
                Some(ch) => ch,
                None => {
                    self.phase
                        .send_replace(SessionPhase::Closed(REASON_SESSION_CLOSED.to_owned()));
                    self.observer.notify_disconnect(REASON_SESSION_CLOSED);
                    return;
                }
            },
        };

        let finish = self.drive(&mut channel).await;
        if finish.announce && channel.is_open() {
            let msg = WireMessage::Disconnect {
                reason: finish.reason.clone(),
            };
            if let Err(e) = self.send(&mut channel, &msg).await {
                debug!(error = %e, "could not announce disconnect");
            }
        }
        channel.close().await;
        debug!(role = ?self.role, reason = %finish.reason, "session finished");
        self.phase
            .send_replace(SessionPhase::Closed(finish.reason.clone()));
        self.observer.notify_disconnect(&finish.reason);
    }

    /// Host phase one: no channel yet. Commands that need a live
    /// session are answered with `NotAuthenticated` meanwhile.
    async fn wait_for_channel(&mut self) -> Option<BoxedChannel> {
        loop {
            tokio::select! {
                inbound = self.endpoint.accept() => return inbound,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCommand::SendMessage { reply, .. }) => {
                        let _ = reply.send(Err(SessionError::NotAuthenticated));
                    }
                    Some(SessionCommand::Disconnect { .. })
                    | Some(SessionCommand::Destroy)
                    | None => return None,
                },
            }
        }
    }

    async fn drive(&mut self, channel: &mut BoxedChannel) -> Finish {
        for action in self.handshake.on_channel_open() {
            match self.apply(channel, action).await {
                Step::Continue => {}
                Step::Finish(f) => return f,
            }
        }

        let mut ping = tokio::time::interval(self.config.ping_interval());
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let step = tokio::select! {
                event = channel.next_event() => match event {
                    Some(ChannelEvent::Data(bytes)) => self.on_data(channel, bytes).await,
                    Some(ChannelEvent::Close) | None => Step::Finish(Finish {
                        reason: REASON_CONNECTION_CLOSED.to_owned(),
                        announce: false,
                    }),
                    Some(ChannelEvent::Error(e)) => {
                        warn!(error = %e, "channel failed");
                        Step::Finish(Finish {
                            reason: REASON_CONNECTION_ERROR.to_owned(),
                            announce: false,
                        })
                    }
                },
                _ = ping.tick(), if self.authenticated => self.on_ping_tick(channel).await,
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(SessionCommand::SendMessage { text, reply }) => {
                        self.handle_send(channel, text, reply).await
                    }
                    Some(SessionCommand::Disconnect { reason }) => Step::Finish(Finish {
                        reason,
                        announce: true,
                    }),
                    Some(SessionCommand::Destroy) | None => Step::Finish(Finish {
                        reason: REASON_SESSION_CLOSED.to_owned(),
                        announce: true,
                    }),
                },
                surplus = self.endpoint.accept(), if self.reject_surplus => {
                    match surplus {
                        Some(mut extra) => {
                            debug!("closing surplus inbound channel, session already active");
                            extra.close().await;
                        }
                        None => self.reject_surplus = false,
                    }
                    Step::Continue
                },
            };
            match step {
                Step::Continue => {}
                Step::Finish(f) => return f,
            }
        }
    }

    async fn on_ping_tick(&mut self, channel: &mut BoxedChannel) -> Step {
        if self.last_ping_received.elapsed() > self.config.ping_timeout() {
            warn!(
                elapsed_ms = self.last_ping_received.elapsed().as_millis() as u64,
                "no ping from peer within timeout"
            );
            return Step::Finish(Finish {
                reason: REASON_PING_TIMEOUT.to_owned(),
                announce: true,
            });
        }
        let msg = WireMessage::Ping {
            timestamp: now_millis(),
        };
        match self.send(channel, &msg).await {
            Ok(()) => Step::Continue,
            Err(_) => Step::Finish(Finish {
                reason: REASON_CONNECTION_ERROR.to_owned(),
                announce: false,
            }),
        }
    }

    async fn on_data(&mut self, channel: &mut BoxedChannel, bytes: Bytes) -> Step {
        let msg = match decode(&bytes) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, len = bytes.len(), "dropping undecodable payload");
                return Step::Continue;
            }
        };

        if !self.authenticated {
            if let WireMessage::Disconnect { reason } = msg {
                return Step::Finish(Finish {
                    reason,
                    announce: false,
                });
            }
            for action in self.handshake.on_message(msg) {
                match self.apply(channel, action).await {
                    Step::Continue => {}
                    step => return step,
                }
            }
            return Step::Continue;
        }

        match msg {
            WireMessage::ChatMessage { text, timestamp } => {
                let plain = self.keys.decrypt_text(&text).unwrap_or_else(|_| {
                    warn!("incoming message did not decrypt with our key");
                    UNDECRYPTABLE_PLACEHOLDER.to_owned()
                });
                self.observer.notify_message(&plain, timestamp);
                Step::Continue
            }
            WireMessage::Ping { timestamp } => {
                self.last_ping_received = Instant::now();
                self.observer.notify_ping(timestamp);
                Step::Continue
            }
            WireMessage::Disconnect { reason } => Step::Finish(Finish {
                reason,
                announce: false,
            }),
            other => {
                debug!(kind = other.kind(), "dropping unexpected message");
                Step::Continue
            }
        }
    }

    async fn apply(&mut self, channel: &mut BoxedChannel, action: HandshakeAction) -> Step {
        match action {
            HandshakeAction::Send(msg) => match self.send(channel, &msg).await {
                Ok(()) => Step::Continue,
                Err(_) => Step::Finish(Finish {
                    reason: REASON_CONNECTION_ERROR.to_owned(),
                    announce: false,
                }),
            },
            HandshakeAction::Authenticated => {
                self.authenticated = true;
                self.peer_enc_key = self.handshake.peer_enc_key().map(str::to_owned);
                self.last_ping_received = Instant::now();
                info!(role = ?self.role, "session authenticated");
                self.phase.send_replace(SessionPhase::Authenticated);
                self.observer.notify_connect();
                Step::Continue
            }
            HandshakeAction::Fail { reason, error } => {
                warn!(reason, error = %error, "handshake failed");
                Step::Finish(Finish {
                    reason: reason.to_owned(),
                    announce: true,
                })
            }
        }
    }

    async fn handle_send(
        &mut self,
        channel: &mut BoxedChannel,
        text: String,
        reply: oneshot::Sender<Result<u64, SessionError>>,
    ) -> Step {
        if !self.authenticated {
            let _ = reply.send(Err(SessionError::NotAuthenticated));
            return Step::Continue;
        }
        // set the moment we authenticated
        let peer_key = match self.peer_enc_key.as_deref() {
            Some(key) => key,
            None => {
                let _ = reply.send(Err(SessionError::NotAuthenticated));
                return Step::Continue;
            }
        };
        let ciphertext = match encrypt_text(peer_key, &text) {
            Ok(ct) => ct,
            Err(e) => {
                warn!(error = %e, "refusing to send, encryption failed");
                let _ = reply.send(Err(SessionError::Crypto(e)));
                return Step::Continue;
            }
        };
        let timestamp = now_millis();
        let msg = WireMessage::ChatMessage {
            text: ciphertext,
            timestamp,
        };
        match self.send(channel, &msg).await {
            Ok(()) => {
                let _ = reply.send(Ok(timestamp));
                Step::Continue
            }
            Err(e) => {
                let _ = reply.send(Err(e));
                Step::Finish(Finish {
                    reason: REASON_CONNECTION_ERROR.to_owned(),
                    announce: false,
                })
            }
        }
    }

    async fn send(
        &self,
        channel: &mut BoxedChannel,
        msg: &WireMessage,
    ) -> Result<(), SessionError> {
        let payload = encode(msg)?;
        channel.send(Bytes::from(payload)).await?;
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::MemoryTransport;
    use crate::transport::Transport;

    #[tokio::test]
    async fn destroy_closes_an_idle_host_session() {
        let transport = MemoryTransport::default();
        let endpoint = Arc::new(transport.bind().await.unwrap());
        let keys = Arc::new(SessionKeys::generate_blocking(1024).unwrap());

        let parts = spawn_session(Role::Host, SessionConfig::default(), keys, endpoint, None);
        assert_eq!(parts.session.phase(), SessionPhase::Connecting);
        assert!(!parts.session.is_authenticated());

        parts.session.destroy().await;
        parts.task.await.unwrap();

        assert!(matches!(parts.session.phase(), SessionPhase::Closed(_)));
        assert_eq!(parts.session.closed().await, REASON_SESSION_CLOSED);
        let err = parts.session.send_message("hi").await.unwrap_err();
        assert!(matches!(err, SessionError::Closed(_)));

        let rendered = format!("{:?}", parts.session);
        assert!(rendered.contains("PeerSession"));
        assert!(rendered.contains("Closed"));

        // destroying again is a no-op
        parts.session.destroy().await;
    }

    #[tokio::test]
    async fn send_before_handshake_is_rejected() {
        let transport = MemoryTransport::default();
        let endpoint = Arc::new(transport.bind().await.unwrap());
        let keys = Arc::new(SessionKeys::generate_blocking(1024).unwrap());

        let parts = spawn_session(
            Role::Host,
            SessionConfig::default(),
            keys,
            endpoint,
            None,
        );
        let err = parts.session.send_message("too early").await.unwrap_err();
        assert!(matches!(err, SessionError::NotAuthenticated));

        parts.session.destroy().await;
        parts.task.await.unwrap();
    }
}
