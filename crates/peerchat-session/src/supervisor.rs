//! Connection supervisor: owns the transport endpoint and at most one
//! session at a time, and drives role transitions. Hosting or
//! connecting while a session exists tears the old session down first;
//! the endpoint itself survives across sessions.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use peerchat_crypto::SessionKeys;

use crate::config::SessionConfig;
use crate::error::SessionError;
use crate::handshake::Role;
use crate::session::{spawn_session, PeerSession, SessionPhase};
use crate::transport::{Endpoint, Transport};

struct ActiveSession {
    session: PeerSession,
    task: JoinHandle<()>,
}

pub struct ConnectionSupervisor {
    transport: Arc<dyn Transport>,
    config: SessionConfig,
    endpoint: Option<Arc<Endpoint>>,
    active: Option<ActiveSession>,
}

impl ConnectionSupervisor {
    pub fn new(transport: Arc<dyn Transport>, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            endpoint: None,
            active: None,
        }
    }

    /// The endpoint id peers dial to reach us, once bound.
    pub fn local_id(&self) -> Option<&str> {
        self.endpoint.as_deref().map(Endpoint::local_id)
    }

    pub fn session(&self) -> Option<&PeerSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Become a host: generate fresh keys and wait for a peer to dial
    /// in. Returns immediately with the handle; the session
    /// authenticates in the background once a peer arrives.
    pub async fn host(&mut self) -> Result<PeerSession, SessionError> {
        self.destroy_session().await;

        let keys = Arc::new(SessionKeys::generate(self.config.key_bits).await?);
        let endpoint = self.ensure_endpoint().await?;
        info!(local_id = endpoint.local_id(), "hosting, waiting for a peer");

        let parts = spawn_session(Role::Host, self.config.clone(), keys, endpoint, None);
        let session = parts.session.clone();
        self.active = Some(ActiveSession {
            session: parts.session,
            task: parts.task,
        });
        Ok(session)
    }

    /// Dial `remote_id` and run the handshake as the client. Resolves
    /// once the session is authenticated, or fails with the handshake
    /// outcome (timeout included); on failure the session is destroyed.
    pub async fn connect(&mut self, remote_id: &str) -> Result<PeerSession, SessionError> {
        self.destroy_session().await;

        let keys = Arc::new(SessionKeys::generate(self.config.key_bits).await?);
        let endpoint = self.ensure_endpoint().await?;
        info!(local_id = endpoint.local_id(), remote_id, "connecting");

        let channel = endpoint.open(remote_id).await?;
        let mut parts = spawn_session(
            Role::Client,
            self.config.clone(),
            keys,
            endpoint,
            Some(channel),
        );
        let session = parts.session.clone();
        self.active = Some(ActiveSession {
            session: parts.session,
            task: parts.task,
        });

        let settled = tokio::time::timeout(
            self.config.connect_timeout(),
            parts
                .phase
                .wait_for(|phase| !matches!(phase, SessionPhase::Connecting)),
        )
        .await;

        match settled {
            Err(_) => {
                warn!(remote_id, "handshake did not settle within connect timeout");
                self.destroy_session().await;
                Err(SessionError::HandshakeTimeout)
            }
            // the watch sender lives in the session task, so this only
            // fails if the task died without publishing a phase
            Ok(Err(_)) => {
                self.destroy_session().await;
                Err(SessionError::Closed("session task stopped".to_owned()))
            }
            Ok(Ok(phase)) => {
                // clone out of the watch guard before any teardown
                // await, the session task needs the write side
                let snapshot = (*phase).clone();
                drop(phase);
                match snapshot {
                    SessionPhase::Closed(reason) => {
                        self.destroy_session().await;
                        Err(SessionError::from_disconnect_reason(&reason))
                    }
                    _ => Ok(session),
                }
            }
        }
    }

    /// Tear down the active session, if any, and wait for its task to
    /// finish. The endpoint stays bound.
    pub async fn destroy_session(&mut self) {
        if let Some(active) = self.active.take() {
            active.session.destroy().await;
            if let Err(e) = active.task.await {
                warn!(error = %e, "session task did not exit cleanly");
            }
        }
    }

    /// Full teardown: the session and the endpoint both go away.
    pub async fn destroy(&mut self) {
        self.destroy_session().await;
        if self.endpoint.take().is_some() {
            debug!("transport endpoint released");
        }
    }

    async fn ensure_endpoint(&mut self) -> Result<Arc<Endpoint>, SessionError> {
        if let Some(endpoint) = &self.endpoint {
            return Ok(endpoint.clone());
        }
        let endpoint = Arc::new(self.transport.bind().await?);
        info!(local_id = endpoint.local_id(), "transport endpoint bound");
        self.endpoint = Some(endpoint.clone());
        Ok(endpoint)
    }
}
