//! Login handshake driven by the web application
//!
//! `initiate` hands out a pairing token, `poll` trades a confirmed token for
//! a session. Confirmation itself only happens in the reconciler.

use crate::session::{AvatarProxy, SessionArtifact, SessionClaims, SessionIssuer};
use botpair_auth::{generate_token, RequestStore, StoreError};
use botpair_core::{Config, User};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

/// Handshake errors
///
/// The display text is what the HTTP layer shows to the caller.
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("request expired")]
    Expired,
    #[error("request not yet confirmed")]
    NotConfirmed,
    #[error("failed to generate code")]
    Create(StoreError),
    #[error("failed to save avatar to proxy")]
    AvatarSave(anyhow::Error),
    #[error("failed to set token")]
    SessionIssue(anyhow::Error),
}

pub type HandshakeResult<T> = Result<T, HandshakeError>;

/// A completed login
#[derive(Debug, Clone)]
pub struct Login {
    pub user: User,
    pub session: SessionArtifact,
}

/// Issues pairing tokens and exchanges confirmed ones for sessions
pub struct Handshake {
    store: Arc<RequestStore>,
    provider: String,
    token_ttl: Duration,
    call_timeout: Duration,
    avatars: Arc<dyn AvatarProxy>,
    sessions: Arc<dyn SessionIssuer>,
}

impl Handshake {
    /// Create a handshake over a shared request store
    pub fn new(
        store: Arc<RequestStore>,
        config: &Config,
        avatars: Arc<dyn AvatarProxy>,
        sessions: Arc<dyn SessionIssuer>,
    ) -> Self {
        Self {
            store,
            provider: config.provider_name.clone(),
            token_ttl: config.token_ttl,
            call_timeout: config.request_timeout,
            avatars,
            sessions,
        }
    }

    /// Provider name this handshake issues sessions for
    pub fn provider(&self) -> &str {
        &self.provider
    }

    /// Start a login: register and return a fresh pairing token
    pub async fn initiate(&self) -> HandshakeResult<String> {
        let token = generate_token();
        self.store
            .create(&token, self.token_ttl)
            .await
            .map_err(HandshakeError::Create)?;
        info!("Started {} login request", self.provider);
        Ok(token)
    }

    /// Exchange a confirmed token for a session
    ///
    /// The request is removed from the store before the session is issued.
    /// If issuing fails the token is gone and the user has to start over.
    pub async fn poll(&self, token: &str) -> HandshakeResult<Login> {
        let request = self.store.consume(token).await.map_err(|e| match e {
            StoreError::NotReady => HandshakeError::NotConfirmed,
            _ => HandshakeError::Expired,
        })?;
        let identity = request.identity.ok_or(HandshakeError::Expired)?;

        let user = User::from_identity(&self.provider, &identity);

        let user = self
            .bounded(self.avatars.save(user))
            .await
            .map_err(|e| {
                warn!("Failed to save avatar to proxy: {:#}", e);
                HandshakeError::AvatarSave(e)
            })?;

        let claims = SessionClaims {
            user: user.clone(),
            id: token.to_string(),
            issuer: self.provider.clone(),
        };
        let session = self
            .bounded(self.sessions.issue(claims))
            .await
            .map_err(|e| {
                warn!("Failed to set token: {:#}", e);
                HandshakeError::SessionIssue(e)
            })?;

        info!("User {} logged in via {}", user.id, self.provider);
        Ok(Login { user, session })
    }

    /// OAuth-style callback; logins are confirmed by the bot, not here
    pub fn callback(&self) {}

    /// End the caller's session
    pub async fn logout(&self, session_id: Option<&str>) -> SessionArtifact {
        self.sessions.reset(session_id).await
    }

    /// User behind a session cookie
    pub async fn current_user(&self, session_id: &str) -> Option<User> {
        self.sessions.lookup(session_id).await
    }

    async fn bounded<T>(
        &self,
        call: impl Future<Output = anyhow::Result<T>>,
    ) -> anyhow::Result<T> {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow::anyhow!("timed out after {:?}", self.call_timeout)),
        }
    }
}
