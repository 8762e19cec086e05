//! Session-side collaborators of the login handshake
//!
//! `AvatarProxy` rewrites the platform avatar URL before it reaches the web
//! app, `SessionIssuer` turns a completed login into a cookie.

use async_trait::async_trait;
use botpair_auth::generate_token;
use botpair_core::User;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Name of the session cookie set by `MemorySessionIssuer`
pub const SESSION_COOKIE: &str = "botpair_session";

/// Stores or proxies user avatars
#[async_trait]
pub trait AvatarProxy: Send + Sync {
    /// Return the user with a locally served avatar URL
    async fn save(&self, user: User) -> anyhow::Result<User>;
}

/// Keeps the platform's avatar URL as is
pub struct PassthroughAvatars;

#[async_trait]
impl AvatarProxy for PassthroughAvatars {
    async fn save(&self, user: User) -> anyhow::Result<User> {
        Ok(user)
    }
}

/// What a session is issued for
#[derive(Debug, Clone, Serialize)]
pub struct SessionClaims {
    pub user: User,
    /// Pairing token the login completed with
    pub id: String,
    /// Provider that vouched for the user
    pub issuer: String,
}

/// Result of issuing or resetting a session, written to the response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionArtifact {
    /// Value for the `Set-Cookie` header
    pub set_cookie: String,
}

/// Issues and clears sessions
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    /// Create a session for a completed login
    async fn issue(&self, claims: SessionClaims) -> anyhow::Result<SessionArtifact>;

    /// End the session identified by the request's cookie, if any
    async fn reset(&self, session_id: Option<&str>) -> SessionArtifact;

    /// Resolve the user behind a session cookie
    async fn lookup(&self, session_id: &str) -> Option<User>;
}

struct Session {
    claims: SessionClaims,
    expires_at: DateTime<Utc>,
}

/// Session table kept in process memory
pub struct MemorySessionIssuer {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: Duration,
}

impl MemorySessionIssuer {
    /// Create an issuer whose sessions last `ttl`
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    fn cookie(&self, value: &str, max_age: u64) -> String {
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
            SESSION_COOKIE, value, max_age
        )
    }
}

#[async_trait]
impl SessionIssuer for MemorySessionIssuer {
    async fn issue(&self, claims: SessionClaims) -> anyhow::Result<SessionArtifact> {
        let ttl = ChronoDuration::from_std(self.ttl)?;
        let expires_at = Utc::now()
            .checked_add_signed(ttl)
            .ok_or_else(|| anyhow::anyhow!("session lifetime out of range"))?;

        let session_id = generate_token();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.expires_at > Utc::now());

        info!("Issued session for {} via {}", claims.user.id, claims.issuer);
        sessions.insert(session_id.clone(), Session { claims, expires_at });

        Ok(SessionArtifact {
            set_cookie: self.cookie(&session_id, self.ttl.as_secs()),
        })
    }

    async fn reset(&self, session_id: Option<&str>) -> SessionArtifact {
        if let Some(id) = session_id {
            if self.sessions.write().await.remove(id).is_some() {
                debug!("Session removed");
            }
        }
        SessionArtifact {
            set_cookie: self.cookie("", 0),
        }
    }

    async fn lookup(&self, session_id: &str) -> Option<User> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| s.expires_at > Utc::now())
            .map(|s| s.claims.user.clone())
    }
}

/// Extract a cookie value from a `Cookie` header
pub fn cookie_value<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key == name).then_some(value)
    })
}
