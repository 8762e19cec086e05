//! In-memory store for login requests awaiting bot confirmation
//!
//! The store is the only state shared between HTTP handlers and the
//! reconciler task. Every operation takes the same lock, so a check and the
//! mutation that depends on it always happen together.

use botpair_core::UserIdentity;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Store errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Login request already exists")]
    AlreadyExists,
    #[error("Login request not found or expired")]
    NotFound,
    #[error("Login request not yet confirmed")]
    NotReady,
    #[error("Login request already confirmed")]
    AlreadyConfirmed,
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// A login request waiting for (or holding) its confirmation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest {
    pub token: String,
    pub confirmed: bool,
    pub expires_at: DateTime<Utc>,
    /// Set together with `confirmed`
    pub identity: Option<UserIdentity>,
}

impl PendingRequest {
    fn new(token: String, expires_at: DateTime<Utc>) -> Self {
        Self {
            token,
            confirmed: false,
            expires_at,
            identity: None,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Table of pairing tokens to pending login requests
#[derive(Debug, Default)]
pub struct RequestStore {
    requests: RwLock<HashMap<String, PendingRequest>>,
}

impl RequestStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new unconfirmed request expiring `ttl` from now
    pub async fn create(&self, token: &str, ttl: Duration) -> StoreResult<()> {
        let now = Utc::now();
        let expires_at = ChronoDuration::from_std(ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut requests = self.requests.write().await;
        if requests.contains_key(token) {
            return Err(StoreError::AlreadyExists);
        }
        requests.insert(
            token.to_string(),
            PendingRequest::new(token.to_string(), expires_at),
        );
        debug!("Created login request expiring at {}", expires_at);
        Ok(())
    }

    /// Look up a live request without modifying it
    pub async fn get(&self, token: &str) -> StoreResult<PendingRequest> {
        let now = Utc::now();
        let requests = self.requests.read().await;
        requests
            .get(token)
            .filter(|r| !r.is_expired(now))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    /// Attach a verified identity to a live request
    ///
    /// Confirming an expired request does nothing and reports `NotFound`.
    /// A request is confirmed at most once; later attempts leave the first
    /// identity in place and report `AlreadyConfirmed`.
    pub async fn confirm(&self, token: &str, identity: UserIdentity) -> StoreResult<()> {
        let now = Utc::now();
        let mut requests = self.requests.write().await;
        match requests.get_mut(token) {
            Some(request) if request.is_expired(now) => Err(StoreError::NotFound),
            Some(request) if request.confirmed => Err(StoreError::AlreadyConfirmed),
            Some(request) => {
                request.confirmed = true;
                request.identity = Some(identity);
                info!("Login request confirmed");
                Ok(())
            }
            _ => Err(StoreError::NotFound),
        }
    }

    /// Take a confirmed request out of the store
    ///
    /// Unconfirmed requests stay in place (`NotReady`). Expired ones are
    /// evicted and reported as `NotFound`.
    pub async fn consume(&self, token: &str) -> StoreResult<PendingRequest> {
        let now = Utc::now();
        let mut requests = self.requests.write().await;
        let (expired, confirmed) = match requests.get(token) {
            Some(request) => (request.is_expired(now), request.confirmed),
            None => return Err(StoreError::NotFound),
        };

        if expired {
            requests.remove(token);
            return Err(StoreError::NotFound);
        }
        if !confirmed {
            return Err(StoreError::NotReady);
        }

        requests.remove(token).ok_or(StoreError::NotFound)
    }

    /// Drop every request whose expiry is at or before `now`
    pub async fn purge(&self, now: DateTime<Utc>) -> usize {
        let mut requests = self.requests.write().await;
        let before = requests.len();
        requests.retain(|_, r| !r.is_expired(now));
        before - requests.len()
    }

    /// Number of requests currently held
    pub async fn len(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Whether the store holds no requests
    pub async fn is_empty(&self) -> bool {
        self.requests.read().await.is_empty()
    }
}
