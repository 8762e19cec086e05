//! Messaging platform capabilities consumed by the reconciler

use async_trait::async_trait;
use serde::Deserialize;
#[cfg(any(test, feature = "testing"))]
use std::collections::{HashMap, VecDeque};
#[cfg(any(test, feature = "testing"))]
use std::sync::Mutex;
use thiserror::Error;

/// Gateway errors
///
/// All of them are transient from the reconciler's point of view.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Platform returned error: {0}")]
    Api(String),
    #[error("Platform returned {0} status code")]
    Status(u16),
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// Kind of conversation a message arrived in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// One-to-one conversation with the bot
    Private,
    Group,
    Supergroup,
    Channel,
    #[default]
    #[serde(other)]
    Other,
}

/// Conversation the message was sent in
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(rename = "type", default)]
    pub kind: ChatKind,
}

/// A message received by the bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub update_id: i64,
    pub chat: Chat,
    pub text: String,
}

impl InboundMessage {
    /// Build a direct message, mostly useful in tests
    pub fn private(update_id: i64, peer_id: i64, name: &str, text: &str) -> Self {
        Self {
            update_id,
            chat: Chat {
                id: peer_id,
                first_name: name.to_string(),
                kind: ChatKind::Private,
            },
            text: text.to_string(),
        }
    }

    /// Whether the message came from a one-to-one conversation
    pub fn is_direct(&self) -> bool {
        self.chat.kind == ChatKind::Private
    }
}

/// Capabilities of a messaging backend
///
/// Implementations own their read cursor: a message returned by
/// `fetch_updates` is never returned again by the same instance.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Fetch the next batch of inbound messages
    async fn fetch_updates(&self) -> GatewayResult<Vec<InboundMessage>>;

    /// Send a text message to a peer
    async fn send_message(&self, peer_id: i64, text: &str) -> GatewayResult<()>;

    /// Resolve a peer's avatar URL, empty when there is none
    async fn fetch_avatar(&self, peer_id: i64) -> GatewayResult<String>;
}

/// In-memory gateway replaying scripted batches
///
/// Each `fetch_updates` call pops one queued batch (or an empty batch once the
/// script runs out). Sent messages are recorded for inspection.
#[cfg(any(test, feature = "testing"))]
#[derive(Debug, Default)]
pub struct MemoryGateway {
    batches: Mutex<VecDeque<Result<Vec<InboundMessage>, String>>>,
    avatars: Mutex<HashMap<i64, Result<String, String>>>,
    send_failures: Mutex<bool>,
    sent: Mutex<Vec<(i64, String)>>,
}

#[cfg(any(test, feature = "testing"))]
impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a batch for a later fetch
    pub fn push_batch(&self, batch: Vec<InboundMessage>) {
        lock(&self.batches).push_back(Ok(batch));
    }

    /// Queue a failing fetch
    pub fn push_fetch_error(&self, message: &str) {
        lock(&self.batches).push_back(Err(message.to_string()));
    }

    /// Set the avatar returned for a peer
    pub fn set_avatar(&self, peer_id: i64, url: &str) {
        lock(&self.avatars).insert(peer_id, Ok(url.to_string()));
    }

    /// Make avatar lookups for a peer fail
    pub fn fail_avatar(&self, peer_id: i64, message: &str) {
        lock(&self.avatars).insert(peer_id, Err(message.to_string()));
    }

    /// Make every send fail (messages are still recorded)
    pub fn fail_sends(&self, fail: bool) {
        *lock(&self.send_failures) = fail;
    }

    /// Messages sent so far, as `(peer_id, text)`
    pub fn sent(&self) -> Vec<(i64, String)> {
        lock(&self.sent).clone()
    }
}

#[cfg(any(test, feature = "testing"))]
fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(any(test, feature = "testing"))]
#[async_trait]
impl Gateway for MemoryGateway {
    async fn fetch_updates(&self) -> GatewayResult<Vec<InboundMessage>> {
        match lock(&self.batches).pop_front() {
            Some(Ok(batch)) => Ok(batch),
            Some(Err(message)) => Err(GatewayError::Api(message)),
            None => Ok(Vec::new()),
        }
    }

    async fn send_message(&self, peer_id: i64, text: &str) -> GatewayResult<()> {
        lock(&self.sent).push((peer_id, text.to_string()));
        if *lock(&self.send_failures) {
            return Err(GatewayError::Status(502));
        }
        Ok(())
    }

    async fn fetch_avatar(&self, peer_id: i64) -> GatewayResult<String> {
        match lock(&self.avatars).get(&peer_id) {
            Some(Ok(url)) => Ok(url.clone()),
            Some(Err(message)) => Err(GatewayError::Api(message.clone())),
            None => Ok(String::new()),
        }
    }
}
