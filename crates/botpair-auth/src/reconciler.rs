//! Background task matching bot messages to pending login requests
//!
//! Each tick fetches one batch of messages from the gateway, confirms the
//! requests whose tokens were sent to the bot and purges expired ones.
//! Gateway failures are logged and never stop the loop; only cancellation
//! does.

use crate::gateway::{Gateway, GatewayError, InboundMessage};
use crate::store::{RequestStore, StoreError};
use botpair_core::{Config, UserIdentity};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Tunables for the reconciler
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    pub poll_interval: Duration,
    pub command_prefix: String,
    pub error_msg: String,
    pub success_msg: String,
}

impl From<&Config> for ReconcilerConfig {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval: config.poll_interval,
            command_prefix: config.command_prefix.clone(),
            error_msg: config.error_msg.clone(),
            success_msg: config.success_msg.clone(),
        }
    }
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

/// Outcome counters for one tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Messages in the fetched batch
    pub received: usize,
    /// Messages outside of direct conversations
    pub ignored: usize,
    /// Unrecognized text or unknown token
    pub rejected: usize,
    /// Avatar lookup failed, confirmation forfeited
    pub dropped: usize,
    pub confirmed: usize,
    /// Expired requests removed after the batch
    pub purged: usize,
}

enum Outcome {
    Ignored,
    Rejected,
    Dropped,
    Confirmed,
}

/// Polls the gateway and confirms matching login requests
pub struct Reconciler {
    store: Arc<RequestStore>,
    gateway: Arc<dyn Gateway>,
    config: ReconcilerConfig,
}

impl Reconciler {
    /// Create a new reconciler
    pub fn new(
        store: Arc<RequestStore>,
        gateway: Arc<dyn Gateway>,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            config,
        }
    }

    /// Run ticks until `cancel` fires
    ///
    /// Cancellation is checked between ticks. A tick that overruns the
    /// interval is followed by the next one right away; missed ticks are not
    /// replayed.
    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            "Reconciler started, polling every {:?}",
            self.config.poll_interval
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!("Error while processing updates: {}", e);
                    }
                }
            }
        }

        info!("Reconciler stopped");
    }

    /// Process one batch of updates, then purge expired requests
    ///
    /// A failed fetch skips the purge too.
    pub async fn tick(&self) -> Result<TickReport, GatewayError> {
        let messages = self.gateway.fetch_updates().await?;

        let mut report = TickReport {
            received: messages.len(),
            ..Default::default()
        };

        for message in &messages {
            match self.process(message).await {
                Outcome::Ignored => report.ignored += 1,
                Outcome::Rejected => report.rejected += 1,
                Outcome::Dropped => report.dropped += 1,
                Outcome::Confirmed => report.confirmed += 1,
            }
        }

        report.purged = self.store.purge(Utc::now()).await;
        if report.purged > 0 {
            debug!("Purged {} expired login request(s)", report.purged);
        }

        Ok(report)
    }

    async fn process(&self, message: &InboundMessage) -> Outcome {
        if !message.is_direct() {
            return Outcome::Ignored;
        }

        let peer = message.chat.id;

        let Some(token) = self.parse_token(&message.text) else {
            self.notify(peer, &self.config.error_msg).await;
            return Outcome::Rejected;
        };

        // Same reply whether the token never existed, already expired or
        // was already claimed by another sender
        match self.store.get(token).await {
            Ok(request) if !request.confirmed => {}
            _ => {
                self.notify(peer, &self.config.error_msg).await;
                return Outcome::Rejected;
            }
        }

        // The message is already consumed from the gateway, so a failure
        // here forfeits this confirmation until the user retries.
        let avatar_url = match self.gateway.fetch_avatar(peer).await {
            Ok(url) => url,
            Err(e) => {
                warn!("Failed to get user avatar: {}", e);
                return Outcome::Dropped;
            }
        };

        let identity = UserIdentity {
            external_id: peer,
            display_name: message.chat.first_name.clone(),
            avatar_url,
        };

        match self.store.confirm(token, identity).await {
            Ok(()) => {}
            // Requester gave up or the request expired meanwhile
            Err(StoreError::NotFound) => {
                debug!("Login request vanished before confirmation");
                return Outcome::Dropped;
            }
            Err(StoreError::AlreadyConfirmed) => {
                warn!("Login request already confirmed, rejecting peer {}", peer);
                self.notify(peer, &self.config.error_msg).await;
                return Outcome::Rejected;
            }
            Err(e) => {
                warn!("Failed to confirm login request: {}", e);
                return Outcome::Dropped;
            }
        }

        self.notify(peer, &self.config.success_msg).await;
        Outcome::Confirmed
    }

    fn parse_token<'a>(&self, text: &'a str) -> Option<&'a str> {
        text.strip_prefix(self.config.command_prefix.as_str())
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }

    async fn notify(&self, peer: i64, text: &str) {
        if let Err(e) = self.gateway.send_message(peer, text).await {
            warn!("Failed to notify peer {}: {}", peer, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::{Chat, ChatKind, MemoryGateway};

    const TTL: Duration = Duration::from_secs(600);

    fn config() -> ReconcilerConfig {
        ReconcilerConfig {
            poll_interval: Duration::from_millis(10),
            command_prefix: "/start ".to_string(),
            error_msg: "error".to_string(),
            success_msg: "success".to_string(),
        }
    }

    fn setup() -> (Arc<RequestStore>, Arc<MemoryGateway>, Reconciler) {
        let store = Arc::new(RequestStore::new());
        let gateway = Arc::new(MemoryGateway::new());
        let reconciler = Reconciler::new(store.clone(), gateway.clone(), config());
        (store, gateway, reconciler)
    }

    #[tokio::test]
    async fn test_matching_message_confirms_request() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.set_avatar(42, "https://x/avatar.jpg");
        gateway.push_batch(vec![InboundMessage::private(1, 42, "Alice", "/start abc123")]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.confirmed, 1);

        let request = store.get("abc123").await.unwrap();
        assert!(request.confirmed);
        assert_eq!(
            request.identity,
            Some(UserIdentity {
                external_id: 42,
                display_name: "Alice".to_string(),
                avatar_url: "https://x/avatar.jpg".to_string(),
            })
        );
        assert_eq!(gateway.sent(), vec![(42, "success".to_string())]);
    }

    #[tokio::test]
    async fn test_unrecognized_text_is_rejected_without_mutation() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.push_batch(vec![InboundMessage::private(1, 42, "Alice", "hello bot")]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(gateway.sent(), vec![(42, "error".to_string())]);

        let request = store.get("abc123").await.unwrap();
        assert!(!request.confirmed);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_second_sender_cannot_take_over_login() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.set_avatar(42, "https://x/avatar.jpg");
        gateway.set_avatar(666, "https://x/mallory.jpg");
        gateway.push_batch(vec![
            InboundMessage::private(1, 42, "Alice", "/start abc123"),
            InboundMessage::private(2, 666, "Mallory", "/start abc123"),
        ]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.confirmed, 1);
        assert_eq!(report.rejected, 1);

        let identity = store.get("abc123").await.unwrap().identity.unwrap();
        assert_eq!(identity.external_id, 42);
        assert_eq!(identity.display_name, "Alice");
        assert_eq!(
            gateway.sent(),
            vec![(42, "success".to_string()), (666, "error".to_string())]
        );
    }

    #[tokio::test]
    async fn test_bare_command_is_rejected() {
        let (_store, gateway, reconciler) = setup();
        gateway.push_batch(vec![InboundMessage::private(1, 42, "Alice", "/start ")]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(gateway.sent(), vec![(42, "error".to_string())]);
    }

    #[tokio::test]
    async fn test_unknown_token_gets_generic_error() {
        let (store, gateway, reconciler) = setup();
        store.create("expired", Duration::ZERO).await.unwrap();
        gateway.push_batch(vec![
            InboundMessage::private(1, 42, "Alice", "/start nope"),
            InboundMessage::private(2, 43, "Bob", "/start expired"),
        ]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.rejected, 2);
        assert_eq!(
            gateway.sent(),
            vec![(42, "error".to_string()), (43, "error".to_string())]
        );
    }

    #[tokio::test]
    async fn test_group_messages_are_ignored() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.push_batch(vec![InboundMessage {
            update_id: 1,
            chat: Chat {
                id: -100,
                first_name: String::new(),
                kind: ChatKind::Group,
            },
            text: "/start abc123".to_string(),
        }]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.ignored, 1);
        assert!(gateway.sent().is_empty());
        assert!(!store.get("abc123").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_avatar_failure_drops_confirmation_for_good() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.fail_avatar(42, "timeout");
        gateway.push_batch(vec![InboundMessage::private(1, 42, "Alice", "/start abc123")]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(gateway.sent().is_empty());

        // The gateway does not redeliver; later ticks leave the request pending
        gateway.set_avatar(42, "https://x/avatar.jpg");
        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.received, 0);
        assert!(!store.get("abc123").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_send_failure_does_not_abort_batch() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.fail_sends(true);
        gateway.push_batch(vec![
            InboundMessage::private(1, 7, "Eve", "garbage"),
            InboundMessage::private(2, 42, "Alice", "/start abc123"),
        ]);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.rejected, 1);
        assert_eq!(report.confirmed, 1);
        assert!(store.get("abc123").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_fetch_failure_skips_tick_and_purge() {
        let (store, gateway, reconciler) = setup();
        store.create("stale", Duration::ZERO).await.unwrap();
        gateway.push_fetch_error("connection reset");

        assert!(reconciler.tick().await.is_err());
        assert_eq!(store.len().await, 1);

        let report = reconciler.tick().await.unwrap();
        assert_eq!(report.purged, 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_stops_on_cancel() {
        let (store, gateway, reconciler) = setup();
        store.create("abc123", TTL).await.unwrap();
        gateway.set_avatar(42, "");
        gateway.push_fetch_error("flaky");
        gateway.push_batch(vec![InboundMessage::private(1, 42, "Alice", "/start abc123")]);

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(reconciler.run(cancel.clone()));

        for _ in 0..100 {
            if store.get("abc123").await.map(|r| r.confirmed).unwrap_or(false) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(store.get("abc123").await.unwrap().confirmed);

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("reconciler did not stop")
            .unwrap();
    }
}
