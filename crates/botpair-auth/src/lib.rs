//! botpair Auth - Login confirmation through a messaging bot
//!
//! Holds pending login requests and reconciles them against messages sent to
//! the bot.
//!
//! # Login Flow
//!
//! 1. The web app creates a request with `generate_token()` + `RequestStore::create()`
//! 2. The user sends `/start <token>` to the bot
//! 3. The `Reconciler` sees the message, resolves the sender's avatar and
//!    calls `RequestStore::confirm()`
//! 4. The web app polls with `RequestStore::consume()` and gets the identity
//!    exactly once
//!
//! # Example
//!
//! ```no_run
//! use botpair_auth::{generate_token, Reconciler, ReconcilerConfig, RequestStore, TelegramGateway};
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//!
//! async fn example() {
//!     let store = Arc::new(RequestStore::new());
//!     let gateway = Arc::new(TelegramGateway::new("123:ABC", Duration::from_secs(5)).unwrap());
//!     let reconciler = Reconciler::new(store.clone(), gateway, ReconcilerConfig::default());
//!
//!     let cancel = CancellationToken::new();
//!     tokio::spawn(reconciler.run(cancel.clone()));
//!
//!     let token = generate_token();
//!     store.create(&token, Duration::from_secs(600)).await.unwrap();
//!     println!("Send /start {} to the bot", token);
//! }
//! ```

pub mod gateway;
pub mod reconciler;
pub mod store;
pub mod telegram;
pub mod token;

pub use gateway::{Chat, ChatKind, Gateway, GatewayError, GatewayResult, InboundMessage};
#[cfg(any(test, feature = "testing"))]
pub use gateway::MemoryGateway;
pub use reconciler::{Reconciler, ReconcilerConfig, TickReport};
pub use store::{PendingRequest, RequestStore, StoreError, StoreResult};
pub use telegram::{TelegramGateway, TELEGRAM_ENDPOINT};
pub use token::generate_token;
