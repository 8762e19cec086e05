//! Telegram Bot API gateway
//!
//! Talks to `https://api.telegram.org/bot<token>/<method>` over plain GET
//! requests, tracking the `getUpdates` offset so each update is seen once.

use crate::gateway::{Chat, Gateway, GatewayError, GatewayResult, InboundMessage};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::debug;

/// Public Bot API endpoint
pub const TELEGRAM_ENDPOINT: &str = "https://api.telegram.org";

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: T,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    description: String,
}

#[derive(Debug, Deserialize)]
struct Update {
    update_id: i64,
    #[serde(default)]
    message: Option<Message>,
}

#[derive(Debug, Deserialize)]
struct Message {
    chat: Chat,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ProfilePhotos {
    photos: Vec<Vec<PhotoSize>>,
}

#[derive(Debug, Deserialize)]
struct PhotoSize {
    file_id: String,
}

#[derive(Debug, Deserialize)]
struct File {
    file_path: String,
}

/// Gateway backed by the Telegram Bot API
pub struct TelegramGateway {
    client: reqwest::Client,
    endpoint: String,
    token: String,
    update_offset: AtomicI64,
}

impl TelegramGateway {
    /// Create a gateway for the public Bot API
    pub fn new(token: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        Self::with_endpoint(TELEGRAM_ENDPOINT, token, timeout)
    }

    /// Create a gateway against a custom endpoint (local Bot API server, tests)
    pub fn with_endpoint(
        endpoint: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> GatewayResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token: token.into(),
            update_offset: AtomicI64::new(0),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.endpoint, self.token, method)
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        query: &[(&str, String)],
    ) -> GatewayResult<T> {
        let response = self
            .client
            .get(self.method_url(method))
            .query(query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(match response.json::<ApiError>().await {
                Ok(err) => GatewayError::Api(err.description),
                Err(_) => GatewayError::Status(status.as_u16()),
            });
        }

        let body: ApiResponse<T> = response.json().await?;
        Ok(body.result)
    }
}

#[async_trait]
impl Gateway for TelegramGateway {
    async fn fetch_updates(&self) -> GatewayResult<Vec<InboundMessage>> {
        let mut query = vec![("allowed_updates", r#"["message"]"#.to_string())];
        let offset = self.update_offset.load(Ordering::SeqCst);
        if offset != 0 {
            query.push(("offset", offset.to_string()));
        }

        let updates: Vec<Update> = self.request("getUpdates", &query).await?;

        if let Some(last) = updates.iter().map(|u| u.update_id).max() {
            self.update_offset.fetch_max(last + 1, Ordering::SeqCst);
        }
        debug!("Fetched {} update(s) from Telegram", updates.len());

        Ok(updates
            .into_iter()
            .filter_map(|update| {
                update.message.map(|message| InboundMessage {
                    update_id: update.update_id,
                    chat: message.chat,
                    text: message.text,
                })
            })
            .collect())
    }

    async fn send_message(&self, peer_id: i64, text: &str) -> GatewayResult<()> {
        let response = self
            .client
            .get(self.method_url("sendMessage"))
            .query(&[("chat_id", peer_id.to_string()), ("text", text.to_string())])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status().as_u16()));
        }
        Ok(())
    }

    async fn fetch_avatar(&self, peer_id: i64) -> GatewayResult<String> {
        let photos: ProfilePhotos = self
            .request("getUserProfilePhotos", &[("user_id", peer_id.to_string())])
            .await?;

        // No profile picture, or hidden by privacy settings
        let Some(largest) = photos.photos.first().and_then(|sizes| sizes.last()) else {
            return Ok(String::new());
        };

        let file: File = self
            .request("getFile", &[("file_id", largest.file_id.clone())])
            .await?;

        Ok(format!(
            "{}/file/bot{}/{}",
            self.endpoint, self.token, file.file_path
        ))
    }
}
