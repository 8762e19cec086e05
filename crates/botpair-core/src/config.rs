//! Configuration for botpair

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default reply when a message cannot be matched to a login request
pub const DEFAULT_ERROR_MSG: &str =
    "Login request not found or expired. Please start a new login from the website.";

/// Default reply after a login request has been confirmed
pub const DEFAULT_SUCCESS_MSG: &str =
    "Success! You can now return to the website, it will log you in automatically.";

/// Main configuration for botpair
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Provider name, used in routes, account ids and session issuer
    pub provider_name: String,
    /// How long a pairing token stays valid
    pub token_ttl: Duration,
    /// Interval between reconciler ticks
    pub poll_interval: Duration,
    /// Timeout for every call to the messaging platform
    pub request_timeout: Duration,
    /// Bot command that carries the pairing token, including the trailing space
    pub command_prefix: String,
    /// Reply sent on unrecognized messages or unknown tokens
    pub error_msg: String,
    /// Reply sent once a login request is confirmed
    pub success_msg: String,
    /// HTTP server port
    pub port: u16,
    /// Lifetime of an issued session
    pub session_ttl: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider_name: "telegram".to_string(),
            token_ttl: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(1),
            request_timeout: Duration::from_secs(5),
            command_prefix: "/start ".to_string(),
            error_msg: DEFAULT_ERROR_MSG.to_string(),
            success_msg: DEFAULT_SUCCESS_MSG.to_string(),
            port: 8080,
            session_ttl: Duration::from_secs(24 * 60 * 60),
        }
    }
}

impl Config {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder pattern: set provider name
    pub fn with_provider_name(mut self, name: impl Into<String>) -> Self {
        self.provider_name = name.into();
        self
    }

    /// Builder pattern: set pairing token lifetime
    pub fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    /// Builder pattern: set reconciler poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Builder pattern: set per-request timeout
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Builder pattern: set bot command prefix
    pub fn with_command_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.command_prefix = prefix.into();
        self
    }

    /// Builder pattern: set error reply
    pub fn with_error_msg(mut self, msg: impl Into<String>) -> Self {
        self.error_msg = msg.into();
        self
    }

    /// Builder pattern: set success reply
    pub fn with_success_msg(mut self, msg: impl Into<String>) -> Self {
        self.success_msg = msg.into();
        self
    }

    /// Builder pattern: set port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Builder pattern: set session lifetime
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    /// Check that the configuration can drive a running service
    pub fn validate(&self) -> Result<()> {
        if self.provider_name.is_empty() {
            return Err(Error::config("provider name must not be empty"));
        }
        if self.command_prefix.is_empty() {
            return Err(Error::config("command prefix must not be empty"));
        }
        // tokio::time::interval panics on a zero period
        if self.poll_interval.is_zero() {
            return Err(Error::config("poll interval must be greater than zero"));
        }
        if self.token_ttl.is_zero() {
            return Err(Error::config("token lifetime must be greater than zero"));
        }
        Ok(())
    }
}
