//! Shared application state

use crate::handshake::Handshake;

/// Shared application state
pub struct AppState {
    /// Login handshake over the shared request store
    pub handshake: Handshake,
}

impl AppState {
    /// Create a new application state
    pub fn new(handshake: Handshake) -> Self {
        Self { handshake }
    }
}
