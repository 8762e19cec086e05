//! Identity types
//!
//! `UserIdentity` is what the messaging platform tells us about a sender.
//! `User` is what the web application gets back once a login completes.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// External profile data of a messaging platform user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserIdentity {
    /// Numeric user id on the messaging platform
    pub external_id: i64,
    /// Display name (first name on Telegram)
    pub display_name: String,
    /// Avatar URL, empty when the user has none or hides it
    pub avatar_url: String,
}

/// Identity handed to the web application
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub name: String,
    pub id: String,
    #[serde(default)]
    pub picture: String,
}

impl User {
    /// Build the public identity for a confirmed login.
    ///
    /// The account id is namespaced by provider and derived through a one-way
    /// hash, so the platform's numeric id never leaves the server.
    pub fn from_identity(provider: &str, identity: &UserIdentity) -> Self {
        Self {
            name: identity.display_name.clone(),
            id: format!("{}_{}", provider, hash_id(&identity.external_id.to_string())),
            picture: identity.avatar_url.clone(),
        }
    }
}

/// Hex-encoded SHA-256 of an external id
pub fn hash_id(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}
