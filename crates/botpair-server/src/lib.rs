//! botpair Server - Axum-based login endpoints
//!
//! This crate provides the HTTP surface of the bot login handshake and the
//! session-side collaborators it calls into.

pub mod handshake;
pub mod http;
pub mod session;
pub mod state;

pub use handshake::{Handshake, HandshakeError, HandshakeResult, Login};
pub use http::create_router;
pub use session::{
    AvatarProxy, MemorySessionIssuer, PassthroughAvatars, SessionArtifact, SessionClaims,
    SessionIssuer, SESSION_COOKIE,
};
pub use state::AppState;
