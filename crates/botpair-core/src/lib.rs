//! botpair Core - Shared types and configuration
//!
//! This crate provides the identity types and tunables used across all botpair components.

pub mod config;
pub mod error;
pub mod identity;

pub use config::Config;
pub use error::{Error, Result};
pub use identity::{User, UserIdentity};
