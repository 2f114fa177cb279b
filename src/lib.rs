//! # Session Agent Library
//!
//! Client-side authentication session management: decodes the platform's
//! session credential, tracks its validity on a monotonic clock and
//! coordinates deduplicated refreshes through a host-supplied provider.
//!
//! Modules:
//! - `parser` — credential decoding into a claim set
//! - `cache` — the immutable session `Configuration`
//! - `session` — refresh coordination, correlation ids, provider listener
//! - `sources` — the provider contract and an HTTP provider
//! - `config` — service configuration loading and validation

pub mod cache;
pub mod config;
pub mod error;
pub mod helpers;
pub mod observability;
pub mod parser;
pub mod resilience;
pub mod server;
pub mod session;
pub mod sources;
pub mod utils;

#[cfg(test)]
mod tests;

pub use crate::cache::configuration::Configuration;
pub use crate::error::{SessionError, SessionResult};
pub use crate::parser::token_codec::{decode, ClaimSet};
pub use crate::session::{AuthTokenListener, CoordinatorOptions, CorrelationId, SessionCoordinator, SessionState};
pub use crate::sources::AuthTokenProvider;
