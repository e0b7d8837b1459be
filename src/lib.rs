//! # Auriga - Tesla Owner API client
//!
//! A Rust client for the Tesla Owner API: OAuth2 authorization-code
//! login with PKCE, persisted bearer tokens with transparent refresh, a
//! named-endpoint dispatch table, vehicle and energy product proxies,
//! the wake-up poll protocol, and streaming telemetry.
//!
//! ## Architecture
//!
//! The crate follows a modular architecture with clear separation of concerns:
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `error`: Error taxonomy shared across the crate
//! - `token`: Persisted token cache
//! - `auth`: OAuth2 session and the request choke point
//! - `endpoints`: Named-endpoint registry
//! - `client`: API client and envelope unwrapping
//! - `entity`: Cached product state with merge semantics
//! - `vehicle`: Vehicle proxy and the wake-up protocol
//! - `energy`: Battery and solar panel proxies
//! - `stream`: Streaming telemetry push channel
//! - `cli`: Command-line front-end

pub mod auth;
pub mod cli;
pub mod client;
pub mod config;
pub mod endpoints;
pub mod energy;
pub mod entity;
pub mod error;
pub mod logging;
pub mod stream;
pub mod token;
pub mod vehicle;

// Re-export commonly used types
pub use auth::AuthSession;
pub use client::ApiClient;
pub use config::Config;
pub use energy::{Battery, SolarPanel};
pub use error::{AurigaError, Result};
pub use vehicle::Vehicle;
