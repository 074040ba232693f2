//! # Herald
//!
//! Herald is a sidecar secrets-materialization service. It takes env-file
//! templates containing `op://VAULT/ITEM/FIELD` references, resolves each
//! reference against an ordered list of secret-provider backends, and returns
//! (or writes) the plaintext env file with every reference substituted —
//! including references embedded inside longer values such as connection
//! strings.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API → Materializer → Provider Manager → Connect / Service-Account
//!    ↓            ↓
//! Stack Index  Encrypted Cache (redb, AES-256-GCM)
//!    ↓            ↓
//! Audit Log    Health Watcher → Orchestrator Alerts
//! ```
//!
//! ## Core Components
//!
//! - **Resolver**: `op://` URI parsing, env scanning, substitution
//! - **Provider Manager**: prioritized fallback across unreliable backends
//! - **Encrypted Cache**: two-tier store with TTL, stale reads, invalidation
//! - **Stack Index**: persistent stack → items mapping driving rotation
//! - **Audit Log**: append-only JSONL with retention pruning
//! - **Health Watcher**: transition-based alerting and JWT-expiry warnings

pub mod api;
pub mod audit;
pub mod cache;
pub mod config;
pub mod errors;
pub mod index;
pub mod materialize;
pub mod orchestrator;
pub mod provider;
pub mod provision;
pub mod resolver;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{Error, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
