//! # HTTP API
//!
//! The axum surface of the Herald service: materialization, provisioning,
//! health, audit queries, inventory, rotation fan-out, and cache management.
//! Routes other than `/ping` and `/v1/health` require the configured bearer
//! token and cap request bodies at 1 MiB.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod state;
pub mod watcher;

pub use routes::build_router;
pub use server::serve;
pub use state::AppState;
