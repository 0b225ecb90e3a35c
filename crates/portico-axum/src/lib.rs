/* crates/portico-axum/src/lib.rs */

//! Axum adapter for the Portico core. The manager loads configuration,
//! discovers the view tree, registers it into a routing table and serves it
//! over axum with per-subdomain routers, signed sessions and error pages.

mod error;
mod handler;
mod manager;

pub use manager::{App, Manager, ManagerConfig};

// The core crate is re-exported so applications depend on one crate.
pub use portico_server as server;

/// Install the default tracing subscriber, honoring `RUST_LOG` when set.
pub fn init_tracing() {
  use tracing_subscriber::EnvFilter;

  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
    .init();
}
