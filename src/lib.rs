//! VideoVault Core Library
//!
//! Video asset lifecycle engine: ingestion of uploaded video files,
//! a durable catalog of tracked assets, asynchronous content-sensitivity
//! classification, and filtered catalog views.
//!
//! The presentation layer (pages, navigation, auth) lives outside this
//! crate and talks to the core exclusively through
//! [`core::vault::VideoVault`].

pub mod core;

use tracing_subscriber::EnvFilter;

/// Initializes the global tracing subscriber.
///
/// Respects `RUST_LOG` when set; defaults to `videovault=info` otherwise.
/// Safe to call more than once; later calls are no-ops.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("videovault=info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
