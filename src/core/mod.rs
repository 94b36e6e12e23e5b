//! VideoVault Core Engine
//!
//! Core module tree. Handles asset ingestion, catalog storage,
//! classification jobs, and derived catalog views.

pub mod assets;
pub mod catalog;
pub mod classify;
pub mod events;
pub mod fs;
pub mod ingest;
pub mod settings;
pub mod vault;

// Re-export common types
mod types;
pub use types::*;

mod error;
pub use error::*;

#[cfg(test)]
mod tests_pipeline;
