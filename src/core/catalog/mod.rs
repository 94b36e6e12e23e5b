//! Catalog Module
//!
//! Durable storage of asset records plus read-only derived views.

mod store;
mod views;

pub use store::*;
pub use views::*;
