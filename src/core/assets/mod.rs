//! Asset Module
//!
//! Entity model for tracked video assets.

mod models;

pub use models::*;
