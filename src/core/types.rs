//! VideoVault Core Type Definitions
//!
//! Fundamental types used throughout the crate.

// =============================================================================
// ID Types
// =============================================================================

/// Asset unique identifier (ULID)
pub type AssetId = String;

/// Classification job unique identifier (ULID)
pub type JobId = String;

// =============================================================================
// Progress
// =============================================================================

/// Upload progress is expressed in whole percent, 0..=100.
pub const PROGRESS_COMPLETE: u8 = 100;
