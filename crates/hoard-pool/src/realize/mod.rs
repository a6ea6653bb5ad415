//! Realization of pool assets
//!
//! This module copies pool-resident assets to fixed locations outside the
//! pool. Realized files are plain copies and are never evicted.

pub mod realizer;

// Re-export main types
pub use realizer::{RealizeOutcome, RealizeReport, RealizedFile, Realizer};
