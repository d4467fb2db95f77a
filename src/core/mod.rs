//! Core deterministic primitives.
//!
//! Everything resolution outcomes depend on lives here and depends only on
//! its inputs.

pub mod score;
pub mod seed;

// Re-export core types
pub use score::{score, contention_key, contention_score};
pub use seed::{SeedSource, RandomSeeds, FixedSeed, derive_turn_seed};
