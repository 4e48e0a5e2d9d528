//! Core deterministic primitives.
//!
//! The random-source contract and state hashing the race engine is built on.

pub mod rng;
pub mod hash;

// Re-export core types
pub use rng::{DeterministicRng, RandomSource, ReplaySource};
pub use hash::{StateHash, StateHasher, compute_state_hash};
