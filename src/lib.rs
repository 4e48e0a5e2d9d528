//! # Peloton Engine
//!
//! Deterministic turn resolution for a card-driven cycling race.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     PELOTON ENGINE                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  core/           - Deterministic primitives                  │
//! │  ├── rng.rs      - Random source contract, Xorshift128+      │
//! │  └── hash.rs     - State hashing for verification            │
//! │                                                              │
//! │  race/           - Race engine                               │
//! │  ├── card.rs     - Typed cards                               │
//! │  ├── deck.rs     - Hand, discard, reshuffle, fatigue         │
//! │  ├── track.rs    - Terrain tokens and slipstream             │
//! │  ├── ai.rs       - Leadership estimator, pace selector       │
//! │  ├── movement.rs - Card selection and group movement         │
//! │  ├── capacity.rs - Bottleneck push-back cascade              │
//! │  ├── sprint.rs   - Finish times and standings                │
//! │  └── turn.rs     - Entry points                              │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Determinism Guarantee
//!
//! - No HashMap (uses BTreeMap for sorted iteration)
//! - No system time dependencies
//! - All randomness from the caller's [`RandomSource`]
//!
//! Given the same snapshot and the same sequence of draws, every entry
//! point returns a byte-identical snapshot and log.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

pub mod core;
pub mod race;

// Re-export commonly used types
pub use core::rng::{DeterministicRng, RandomSource, ReplaySource};
pub use core::hash::StateHash;
pub use race::{
    Card, CardKind, Fixture, RaceConfig, RaceError, RaceEvent, RaceState, Rider, RiderSeed,
    Standing, Track, TurnResult,
};
pub use race::turn::{advance_group, initialize, next_round, play_round, resolve_sprints};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
