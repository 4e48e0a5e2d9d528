//! Race Engine
//!
//! Turn resolution for the card-driven cycling race. Deterministic given the
//! injected random source.
//!
//! ## Module Structure
//!
//! - `card`, `deck`: typed cards and pile bookkeeping
//! - `track`: terrain tokens and slipstream classes
//! - `rider`, `state`: rider records and the race snapshot
//! - `fixture`: caller-supplied starting data
//! - `stats`: favoritism and win/sprint chances
//! - `ai`: leadership estimator and pace selector
//! - `movement`: card selection and group movement
//! - `capacity`: bottleneck push-back cascade
//! - `sprint`: finish times and standings
//! - `events`: typed log records
//! - `turn`: entry points

pub mod card;
pub mod deck;
pub mod track;
pub mod rider;
pub mod state;
pub mod fixture;
pub mod stats;
pub mod ai;
pub mod movement;
pub mod capacity;
pub mod sprint;
pub mod events;
pub mod error;
pub mod turn;

// Re-export key types
pub use card::{Card, CardKind};
pub use track::{Track, Terrain, SlipstreamClass};
pub use rider::{Rider, AttackStatus, LeadIntent, PlannedCard};
pub use state::{RaceState, Standing, GroupMove};
pub use fixture::{Fixture, RiderSeed};
pub use events::{RaceEvent, RaceEventData};
pub use error::RaceError;
pub use turn::{RaceConfig, TurnResult, initialize, advance_group, resolve_sprints, next_round, play_round};
