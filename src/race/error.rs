//! Race Errors
//!
//! Hard faults only. Per-rider problems are logged and recovered inside the
//! resolver and never surface here.

/// Structurally invalid input handed to an entry point.
#[derive(Debug, thiserror::Error)]
pub enum RaceError {
    /// Track string is empty.
    #[error("track is missing or empty")]
    MissingTrack,

    /// Track has no finish token.
    #[error("track has no finish token 'F'")]
    MissingFinish,

    /// Track contains a character that is not a terrain token.
    #[error("unknown track token {token:?} at index {index}")]
    UnknownTrackToken {
        /// Offending character.
        token: char,
        /// Character index in the source string.
        index: usize,
    },

    /// Cobbled-finale marker appears somewhere other than the end.
    #[error("cobbled-finale marker must be the last token (found at index {index})")]
    MisplacedFinaleMarker {
        /// Character index in the source string.
        index: usize,
    },

    /// No riders to race.
    #[error("race has no riders")]
    EmptyField,

    /// A rider record cannot be used at all.
    #[error("invalid rider {name:?}: {reason}")]
    InvalidRider {
        /// Rider key.
        name: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Fixture or config JSON failed to parse.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}
