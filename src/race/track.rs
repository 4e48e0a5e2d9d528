//! Track and Slipstream Model
//!
//! Parses the track token string and answers terrain questions by position.
//!
//! Tokens: `0` narrow, `1` hard climb, `2` mixed, `3` plain, `_` descent,
//! `F` finish (first occurrence is the finish line), trailing `B` marks a
//! cobbled finale. Whitespace is ignored.

use std::fmt;
use serde::{Serialize, Deserialize};

use crate::race::card::Card;
use crate::race::error::RaceError;

/// Effective value floor for a rider starting on a descent tile.
pub const DESCENT_MIN_VALUE: u32 = 5;

/// Terrain of a single tile.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Terrain {
    /// Narrow or soft section (`0`).
    Narrow,
    /// Hard climb (`1`).
    Climb,
    /// Mixed terrain (`2`).
    Mixed,
    /// Open road (`3`).
    Plain,
    /// Descent (`_`). Never blocks slipstream.
    Descent,
    /// Finish line and run-out (`F`).
    Finish,
}

impl Terrain {
    /// Parse a single token.
    pub fn from_token(token: char) -> Option<Self> {
        match token {
            '0' => Some(Terrain::Narrow),
            '1' => Some(Terrain::Climb),
            '2' => Some(Terrain::Mixed),
            '3' => Some(Terrain::Plain),
            '_' => Some(Terrain::Descent),
            'F' => Some(Terrain::Finish),
            _ => None,
        }
    }

    /// Token character for this terrain.
    pub fn token(self) -> char {
        match self {
            Terrain::Narrow => '0',
            Terrain::Climb => '1',
            Terrain::Mixed => '2',
            Terrain::Plain => '3',
            Terrain::Descent => '_',
            Terrain::Finish => 'F',
        }
    }

    /// Slipstream class of this tile. Descent has none.
    pub fn slipstream_class(self) -> Option<SlipstreamClass> {
        match self {
            Terrain::Narrow => Some(SlipstreamClass::Narrow),
            Terrain::Climb => Some(SlipstreamClass::Climb),
            Terrain::Mixed => Some(SlipstreamClass::Mixed),
            Terrain::Plain | Terrain::Finish => Some(SlipstreamClass::Open),
            Terrain::Descent => None,
        }
    }

    /// Occupancy fraction `(numerator, denominator)` for capacity-limited tiles.
    pub fn capacity_fraction(self) -> Option<(u32, u32)> {
        match self {
            Terrain::Narrow => Some((1, 4)),
            Terrain::Climb => Some((1, 3)),
            Terrain::Mixed => Some((1, 2)),
            _ => None,
        }
    }

    /// Is this tile subject to capacity enforcement?
    #[inline]
    pub fn is_bottleneck(self) -> bool {
        self.capacity_fraction().is_some()
    }
}

/// Worst terrain class between two positions. Lower is harder.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum SlipstreamClass {
    /// Narrow section, no shelter.
    Narrow = 0,
    /// Hard climb.
    Climb = 1,
    /// Mixed terrain.
    Mixed = 2,
    /// Open road.
    Open = 3,
}

impl SlipstreamClass {
    /// Index into per-class tables.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }
}

/// Parsed track.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Track {
    tiles: Vec<Terrain>,
    finish: u32,
    cobbled_finale: bool,
}

impl Track {
    /// Parse a track token string.
    pub fn parse(source: &str) -> Result<Self, RaceError> {
        let tokens: Vec<(usize, char)> = source
            .chars()
            .enumerate()
            .filter(|(_, c)| !c.is_whitespace())
            .collect();

        if tokens.is_empty() {
            return Err(RaceError::MissingTrack);
        }

        let mut tiles = Vec::with_capacity(tokens.len());
        let mut cobbled_finale = false;
        for (i, &(index, token)) in tokens.iter().enumerate() {
            if token == 'B' {
                if i + 1 != tokens.len() {
                    return Err(RaceError::MisplacedFinaleMarker { index });
                }
                cobbled_finale = true;
                continue;
            }
            let terrain =
                Terrain::from_token(token).ok_or(RaceError::UnknownTrackToken { token, index })?;
            tiles.push(terrain);
        }

        let finish = tiles
            .iter()
            .position(|t| *t == Terrain::Finish)
            .ok_or(RaceError::MissingFinish)? as u32;

        Ok(Self { tiles, finish, cobbled_finale })
    }

    /// Index of the finish line.
    #[inline]
    pub fn finish_index(&self) -> u32 {
        self.finish
    }

    /// Does the race end on cobbles?
    #[inline]
    pub fn cobbled_finale(&self) -> bool {
        self.cobbled_finale
    }

    /// Number of tiles.
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    /// Is the track empty? Never true for a parsed track.
    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    /// Terrain at a position. Anything past the last tile is run-out.
    pub fn terrain_at(&self, position: u32) -> Terrain {
        self.tiles
            .get(position as usize)
            .copied()
            .unwrap_or(Terrain::Finish)
    }

    /// Is the tile at `position` a descent?
    #[inline]
    pub fn is_descent(&self, position: u32) -> bool {
        self.terrain_at(position) == Terrain::Descent
    }

    /// Fields left to the finish line.
    #[inline]
    pub fn remaining(&self, position: u32) -> u32 {
        self.finish.saturating_sub(position)
    }

    /// Worst slipstream class on `[a, b]`.
    ///
    /// Descent tiles do not count and push the window one tile further
    /// for every one encountered.
    pub fn slipstream_class(&self, a: u32, b: u32) -> SlipstreamClass {
        let mut end = a.max(b);
        let limit = self.tiles.len() as u32 + end;
        let mut worst = SlipstreamClass::Open;
        let mut pos = a.min(b);

        while pos <= end {
            match self.terrain_at(pos).slipstream_class() {
                Some(class) => worst = worst.min(class),
                None if end < limit => end += 1,
                None => {}
            }
            pos += 1;
        }
        worst
    }

    /// Number of descent tiles in `(from, to]`.
    pub fn descents_between(&self, from: u32, to: u32) -> u32 {
        ((from + 1)..=to).filter(|p| self.is_descent(*p)).count() as u32
    }

    /// Value of `card` for a rider at `position`, before penalties.
    ///
    /// The terrain class is read over the stretch the card's flat value
    /// would cover.
    pub fn terrain_value(&self, card: Card, position: u32) -> u32 {
        let reach = position + u32::from(card.flat.max(card.climb));
        card.value_for(self.slipstream_class(position, reach))
    }

    /// Value actually moved when playing `card` from `position` with
    /// `penalties` penalty cards among the active four.
    pub fn effective_value(&self, card: Card, position: u32, penalties: u32) -> u32 {
        let value = self.terrain_value(card, position).saturating_sub(penalties);
        if self.is_descent(position) {
            value.max(DESCENT_MIN_VALUE)
        } else {
            value
        }
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for tile in &self.tiles {
            write!(f, "{}", tile.token())?;
        }
        if self.cobbled_finale {
            write!(f, "B")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for Track {
    type Error = RaceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Track::parse(&value)
    }
}

impl From<Track> for String {
    fn from(track: Track) -> Self {
        track.to_string()
    }
}
