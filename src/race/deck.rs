//! Hand and Discard Bookkeeping
//!
//! The active four, reshuffles and fatigue scoring over a rider's piles.

use crate::core::rng::{RandomSource, shuffle};
use crate::race::card::Card;

/// Number of cards eligible for play each turn.
pub const ACTIVE_CARDS: usize = 4;

/// The active four: the first four cards of the hand.
#[inline]
pub fn active_four(hand: &[Card]) -> &[Card] {
    &hand[..hand.len().min(ACTIVE_CARDS)]
}

/// Penalty cards among the active four.
pub fn penalties_in_active(hand: &[Card]) -> u32 {
    active_four(hand).iter().filter(|c| c.is_penalty()).count() as u32
}

/// Does the hand hold a fatigue card anywhere?
pub fn has_fatigue(hand: &[Card]) -> bool {
    hand.iter().any(|c| c.is_fatigue())
}

/// Fatigue and penalty cards outside the active four, across hand and discard.
pub fn exhaustion_beyond_active(hand: &[Card], discard: &[Card]) -> u32 {
    let tired = |c: &&Card| c.is_fatigue() || c.is_penalty();
    let in_hand = hand.iter().skip(ACTIVE_CARDS).filter(tired).count();
    let in_discard = discard.iter().filter(tired).count();
    (in_hand + in_discard) as u32
}

/// Merge the discard pile back under the hand.
///
/// The discard is shuffled with the injected source and appended, so cards
/// already on top of the hand keep their order. The discard is left empty.
pub fn reshuffle_discard(hand: &mut Vec<Card>, discard: &mut Vec<Card>, rng: &mut dyn RandomSource) {
    shuffle(discard, rng);
    hand.append(discard);
}

/// Weighted share of penalty and fatigue cards over all held cards, in `[0, 1]`.
pub fn fatigue_score(hand: &[Card], discard: &[Card], penalty_weight: f64, fatigue_weight: f64) -> f64 {
    let total = hand.len() + discard.len();
    if total == 0 {
        return 0.0;
    }
    let (penalties, fatigue) = hand
        .iter()
        .chain(discard.iter())
        .fold((0u32, 0u32), |(p, f), c| {
            (p + c.is_penalty() as u32, f + c.is_fatigue() as u32)
        });
    let weighted = penalty_weight * f64::from(penalties) + fatigue_weight * f64::from(fatigue);
    (weighted / total as f64).clamp(0.0, 1.0)
}
