//! Derived Per-Round Stats
//!
//! Favoritism, win chance and sprint chance for every active rider.

use serde::{Serialize, Deserialize};

use crate::race::rider::Rider;
use crate::race::state::RaceState;
use crate::race::track::{Terrain, Track};

/// Configuration for derived stats.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Weight of the sprint rating in favoritism.
    pub sprint_weight: f64,
    /// Sprint weight multiplier when the run-in is not plain.
    pub hilly_run_in_factor: f64,
    /// Sprint weight multiplier on a cobbled finale.
    pub cobbled_factor: f64,
    /// Tiles before the finish that make up the run-in.
    pub run_in_length: u32,
    /// Favoritism lost per field behind the front of the race.
    pub gap_penalty: f64,
    /// Favoritism lost at full fatigue.
    pub fatigue_penalty: f64,
    /// Floor on favoritism.
    pub min_favoritism: f64,
    /// Exponent applied to favoritism for win chance.
    pub win_exponent: f64,
    /// Exponent applied to sprint strength for sprint chance.
    pub sprint_exponent: f64,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            sprint_weight: 0.4,
            hilly_run_in_factor: 0.5,
            cobbled_factor: 0.6,
            run_in_length: 5,
            gap_penalty: 0.15,
            fatigue_penalty: 3.0,
            min_favoritism: 0.01,
            win_exponent: 4.0,
            sprint_exponent: 4.0,
        }
    }
}

/// Share of climbing between `position` and the finish, in `[0, 1]`.
///
/// Narrow and climb tiles count fully, mixed tiles half.
pub fn climb_share(track: &Track, position: u32) -> f64 {
    let finish = track.finish_index();
    if position >= finish {
        return 0.0;
    }
    let weight: f64 = (position..finish)
        .map(|p| match track.terrain_at(p) {
            Terrain::Narrow | Terrain::Climb => 1.0,
            Terrain::Mixed => 0.5,
            _ => 0.0,
        })
        .sum();
    weight / f64::from(finish - position)
}

/// Weight of the sprint rating given the shape of the finish.
pub fn sprint_share(track: &Track, config: &StatsConfig) -> f64 {
    let finish = track.finish_index();
    let start = finish.saturating_sub(config.run_in_length);
    let plain = (start..finish).all(|p| {
        matches!(track.terrain_at(p), Terrain::Plain | Terrain::Descent | Terrain::Finish)
    });

    let mut share = config.sprint_weight;
    if !plain {
        share *= config.hilly_run_in_factor;
    }
    if track.cobbled_finale() {
        share *= config.cobbled_factor;
    }
    share
}

/// Favoritism for one rider.
pub fn favoritism(
    rider: &Rider,
    gap: u32,
    climb_share: f64,
    sprint_share: f64,
    config: &StatsConfig,
) -> f64 {
    let aptitude = rider.flat * (1.0 - climb_share) + rider.climb * climb_share;
    let score = aptitude + rider.sprint * sprint_share
        - f64::from(gap) * config.gap_penalty
        - rider.fatigue * config.fatigue_penalty;
    if score.is_finite() {
        score.max(config.min_favoritism)
    } else {
        config.min_favoritism
    }
}

/// Normalize `weights^exponent` into shares summing to one.
///
/// Falls back to equal shares when every weight is zero.
pub fn power_shares(weights: &[f64], exponent: f64) -> Vec<f64> {
    if weights.is_empty() {
        return Vec::new();
    }
    let powered: Vec<f64> = weights.iter().map(|w| w.max(0.0).powf(exponent)).collect();
    let total: f64 = powered.iter().sum();
    if total > 0.0 && total.is_finite() {
        powered.iter().map(|p| p / total).collect()
    } else {
        vec![1.0 / weights.len() as f64; weights.len()]
    }
}

/// Recompute derived stats for every active rider. Positions are untouched.
pub fn refresh_stats(state: &mut RaceState, config: &StatsConfig) {
    let leader = state.leader_position();
    let sprint_weight = sprint_share(&state.track, config);

    let rows: Vec<(String, f64, f64)> = state
        .active_riders()
        .map(|rider| {
            let share = climb_share(&state.track, rider.position);
            let fav = favoritism(
                rider,
                leader.saturating_sub(rider.position),
                share,
                sprint_weight,
                config,
            );
            let sprint = rider.sprint * (1.0 - rider.fatigue.clamp(0.0, 1.0));
            (rider.name.clone(), fav, sprint)
        })
        .collect();

    let fav: Vec<f64> = rows.iter().map(|row| row.1).collect();
    let sprint: Vec<f64> = rows.iter().map(|row| row.2).collect();
    let win = power_shares(&fav, config.win_exponent);
    let sprint_chance = power_shares(&sprint, config.sprint_exponent);

    for (i, (name, _, _)) in rows.iter().enumerate() {
        if let Some(rider) = state.riders.get_mut(name) {
            rider.favoritism_score = fav[i];
            rider.win_chance = win[i];
            rider.sprint_chance = sprint_chance[i];
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_climb_share() {
        let track = Track::parse("3311F").unwrap();
        assert!((climb_share(&track, 0) - 0.5).abs() < 1e-12);
        assert!((climb_share(&track, 2) - 1.0).abs() < 1e-12);
        assert_eq!(climb_share(&track, 4), 0.0);

        let mixed = Track::parse("22F").unwrap();
        assert!((climb_share(&mixed, 0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_sprint_share_reduced_by_finale() {
        let config = StatsConfig::default();
        let flat = Track::parse("3333333F").unwrap();
        let hilly = Track::parse("3311111F").unwrap();
        let cobbled = Track::parse("3333333FB").unwrap();
        assert_eq!(sprint_share(&flat, &config), 0.4);
        assert!((sprint_share(&hilly, &config) - 0.2).abs() < 1e-12);
        assert!((sprint_share(&cobbled, &config) - 0.24).abs() < 1e-12);
    }

    #[test]
    fn test_favoritism_floor() {
        let config = StatsConfig::default();
        let mut rider = Rider::new("A", "T");
        rider.flat = 2.0;
        rider.sprint = 0.0;
        rider.fatigue = 1.0;
        let f = favoritism(&rider, 40, 0.0, 0.0, &config);
        assert_eq!(f, config.min_favoritism);
    }

    #[test]
    fn test_power_shares_sum_to_one() {
        let shares = power_shares(&[1.0, 2.0, 3.0], 2.0);
        let total: f64 = shares.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        assert!(shares[2] > shares[1] && shares[1] > shares[0]);
        assert_eq!(power_shares(&[0.0, 0.0], 4.0), vec![0.5, 0.5]);
    }

    #[test]
    fn test_refresh_stats_keeps_positions() {
        let mut state = RaceState::new(Track::parse("3333111111F").unwrap(), 0);
        let mut climber = Rider::new("Climber", "A");
        climber.climb = 9.0;
        climber.flat = 4.0;
        climber.position = 3;
        let mut rouleur = Rider::new("Rouleur", "B");
        rouleur.climb = 4.0;
        rouleur.flat = 9.0;
        rouleur.position = 3;
        state.riders.insert(climber.name.clone(), climber);
        state.riders.insert(rouleur.name.clone(), rouleur);

        refresh_stats(&mut state, &StatsConfig::default());

        let c = state.rider("Climber").unwrap();
        let r = state.rider("Rouleur").unwrap();
        assert_eq!(c.position, 3);
        assert!(c.favoritism_score > r.favoritism_score);
        assert!(c.win_chance > r.win_chance);
        assert!((c.win_chance + r.win_chance - 1.0).abs() < 1e-12);
    }
}
