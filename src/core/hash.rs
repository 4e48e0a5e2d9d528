//! Race State Hashing
//!
//! SHA-256 digests of race snapshots. Determinism tests compare them and
//! entry points log them at debug level.

use sha2::{Sha256, Digest};

/// 32-byte SHA-256 digest of a snapshot.
pub type StateHash = [u8; 32];

const DOMAIN: &[u8] = b"PELOTON_RACE_STATE_V1";

/// Incremental hasher over the engine's field types.
///
/// Callers feed fields in a fixed order; numbers are little-endian, floats
/// by bit pattern, strings length-prefixed.
pub struct StateHasher {
    inner: Sha256,
}

impl Default for StateHasher {
    fn default() -> Self {
        let mut inner = Sha256::new();
        inner.update(DOMAIN);
        Self { inner }
    }
}

impl StateHasher {
    /// Feed a single byte.
    #[inline]
    pub fn update_u8(&mut self, value: u8) {
        self.inner.update([value]);
    }

    /// Feed a u32.
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.inner.update(value.to_le_bytes());
    }

    /// Feed a u64.
    #[inline]
    pub fn update_u64(&mut self, value: u64) {
        self.inner.update(value.to_le_bytes());
    }

    /// Feed an f64 by its exact bits, so `0.0` and `-0.0` differ.
    #[inline]
    pub fn update_f64(&mut self, value: f64) {
        self.update_u64(value.to_bits());
    }

    /// Feed an optional f64 behind a presence tag.
    pub fn update_opt_f64(&mut self, value: Option<f64>) {
        self.update_bool(value.is_some());
        if let Some(v) = value {
            self.update_f64(v);
        }
    }

    /// Feed a bool as one byte.
    #[inline]
    pub fn update_bool(&mut self, value: bool) {
        self.update_u8(u8::from(value));
    }

    /// Feed a string with its length in front.
    pub fn update_str(&mut self, value: &str) {
        self.update_u32(value.len() as u32);
        self.inner.update(value.as_bytes());
    }

    /// Consume the hasher.
    pub fn finalize(self) -> StateHash {
        self.inner.finalize().into()
    }
}

/// Hash a snapshot: the round first, then whatever `add_state` feeds.
pub fn compute_state_hash<F>(round: u32, add_state: F) -> StateHash
where
    F: FnOnce(&mut StateHasher),
{
    let mut hasher = StateHasher::default();
    hasher.update_u32(round);
    add_state(&mut hasher);
    hasher.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_determinism() {
        let a = compute_state_hash(3, |h| {
            h.update_str("Vingegaard");
            h.update_f64(0.25);
        });
        let b = compute_state_hash(3, |h| {
            h.update_str("Vingegaard");
            h.update_f64(0.25);
        });
        assert_eq!(a, b);
    }

    #[test]
    fn test_round_changes_hash() {
        let a = compute_state_hash(1, |_| {});
        let b = compute_state_hash(2, |_| {});
        assert_ne!(a, b);
    }

    #[test]
    fn test_string_prefix_avoids_collisions() {
        let a = compute_state_hash(0, |h| {
            h.update_str("ab");
            h.update_str("c");
        });
        let b = compute_state_hash(0, |h| {
            h.update_str("a");
            h.update_str("bc");
        });
        assert_ne!(a, b);
    }

    #[test]
    fn test_optional_float_tagging() {
        let some = compute_state_hash(0, |h| h.update_opt_f64(Some(0.0)));
        let none = compute_state_hash(0, |h| h.update_opt_f64(None));
        assert_ne!(some, none);
    }

    #[test]
    fn test_signed_zero_differs() {
        let pos = compute_state_hash(0, |h| h.update_f64(0.0));
        let neg = compute_state_hash(0, |h| h.update_f64(-0.0));
        assert_ne!(pos, neg);
    }
}
