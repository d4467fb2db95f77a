//! Deterministic Contention Scoring
//!
//! Maps a string key to a reproducible 64-bit score.
//! Used by the conflict resolver to rank simultaneous claims:
//! - Same key always yields the same score, on any machine, across restarts
//! - Scores carry no ordering correlation with key content
//! - Only the key bytes are hashed (no addresses, iteration order or time)

use sha2::{Sha256, Digest};

/// Full digest type (256 bits / 32 bytes).
pub type Digest256 = [u8; 32];

/// Separator between the parts of a contention key.
pub const KEY_SEPARATOR: char = ':';

/// Deterministic hasher for scoring keys and turn seeds.
///
/// Wraps SHA-256. Order of updates is significant.
pub struct ScoreHasher {
    hasher: Sha256,
}

impl ScoreHasher {
    /// Create a new hasher with no domain separator.
    pub fn new() -> Self {
        Self { hasher: Sha256::new() }
    }

    /// Create a hasher prefixed with a domain separator.
    pub fn with_domain(domain: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(domain);
        Self { hasher }
    }

    /// Update with raw bytes.
    #[inline]
    pub fn update_bytes(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    /// Update with a string's UTF-8 bytes.
    #[inline]
    pub fn update_str(&mut self, value: &str) {
        self.hasher.update(value.as_bytes());
    }

    /// Update with a u32 value (little-endian).
    #[inline]
    pub fn update_u32(&mut self, value: u32) {
        self.hasher.update(value.to_le_bytes());
    }

    /// Finalize and return the full digest.
    pub fn finalize(self) -> Digest256 {
        self.hasher.finalize().into()
    }

    /// Finalize and truncate the digest to a score.
    pub fn finalize_score(self) -> u64 {
        truncate_digest(&self.finalize())
    }
}

impl Default for ScoreHasher {
    fn default() -> Self {
        Self::new()
    }
}

/// Read the first 8 digest bytes as a big-endian integer.
#[inline]
pub fn truncate_digest(digest: &Digest256) -> u64 {
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Score a key.
///
/// # Example
///
/// ```
/// use wego::core::score::score;
///
/// assert_eq!(score("seed:alpha:paris"), score("seed:alpha:paris"));
/// assert_ne!(score("seed:alpha:paris"), score("seed:beta:paris"));
/// ```
pub fn score(key: &str) -> u64 {
    let mut hasher = ScoreHasher::new();
    hasher.update_str(key);
    hasher.finalize_score()
}

/// Build the key a claim is scored under: `seed:country:target`.
pub fn contention_key(seed: &str, country: &str, target: &str) -> String {
    let mut key = String::with_capacity(seed.len() + country.len() + target.len() + 2);
    key.push_str(seed);
    key.push(KEY_SEPARATOR);
    key.push_str(country);
    key.push(KEY_SEPARATOR);
    key.push_str(target);
    key
}

/// Score one country's claim on one target under a turn seed.
#[inline]
pub fn contention_score(seed: &str, country: &str, target: &str) -> u64 {
    score(&contention_key(seed, country, target))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_is_stable() {
        // SHA-256("abc") = ba7816bf8f01cfea...
        assert_eq!(score("abc"), 0xba78_16bf_8f01_cfea);
        assert_eq!(score("abc"), score("abc"));
    }

    #[test]
    fn test_score_depends_on_every_byte() {
        let base = score("seed-1:alpha:paris");
        assert_ne!(base, score("seed-1:alpha:pariS"));
        assert_ne!(base, score("seed-2:alpha:paris"));
        assert_ne!(base, score("seed-1:alphb:paris"));
    }

    #[test]
    fn test_contention_key_layout() {
        assert_eq!(contention_key("s", "fr", "p1"), "s:fr:p1");
        assert_eq!(
            contention_score("s", "fr", "p1"),
            score("s:fr:p1"),
        );
    }

    #[test]
    fn test_hasher_domain_separation() {
        let mut plain = ScoreHasher::new();
        plain.update_str("key");

        let mut domained = ScoreHasher::with_domain(b"WEGO");
        domained.update_str("key");

        assert_ne!(plain.finalize(), domained.finalize());
    }

    #[test]
    fn test_update_order_matters() {
        let a = {
            let mut h = ScoreHasher::new();
            h.update_u32(1);
            h.update_u32(2);
            h.finalize_score()
        };
        let b = {
            let mut h = ScoreHasher::new();
            h.update_u32(2);
            h.update_u32(1);
            h.finalize_score()
        };
        assert_ne!(a, b);
    }

    #[test]
    fn test_scores_do_not_follow_key_order() {
        // Lexicographically sorted keys should not produce sorted scores.
        let scores: Vec<u64> = (0..32)
            .map(|i| score(&format!("seed:country-{:02}:target", i)))
            .collect();
        let mut sorted = scores.clone();
        sorted.sort_unstable();
        assert_ne!(scores, sorted);
    }
}
