//! Turn Seed Derivation
//!
//! Every turn carries an opaque seed fixed at creation. The seed makes
//! resolution unpredictable before the turn opens and reproducible after.

use crate::core::score::ScoreHasher;

/// Domain separator for seed derivation.
const SEED_DOMAIN: &[u8] = b"WEGO_TURN_SEED_V1";

/// Length of a seed string in hex characters (128 bits).
pub const SEED_HEX_LEN: usize = 32;

/// Source of per-turn seeds.
///
/// The scheduler asks for exactly one seed per created turn.
pub trait SeedSource: Send {
    /// Produce the seed for a newly created turn.
    fn seed_for(&mut self, turn_number: u32) -> String;
}

/// Fresh, unpredictable seeds backed by v4 UUID entropy.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSeeds;

impl SeedSource for RandomSeeds {
    fn seed_for(&mut self, turn_number: u32) -> String {
        let entropy = uuid::Uuid::new_v4().into_bytes();
        derive_turn_seed(&entropy, turn_number)
    }
}

/// The same seed for every turn. Used for replays and tests.
#[derive(Debug, Clone)]
pub struct FixedSeed(pub String);

impl SeedSource for FixedSeed {
    fn seed_for(&mut self, _turn_number: u32) -> String {
        self.0.clone()
    }
}

/// Derive a turn seed from entropy and the turn number.
///
/// Output is lowercase hex of the first 16 digest bytes.
pub fn derive_turn_seed(entropy: &[u8], turn_number: u32) -> String {
    let mut hasher = ScoreHasher::with_domain(SEED_DOMAIN);
    hasher.update_bytes(entropy);
    hasher.update_u32(turn_number);
    let hash = hasher.finalize();
    hex::encode(&hash[..SEED_HEX_LEN / 2])
}
