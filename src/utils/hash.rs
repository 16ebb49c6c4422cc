// src/utils/hash.rs

use sha2::{Digest, Sha256};

/// Builds the composite seed for a quiz session: `module:user:token`.
///
/// The freshness token (usually a millisecond timestamp) makes a retake
/// produce a new ordering, while a stored seed always replays the same one.
pub fn build_session_seed(module_id: &str, user_id: &str, freshness_token: &str) -> String {
    format!("{}:{}:{}", module_id, user_id, freshness_token)
}

/// Reads back the freshness token of a seed issued by `build_session_seed`
/// for this module and user.
///
/// The token must be a millisecond timestamp, so a seed issued to `u1` with
/// some other suffix can never pass for user `u1:x`.
pub fn parse_session_seed(seed: &str, module_id: &str, user_id: &str) -> Option<i64> {
    let token = seed.strip_prefix(&build_session_seed(module_id, user_id, ""))?;
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

/// SHA-256 of the seed's UTF-8 bytes, first 8 bytes read big-endian.
pub fn seed_state(seed: &str) -> u64 {
    let digest = Sha256::digest(seed.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Deterministic SplitMix64 stream derived from a session seed.
///
/// The construction is fixed so that any implementation given the same seed
/// string produces the same sequence:
///
/// 1. `state = seed_state(seed)`
/// 2. each draw adds `0x9E3779B97F4A7C15` to the state and returns the
///    SplitMix64 finalizer of the new state.
#[derive(Debug, Clone)]
pub struct SeedStream {
    state: u64,
}

impl SeedStream {
    pub fn from_seed(seed: &str) -> Self {
        Self {
            state: seed_state(seed),
        }
    }

    /// Next SplitMix64 output.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform-enough draw in `0..bound` (`next_u64() % bound`). `bound` must be > 0.
    pub fn below(&mut self, bound: usize) -> usize {
        debug_assert!(bound > 0);
        (self.next_u64() % bound as u64) as usize
    }

    /// In-place Fisher-Yates: for `i` from `len - 1` down to 1, swap `i` with `below(i + 1)`.
    pub fn shuffle<T>(&mut self, items: &mut [T]) {
        for i in (1..items.len()).rev() {
            let j = self.below(i + 1);
            items.swap(i, j);
        }
    }
}
