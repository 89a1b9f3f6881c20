use chrono::{SecondsFormat, Utc};

use crate::types::CritterId;

pub(super) fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Per-critter seed derived from the game seed (splitmix64 finalizer).
pub(super) fn strategy_seed(game_seed: u64, critter: CritterId) -> u64 {
    let mut z = game_seed.wrapping_add((u64::from(critter.0) + 1).wrapping_mul(0x9E37_79B9_7F4A_7C15));
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
