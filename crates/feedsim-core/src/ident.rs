//! Deterministic identifier derivation.
//!
//! Every identifier in the projections is a pure function of log content,
//! which is what makes replay bit-identical: a post's ID is derived from
//! the op_id of the action that created it, a timeline's ID from the
//! serve-time inputs plus a per-run counter. All derivations go through
//! blake3 with a domain-separating prefix.

use crate::rank::Algorithm;

/// Hex length of derived identifiers (16 hex chars = 64 bits).
const ID_HEX_LEN: usize = 16;

fn derive(prefix: &str, input: &str) -> String {
    let digest = blake3::hash(input.as_bytes());
    let hex = digest.to_hex();
    format!("{prefix}-{}", &hex.as_str()[..ID_HEX_LEN])
}

/// `post_id := H("post", op_id)`.
#[must_use]
pub fn post_id(op_id: &str) -> String {
    derive("post", &format!("post:{op_id}"))
}

/// `comment_id := H("comment", op_id)`.
#[must_use]
pub fn comment_id(op_id: &str) -> String {
    derive("comment", &format!("comment:{op_id}"))
}

/// `timeline_id := H(run_id, user_id, tick, algorithm, seed, counter)`.
///
/// The counter is the number of timelines already served in this run, so
/// two serves with otherwise identical inputs cannot collide.
#[must_use]
pub fn timeline_id(
    run_id: &str,
    user_id: &str,
    tick: i64,
    algorithm: Algorithm,
    seed: i64,
    counter: i64,
) -> String {
    derive(
        "tl",
        &format!("timeline:{run_id}:{user_id}:{tick}:{algorithm}:{seed}:{counter}"),
    )
}

/// `run_id := H(config, started_tick)`. Identical configs started from
/// identical log states produce identical run IDs (and therefore
/// byte-identical logs), while a rerun appended to a grown log gets a
/// fresh identity.
#[must_use]
pub fn run_id(
    seed: i64,
    agents: i64,
    k: i64,
    algorithm: Algorithm,
    ticks: i64,
    started_tick: i64,
) -> String {
    derive(
        "run",
        &format!("run:{seed}:{agents}:{k}:{algorithm}:{ticks}:{started_tick}"),
    )
}

/// 64-bit finalizer used for ranking tie-breaks.
#[must_use]
fn splitmix64(x: u64) -> u64 {
    let mut z = x.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

/// Stable tie-break key `H(seed, post_id)`: splitmix of the seed and the
/// leading 64 bits of `blake3(post_id)`. Portable across platforms.
#[must_use]
pub fn tie_break(seed: i64, post_id: &str) -> u64 {
    let digest = blake3::hash(post_id.as_bytes());
    let mut lead = [0u8; 8];
    lead.copy_from_slice(&digest.as_bytes()[..8]);
    splitmix64((seed as u64) ^ u64::from_le_bytes(lead))
}
