//! Idempotency tokens.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const TOKEN_BYTES: usize = 16;

static FALLBACK_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a fresh token: 16 random bytes as 32 lowercase hex chars.
///
/// Uses the operating system's secure source. If that is unavailable, falls
/// back to a time-seeded pseudo-random generator and logs a warning.
#[must_use]
pub fn idempotency_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    if let Err(e) = getrandom::getrandom(&mut bytes) {
        log::warn!("Secure random source unavailable ({e}); using a weaker idempotency token");
        fallback_fill(&mut bytes);
    }
    hex::encode(bytes)
}

fn fallback_fill(bytes: &mut [u8]) {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX));
    let count = FALLBACK_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut rng = StdRng::seed_from_u64(nanos ^ count.rotate_left(32));
    rng.fill(bytes);
}
