//! Monotonic engine clock.

use std::time::Instant;

use once_cell::sync::Lazy;

static EPOCH: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds since the first use of the engine clock.
pub fn now_ms() -> u64 {
    EPOCH.elapsed().as_millis() as u64
}
