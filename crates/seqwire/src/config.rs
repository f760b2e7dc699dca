// src/config.rs
//! Process-wide transport tunables.
//!
//! Read on every use, so changes apply to datagrams registered afterwards
//! but never retroactively. Setters clamp to the documented ranges.

use log::debug;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

/// Bounds for the constant-policy retransmission timeout.
pub const TIMEOUT_MIN: Duration = Duration::from_secs(1);
pub const TIMEOUT_MAX: Duration = Duration::from_secs(10);

/// Bounds for the per-datagram transmission budget (first send + retries).
pub const SEND_TRY_COUNT_MIN: u32 = 1;
pub const SEND_TRY_COUNT_MAX: u32 = 10;

static TIMEOUT_MS: AtomicU64 = AtomicU64::new(2_000);
static SEND_TRY_COUNT: AtomicU32 = AtomicU32::new(3);

/// Retransmission timeout used by the constant policy (default 2 s).
pub fn timeout() -> Duration {
    Duration::from_millis(TIMEOUT_MS.load(Ordering::Relaxed))
}

/// Sets the retransmission timeout, clamped to [1 s, 10 s].
pub fn set_timeout(timeout: Duration) {
    let clamped = timeout.clamp(TIMEOUT_MIN, TIMEOUT_MAX);
    TIMEOUT_MS.store(clamped.as_millis() as u64, Ordering::Relaxed);
    debug!("config: timeout now {} ms", clamped.as_millis());
}

/// Total transmission attempts allowed per datagram (default 3).
pub fn send_try_count() -> u32 {
    SEND_TRY_COUNT.load(Ordering::Relaxed)
}

/// Sets the transmission budget, clamped to [1, 10].
pub fn set_send_try_count(count: u32) {
    let clamped = count.clamp(SEND_TRY_COUNT_MIN, SEND_TRY_COUNT_MAX);
    SEND_TRY_COUNT.store(clamped, Ordering::Relaxed);
    debug!("config: send_try_count now {}", clamped);
}
