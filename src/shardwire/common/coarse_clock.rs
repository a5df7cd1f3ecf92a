use std::sync::atomic::{AtomicU32, Ordering::Relaxed};
use std::sync::OnceLock;
use std::time::Instant;

/// A coarse-grained (second resolution) monotonic clock, refreshed by a
/// background ticker rather than syscalled on every access. Used for
/// idle-timeout and last-active bookkeeping where sub-second precision
/// would be wasted work.
static CLOCK_SECONDS: AtomicU32 = AtomicU32::new(0);
static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Returns the number of whole seconds since the clock was started.
pub fn coarse_monotonic_now() -> u32 {
    EPOCH.get_or_init(Instant::now);
    CLOCK_SECONDS.load(Relaxed)
}

/// Advances the coarse clock to the current elapsed time. Called once per
/// monitor tick so idle-timeout checks elsewhere never need a syscall.
pub fn advance_coarse_clock() {
    let epoch = *EPOCH.get_or_init(Instant::now);
    let secs = epoch.elapsed().as_secs() as u32;
    CLOCK_SECONDS.store(secs, Relaxed);
}

/// An infinite async task that advances the clock once a second.
pub async fn coarse_monotonic_clock_updater() {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(1));
    loop {
        interval.tick().await;
        advance_coarse_clock();
    }
}
