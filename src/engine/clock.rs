use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch.
///
/// Wall clock rather than `Instant` because the fixed-window and
/// sliding-counter window ids are epoch-aligned (`now_ms / window_size_ms`).
/// All per-key arithmetic is on deltas computed with `saturating_sub`, so a
/// backward clock jump yields zero elapsed time instead of admission credit.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
