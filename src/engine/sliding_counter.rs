use super::store::KeyedSlots;
use super::{Decision, WindowParams};

/// Sliding window counter: two epoch-aligned counters (previous and current
/// window) blended by how far the clock sits inside the current window:
///
///   weighted = previous * (1 - position) + current
///
/// Approximates the sliding log at O(1) memory per key. Cloudflare-style;
/// the error is bounded by the previous window's burstiness.
pub(crate) struct SlidingCounterLimiter {
    windows: KeyedSlots<SlidingCounterState>,
}

struct SlidingCounterState {
    window_id: u64,
    current_count: u64,
    previous_count: u64,
}

impl SlidingCounterLimiter {
    pub fn new() -> Self {
        Self {
            windows: KeyedSlots::new(),
        }
    }

    pub fn try_acquire_at(&self, key: &str, params: &WindowParams, now_ms: u64) -> Decision {
        let current_window = now_ms / params.window_ms;
        let slot = self
            .windows
            .get_or_insert_with(key, now_ms, || SlidingCounterState {
                window_id: current_window,
                current_count: 0,
                previous_count: 0,
            });
        let mut st = slot.lock();

        // Reconcile with the wall clock. "Previous" means exactly the
        // window immediately before the current one; a gap of more than one
        // window zeroes both counters. A stored window ahead of the clock
        // (backward jump) is kept as-is: time travel earns no fresh budget.
        if st.window_id + 1 == current_window {
            st.previous_count = st.current_count;
            st.current_count = 0;
            st.window_id = current_window;
        } else if st.window_id < current_window {
            st.previous_count = 0;
            st.current_count = 0;
            st.window_id = current_window;
        }

        let window_start = current_window * params.window_ms;
        let position = (now_ms - window_start) as f64 / params.window_ms as f64;
        let weighted = st.previous_count as f64 * (1.0 - position) + st.current_count as f64;

        if weighted < params.limit as f64 {
            st.current_count += 1;
            let remaining = params.limit as i64 - weighted.ceil() as i64 - 1;
            Decision::admit(remaining.max(0) as u64)
        } else {
            let retry = ((window_start + params.window_ms - now_ms) / 1000).max(1);
            Decision::reject(retry, "sliding window limit reached")
        }
    }

    pub fn reset(&self, key: &str) {
        self.windows.remove(key);
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn evict_idle(&self, now_ms: u64, expire_ms: u64) {
        self.windows.evict_idle(now_ms, expire_ms);
    }
}
