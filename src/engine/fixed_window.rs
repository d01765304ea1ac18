use super::store::KeyedSlots;
use super::{Decision, WindowParams};

/// Fixed window counter: one integer counter per epoch-aligned window
/// (`window_id = now_ms / window_size_ms`). Cheapest of the window
/// algorithms, with the known boundary artifact: up to `2 * limit`
/// admissions can land inside a window-sized interval straddling a
/// boundary.
pub(crate) struct FixedWindowLimiter {
    windows: KeyedSlots<FixedWindowState>,
}

struct FixedWindowState {
    window_id: u64,
    count: u64,
}

impl FixedWindowLimiter {
    pub fn new() -> Self {
        Self {
            windows: KeyedSlots::new(),
        }
    }

    pub fn try_acquire_at(&self, key: &str, params: &WindowParams, now_ms: u64) -> Decision {
        let current_window = now_ms / params.window_ms;
        let slot = self.windows.get_or_insert_with(key, now_ms, || FixedWindowState {
            window_id: current_window,
            count: 0,
        });
        let mut st = slot.lock();

        if st.window_id != current_window {
            st.window_id = current_window;
            st.count = 0;
        }

        if st.count < params.limit {
            st.count += 1;
            Decision::admit(params.limit - st.count)
        } else {
            let window_end = (current_window + 1) * params.window_ms;
            let retry = (window_end - now_ms).div_ceil(1000);
            Decision::reject(retry, "fixed window limit reached")
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

#[cfg(test)]
mod tests {
    use super::*;

    fn params(limit: u64, window_seconds: u64) -> WindowParams {
        WindowParams {
            limit,
            window_ms: window_seconds * 1000,
        }
    }

    #[test]
    fn test_at_most_limit_within_one_window() {
        let limiter = FixedWindowLimiter::new();
        let p = params(3, 60);
        let t = 1_700_000_040_000; // mid-window

        for expected_remaining in [2, 1, 0] {
            let d = limiter.try_acquire_at("k", &p, t);
            assert!(d.admitted);
            assert_eq!(d.remaining, expected_remaining);
        }
        let d = limiter.try_acquire_at("k", &p, t);
        assert!(!d.admitted);
        assert!(d.retry_after_seconds >= 1);
    }

    #[test]
    fn test_counter_resets_at_window_boundary() {
        let limiter = FixedWindowLimiter::new();
        let p = params(100, 60);

        // 100 calls one second before the boundary, 100 more right at it:
        // the boundary burst artifact admits all 200.
        for _ in 0..100 {
            assert!(limiter.try_acquire_at("k", &p, 59_000).admitted);
        }
        assert!(!limiter.try_acquire_at("k", &p, 59_000).admitted);
        for _ in 0..100 {
            assert!(limiter.try_acquire_at("k", &p, 60_000).admitted);
        }
    }

    #[test]
    fn test_retry_hint_reaches_window_end() {
        let limiter = FixedWindowLimiter::new();
        let p = params(1, 60);

        assert!(limiter.try_acquire_at("k", &p, 0).admitted);
        // Rejected at t=0: the full window remains.
        assert_eq!(limiter.try_acquire_at("k", &p, 0).retry_after_seconds, 60);
        // Rejected 500ms before the boundary: rounds up to one second.
        assert_eq!(
            limiter.try_acquire_at("k", &p, 59_500).retry_after_seconds,
            1
        );
    }

    #[test]
    fn test_stale_window_after_long_gap() {
        let limiter = FixedWindowLimiter::new();
        let p = params(2, 60);

        limiter.try_acquire_at("k", &p, 10_000);
        limiter.try_acquire_at("k", &p, 10_000);
        assert!(!limiter.try_acquire_at("k", &p, 10_000).admitted);

        // Several windows later the counter starts over.
        let d = limiter.try_acquire_at("k", &p, 310_000);
        assert!(d.admitted);
        assert_eq!(d.remaining, 1);
    }

    #[test]
    fn test_keys_count_independently() {
        let limiter = FixedWindowLimiter::new();
        let p = params(1, 60);

        assert!(limiter.try_acquire_at("a", &p, 5_000).admitted);
        assert!(!limiter.try_acquire_at("a", &p, 5_000).admitted);
        assert!(limiter.try_acquire_at("b", &p, 5_000).admitted);
    }
}
