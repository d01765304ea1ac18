use super::store::KeyedSlots;
use super::{BucketParams, Decision};

/// Token bucket: tokens refill continuously at `refill_rate` per second,
/// each admission consumes exactly one. Fractional tokens let rates below
/// one per second accrue precisely without drift. Refill is pull-based,
/// computed from elapsed time on access; there is no background timer.
pub(crate) struct TokenBucketLimiter {
    buckets: KeyedSlots<TokenBucketState>,
}

struct TokenBucketState {
    tokens: f64,
    last_refill_ms: u64,
}

impl TokenBucketLimiter {
    pub fn new() -> Self {
        Self {
            buckets: KeyedSlots::new(),
        }
    }

    pub fn try_acquire_at(&self, key: &str, params: &BucketParams, now_ms: u64) -> Decision {
        let slot = self.buckets.get_or_insert_with(key, now_ms, || TokenBucketState {
            tokens: params.capacity as f64,
            last_refill_ms: now_ms,
        });
        let mut st = slot.lock();

        // saturating_sub: a backward clock jump grants no refill credit.
        let elapsed = now_ms.saturating_sub(st.last_refill_ms);
        if elapsed > 0 {
            let cap = if params.compat_refill_cap {
                (params.refill_rate * 60.0).max(params.capacity as f64)
            } else {
                params.capacity as f64
            };
            st.tokens = (st.tokens + elapsed as f64 / 1000.0 * params.refill_rate).min(cap);
            st.last_refill_ms = now_ms;
        }

        if st.tokens >= 1.0 {
            st.tokens -= 1.0;
            Decision::admit(st.tokens as u64)
        } else {
            let retry = ((1.0 - st.tokens) / params.refill_rate).ceil() as u64;
            Decision::reject(retry, "token bucket exhausted")
        }
    }

    pub fn reset(&self, key: &str) {
        self.buckets.remove(key);
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn evict_idle(&self, now_ms: u64, expire_ms: u64) {
        self.buckets.evict_idle(now_ms, expire_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const T0: u64 = 1_700_000_000_000;

    fn params(capacity: u64, refill_rate: f64) -> BucketParams {
        BucketParams {
            capacity,
            refill_rate,
            compat_refill_cap: false,
        }
    }

    #[test]
    fn test_burst_drains_full_bucket() {
        let limiter = TokenBucketLimiter::new();
        let p = params(5, 1.0);

        // Eight back-to-back calls: five admitted with descending budget,
        // the rest rejected with a one-second retry hint.
        for expected_remaining in [4, 3, 2, 1, 0] {
            let d = limiter.try_acquire_at("k", &p, T0);
            assert!(d.admitted);
            assert_eq!(d.remaining, expected_remaining);
            assert_eq!(d.retry_after_seconds, 0);
        }
        for _ in 0..3 {
            let d = limiter.try_acquire_at("k", &p, T0);
            assert!(!d.admitted);
            assert_eq!(d.remaining, 0);
            assert_eq!(d.retry_after_seconds, 1);
        }
    }

    #[test]
    fn test_refill_after_wait() {
        let limiter = TokenBucketLimiter::new();
        let p = params(5, 1.0);

        for _ in 0..8 {
            limiter.try_acquire_at("k", &p, T0);
        }
        // Three seconds later the bucket has refilled ~3 tokens.
        let later = T0 + 3_000;
        for _ in 0..3 {
            assert!(limiter.try_acquire_at("k", &p, later).admitted);
        }
        assert!(!limiter.try_acquire_at("k", &p, later).admitted);
    }

    #[test]
    fn test_refill_clamps_to_capacity() {
        let limiter = TokenBucketLimiter::new();
        let p = params(5, 1.0);

        limiter.try_acquire_at("k", &p, T0);
        // A long idle gap must not overfill past capacity.
        let later = T0 + 3_600_000;
        for _ in 0..5 {
            assert!(limiter.try_acquire_at("k", &p, later).admitted);
        }
        assert!(!limiter.try_acquire_at("k", &p, later).admitted);
    }

    #[test]
    fn test_compat_cap_allows_refill_credit() {
        let limiter = TokenBucketLimiter::new();
        let p = BucketParams {
            capacity: 5,
            refill_rate: 1.0,
            compat_refill_cap: true,
        };

        limiter.try_acquire_at("k", &p, T0);
        // Legacy cap is max(refill_rate * 60, capacity) = 60 tokens.
        let later = T0 + 3_600_000;
        let mut admitted = 0;
        for _ in 0..70 {
            if limiter.try_acquire_at("k", &p, later).admitted {
                admitted += 1;
            }
        }
        assert_eq!(admitted, 60);
    }

    #[test]
    fn test_fractional_rate_refills_slowly() {
        let limiter = TokenBucketLimiter::new();
        let p = params(1, 0.1);

        assert!(limiter.try_acquire_at("k", &p, T0).admitted);
        let rejected = limiter.try_acquire_at("k", &p, T0);
        assert!(!rejected.admitted);
        // One token every ten seconds: retry hint reflects the full wait.
        assert_eq!(rejected.retry_after_seconds, 10);

        assert!(!limiter.try_acquire_at("k", &p, T0 + 9_000).admitted);
        assert!(limiter.try_acquire_at("k", &p, T0 + 10_000).admitted);
    }

    #[test]
    fn test_steady_state_at_refill_rate_always_admits() {
        let limiter = TokenBucketLimiter::new();
        let p = params(5, 2.0);

        // One request every 500ms matches the 2/s refill exactly.
        for i in 0..40 {
            assert!(limiter.try_acquire_at("k", &p, T0 + i * 500).admitted);
        }
    }

    #[test]
    fn test_backward_clock_jump_grants_no_credit() {
        let limiter = TokenBucketLimiter::new();
        let p = params(2, 1.0);

        assert!(limiter.try_acquire_at("k", &p, T0).admitted);
        assert!(limiter.try_acquire_at("k", &p, T0).admitted);
        // Clock goes backwards: no refill, still empty.
        assert!(!limiter.try_acquire_at("k", &p, T0 - 30_000).admitted);
    }

    #[test]
    fn test_keys_do_not_share_tokens() {
        let limiter = TokenBucketLimiter::new();
        let p = params(1, 1.0);

        assert!(limiter.try_acquire_at("a", &p, T0).admitted);
        assert!(!limiter.try_acquire_at("a", &p, T0).admitted);
        assert!(limiter.try_acquire_at("b", &p, T0).admitted);
    }
}
