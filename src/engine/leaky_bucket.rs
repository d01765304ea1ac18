use super::store::KeyedSlots;
use super::{BucketParams, Decision};

/// Leaky bucket: each admission pours one unit of water in, water drains
/// continuously at `refill_rate` (the drain rate here). Unlike the token
/// bucket it accumulates no credit below empty, so it cannot pass bursts;
/// the steady-state admit rate equals the drain rate.
pub(crate) struct LeakyBucketLimiter {
    buckets: KeyedSlots<LeakyBucketState>,
}

struct LeakyBucketState {
    water: f64,
    last_leak_ms: u64,
}

impl LeakyBucketLimiter {
    pub fn new() -> Self {
        Self {
            buckets: KeyedSlots::new(),
        }
    }

    pub fn try_acquire_at(&self, key: &str, params: &BucketParams, now_ms: u64) -> Decision {
        let slot = self.buckets.get_or_insert_with(key, now_ms, || LeakyBucketState {
            water: 0.0,
            last_leak_ms: now_ms,
        });
        let mut st = slot.lock();

        let elapsed = now_ms.saturating_sub(st.last_leak_ms);
        if elapsed > 0 {
            st.water = (st.water - elapsed as f64 / 1000.0 * params.refill_rate).max(0.0);
            st.last_leak_ms = now_ms;
        }

        if st.water < params.capacity as f64 {
            st.water += 1.0;
            Decision::admit((params.capacity as f64 - st.water) as u64)
        } else {
            let retry = (1.0 / params.refill_rate).ceil() as u64;
            Decision::reject(retry.max(1), "leaky bucket full")
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
