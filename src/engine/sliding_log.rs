use super::store::KeyedSlots;
use super::{Decision, WindowParams};
use std::collections::VecDeque;

/// Sliding window log: a FIFO queue of admission timestamps, trimmed to the
/// window horizon on every call. Exact — at any instant at most `limit`
/// admissions sit inside the trailing window. Memory is O(admissions in
/// window) per key; the trim is amortized O(1) per admission.
pub(crate) struct SlidingLogLimiter {
    logs: KeyedSlots<SlidingLogState>,
}

struct SlidingLogState {
    timestamps: VecDeque<u64>,
}

impl SlidingLogLimiter {
    pub fn new() -> Self {
        Self {
            logs: KeyedSlots::new(),
        }
    }

    pub fn try_acquire_at(&self, key: &str, params: &WindowParams, now_ms: u64) -> Decision {
        let slot = self.logs.get_or_insert_with(key, now_ms, || SlidingLogState {
            timestamps: VecDeque::new(),
        });
        let mut st = slot.lock();

        let horizon = now_ms.saturating_sub(params.window_ms);
        while let Some(&front) = st.timestamps.front() {
            if front < horizon {
                st.timestamps.pop_front();
            } else {
                break;
            }
        }

        if (st.timestamps.len() as u64) < params.limit {
            st.timestamps.push_back(now_ms);
            Decision::admit(params.limit - st.timestamps.len() as u64)
        } else {
            let retry = match st.timestamps.front() {
                Some(&oldest) => ((oldest + params.window_ms).saturating_sub(now_ms) / 1000).max(1),
                None => 1,
            };
            Decision::reject(retry, "sliding window limit reached")
        }
    }

    pub fn reset(&self, key: &str) {
        self.logs.remove(key);
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn evict_idle(&self, now_ms: u64, expire_ms: u64) {
        self.logs.evict_idle(now_ms, expire_ms);
    }
}
