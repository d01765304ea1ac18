use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Hard cap on entries per strategy map. When exceeded after idle eviction,
/// the oldest entries beyond this limit are force-evicted regardless of
/// last-access time.
pub(crate) const MAX_ENTRIES: usize = 100_000;

/// One per-key state cell: the algorithm state behind its own mutex, plus a
/// last-access timestamp kept outside the lock for eviction scans.
pub(crate) struct Slot<S> {
    state: Mutex<S>,
    last_access: AtomicU64,
}

impl<S> Slot<S> {
    /// Lock the per-key state for a read-modify-write section. Poisoning is
    /// recovered via `into_inner`: every state here is a plain record that
    /// stays consistent across any panic point.
    pub fn lock(&self) -> MutexGuard<'_, S> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn touch(&self, now_ms: u64) {
        self.last_access.store(now_ms, Ordering::Relaxed);
    }

    fn idle_for(&self, now_ms: u64) -> u64 {
        now_ms.saturating_sub(self.last_access.load(Ordering::Relaxed))
    }
}

/// Concurrent key → slot map shared by every strategy: lock-free lookup on
/// the fast path, atomic construct-if-absent insertion on first touch.
pub(crate) struct KeyedSlots<S> {
    slots: DashMap<String, Arc<Slot<S>>>,
}

impl<S> KeyedSlots<S> {
    pub fn new() -> Self {
        Self {
            slots: DashMap::new(),
        }
    }

    /// Fetch the slot for `key`, constructing fresh state on first touch.
    ///
    /// Fast path: an existing key clones the `Arc` without allocating.
    /// Insertion goes through the map's entry API, so two concurrent first
    /// touches of the same key still yield exactly one state instance.
    pub fn get_or_insert_with(
        &self,
        key: &str,
        now_ms: u64,
        init: impl FnOnce() -> S,
    ) -> Arc<Slot<S>> {
        let slot = if let Some(entry) = self.slots.get(key) {
            entry.value().clone()
        } else {
            self.slots
                .entry(key.to_string())
                .or_insert_with(|| {
                    Arc::new(Slot {
                        state: Mutex::new(init()),
                        last_access: AtomicU64::new(now_ms),
                    })
                })
                .clone()
        };
        slot.touch(now_ms);
        slot
    }

    /// Drop the state for `key`. Absent keys are a silent no-op; the next
    /// acquire constructs fresh state.
    pub fn remove(&self, key: &str) {
        self.slots.remove(key);
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Remove entries idle for at least `expire_ms`. If the map still
    /// exceeds `MAX_ENTRIES` afterwards, force-evict the oldest entries
    /// until it is back under the cap.
    pub fn evict_idle(&self, now_ms: u64, expire_ms: u64) {
        self.slots.retain(|_, v| v.idle_for(now_ms) < expire_ms);

        let overflow = self.slots.len().saturating_sub(MAX_ENTRIES);
        if overflow == 0 {
            return;
        }
        let mut entries: Vec<(String, u64)> = self
            .slots
            .iter()
            .map(|r| (r.key().clone(), r.value().idle_for(now_ms)))
            .collect();
        entries.sort_unstable_by(|a, b| b.1.cmp(&a.1));
        for (key, _) in entries.into_iter().take(overflow) {
            self.slots.remove(&key);
        }
    }
}
