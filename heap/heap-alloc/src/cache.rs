//! # Adaptive Bypass Cache
//!
//! A workload that keeps asking for one size produces churn whose free-list
//! search cost is wasted: the blocks it returns will immediately be wanted
//! again at the same size. This cache watches request sizes, and once a size
//! proves hot it tells the allocator to serve it from fresh heap extension
//! instead, keeping the free list clean for heterogeneous traffic.
//!
//! Two slots track candidate sizes independently. A slot is admitted with an
//! observation window of [`ADMISSION_TTL`] allocator calls; if the size is
//! requested [`ARM_THRESHOLD`] times before the window runs out, the slot
//! arms and the window restarts at [`REARM_TTL`]. A slot whose window
//! expires is forgotten. The state machine never touches the heap, only
//! counters.
//!
//! The thresholds are empirical; changing them changes observable behavior.

/// Smallest payload size worth tracking, in bytes.
const MIN_TRACKED: usize = 16;

/// Largest payload size worth tracking, in bytes.
const MAX_TRACKED: usize = 512;

/// Observation window granted on admission, in allocator calls.
const ADMISSION_TTL: i32 = 101;

/// Hits inside the window required to arm a slot.
const ARM_THRESHOLD: i32 = 50;

/// Window granted whenever a slot arms or re-arms.
const REARM_TTL: i32 = 100;

/// One tracked candidate size.
#[derive(Copy, Clone)]
struct Slot {
    size: Option<usize>,
    ttl: i32,
    hits: i32,
    armed: bool,
}

impl Slot {
    const EMPTY: Self = Self {
        size: None,
        ttl: -1,
        hits: -1,
        armed: false,
    };
}

/// The two-slot hot-size detector.
pub(crate) struct BypassCache {
    slots: [Slot; Self::SLOTS],
    disabled: bool,
}

impl BypassCache {
    pub(crate) const SLOTS: usize = 2;

    pub(crate) const fn new() -> Self {
        Self {
            slots: [Slot::EMPTY; Self::SLOTS],
            disabled: false,
        }
    }

    /// Whether the allocator should consult the cache at all.
    pub(crate) const fn is_enabled(&self) -> bool {
        !self.disabled
    }

    /// Stop consulting the cache for the lifetime of the heap. Latched on
    /// the first `realloc`: realloc-heavy workloads do not benefit and the
    /// size heuristics misfire against them.
    pub(crate) const fn disable(&mut self) {
        self.disabled = true;
    }

    /// Admission, window ticks, and hit counting for one allocation of
    /// `size` payload bytes.
    pub(crate) fn observe_alloc(&mut self, size: usize) {
        if (MIN_TRACKED..=MAX_TRACKED).contains(&size) {
            if self.slots[0].size.is_none() {
                self.slots[0] = Slot {
                    size: Some(size),
                    ttl: ADMISSION_TTL,
                    hits: 0,
                    armed: false,
                };
            } else if self.slots[0].size != Some(size) && self.slots[1].size.is_none() {
                self.slots[1] = Slot {
                    size: Some(size),
                    ttl: ADMISSION_TTL,
                    hits: 0,
                    armed: false,
                };
            }
        }

        for slot in &mut self.slots {
            if slot.ttl != -1 {
                slot.ttl -= 1;
            }
        }

        if self.slots[0].size == Some(size) {
            self.slots[0].hits += 1;
        } else if self.slots[1].size == Some(size) {
            self.slots[1].hits += 1;
        }
    }

    /// Arm slot `k` when it qualifies. Returns `true` when the slot is armed
    /// for exactly `size`, in which case the caller should try serving the
    /// request from fresh extension; otherwise the slot is forgotten if its
    /// window ran out.
    pub(crate) fn arm_and_match(&mut self, k: usize, size: usize) -> bool {
        let slot = &mut self.slots[k];
        if slot.ttl >= 0 && slot.hits >= ARM_THRESHOLD {
            slot.ttl = REARM_TTL;
            slot.hits = 1;
            slot.armed = true;
        }
        if slot.armed && slot.size == Some(size) {
            return true;
        }
        if slot.ttl < 0 && slot.size.is_some() {
            *slot = Slot::EMPTY;
        }
        false
    }

    /// One `free` call: every window shrinks, occupied or not. Admission
    /// rewrites whatever an empty slot's counter drifts to.
    pub(crate) fn tick_free(&mut self) {
        for slot in &mut self.slots {
            slot.ttl -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Run one full allocator-call worth of cache traffic and report whether
    /// any slot asked for a bypass.
    fn alloc_call(cache: &mut BypassCache, size: usize) -> bool {
        cache.observe_alloc(size);
        (0..BypassCache::SLOTS).any(|k| cache.arm_and_match(k, size))
    }

    #[test]
    fn admission_fills_slots_in_order() {
        let mut cache = BypassCache::new();
        cache.observe_alloc(64);
        assert_eq!(cache.slots[0].size, Some(64));
        assert_eq!(cache.slots[1].size, None);

        cache.observe_alloc(128);
        assert_eq!(cache.slots[0].size, Some(64));
        assert_eq!(cache.slots[1].size, Some(128));

        // a third size finds no empty slot
        cache.observe_alloc(256);
        assert_eq!(cache.slots[0].size, Some(64));
        assert_eq!(cache.slots[1].size, Some(128));
    }

    #[test]
    fn sizes_outside_the_band_are_ignored() {
        let mut cache = BypassCache::new();
        cache.observe_alloc(MIN_TRACKED - 1);
        cache.observe_alloc(MAX_TRACKED + 1);
        assert_eq!(cache.slots[0].size, None);

        cache.observe_alloc(MIN_TRACKED);
        assert_eq!(cache.slots[0].size, Some(MIN_TRACKED));
        cache.observe_alloc(MAX_TRACKED);
        assert_eq!(cache.slots[1].size, Some(MAX_TRACKED));
    }

    #[test]
    fn a_hot_size_arms_on_the_fiftieth_hit() {
        let mut cache = BypassCache::new();
        for call in 1..ARM_THRESHOLD {
            assert!(!alloc_call(&mut cache, 64), "armed early on call {call}");
        }
        assert!(alloc_call(&mut cache, 64));
        assert!(cache.slots[0].armed);
        assert_eq!(cache.slots[0].ttl, REARM_TTL);
        assert_eq!(cache.slots[0].hits, 1);

        // once armed, matching requests keep bypassing
        assert!(alloc_call(&mut cache, 64));
        // non-matching ones do not
        assert!(!alloc_call(&mut cache, 128));
    }

    #[test]
    fn a_cold_size_is_forgotten_when_the_window_expires() {
        let mut cache = BypassCache::new();
        cache.observe_alloc(64);
        // starve the slot with out-of-band traffic until the window runs out
        for _ in 0..=ADMISSION_TTL {
            assert!(!alloc_call(&mut cache, 1024));
        }
        assert_eq!(cache.slots[0].size, None);
        assert!(!cache.slots[0].armed);
    }

    #[test]
    fn frees_shrink_the_window_too() {
        let mut cache = BypassCache::new();
        cache.observe_alloc(64);
        let before = cache.slots[0].ttl;
        cache.tick_free();
        assert_eq!(cache.slots[0].ttl, before - 1);

        // interleaved alloc/free pairs still arm inside the window:
        // each pair costs two ticks, 49 pairs plus the arming call fit
        let mut cache = BypassCache::new();
        for _ in 0..ARM_THRESHOLD - 1 {
            assert!(!alloc_call(&mut cache, 64));
            cache.tick_free();
        }
        assert!(alloc_call(&mut cache, 64));
    }

    #[test]
    fn an_armed_slot_decays_without_matching_traffic() {
        let mut cache = BypassCache::new();
        for _ in 0..ARM_THRESHOLD {
            alloc_call(&mut cache, 64);
        }
        assert!(cache.slots[0].armed);

        // the refreshed window expires under foreign traffic, the slot goes
        for _ in 0..=REARM_TTL {
            alloc_call(&mut cache, 1024);
        }
        assert_eq!(cache.slots[0].size, None);
        assert!(!cache.slots[0].armed);
    }

    #[test]
    fn disable_is_a_latch() {
        let mut cache = BypassCache::new();
        assert!(cache.is_enabled());
        cache.disable();
        assert!(!cache.is_enabled());
    }
}
