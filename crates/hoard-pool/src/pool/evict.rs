//! LRU eviction planning.
//!
//! Planning is pure: given the current figures and the evictable blobs it
//! decides which blobs to drop, or that no amount of eviction suffices. The
//! store then evicts one blob at a time and re-checks real figures.

/// An evictable blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub key: String,
    pub size: u64,
    pub last_accessed: i64,
    pub seq: u64,
}

/// Space needed by a pending write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoomRequest {
    /// Bytes the write adds to pool usage
    pub usage_incoming: u64,
    /// Bytes the write still has to put on the device; `None` skips the free-space check
    pub device_incoming: Option<u64>,
}

/// Current figures the request is checked against
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Budget {
    pub usage: u64,
    pub maximum_pool_size: u64,
    pub available_space: u64,
    pub reserved_free_space: u64,
}

impl Budget {
    /// Whether the request fits after freeing `freed` bytes
    pub fn fits(&self, request: &RoomRequest, freed: u64) -> bool {
        let usage = self.usage.saturating_sub(freed);
        let cap_ok = usage
            .checked_add(request.usage_incoming)
            .map(|total| total <= self.maximum_pool_size)
            .unwrap_or(false);
        let free_ok = match request.device_incoming {
            None => true,
            Some(incoming) => {
                let available = self.available_space.saturating_add(freed);
                available >= self.reserved_free_space.saturating_add(incoming)
            }
        };
        cap_ok && free_ok
    }
}

/// Order candidates oldest access first, ties by insertion order
pub fn lru_order(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| {
        a.last_accessed
            .cmp(&b.last_accessed)
            .then(a.seq.cmp(&b.seq))
    });
}

/// Pick the shortest LRU prefix of candidates that makes the request fit.
/// Returns `None` when even evicting every candidate is not enough.
pub fn plan_eviction(
    budget: &Budget,
    request: &RoomRequest,
    mut candidates: Vec<Candidate>,
) -> Option<Vec<Candidate>> {
    lru_order(&mut candidates);
    let mut freed = 0u64;
    let mut plan = Vec::new();
    if budget.fits(request, freed) {
        return Some(plan);
    }
    for candidate in candidates {
        freed += candidate.size;
        plan.push(candidate);
        if budget.fits(request, freed) {
            return Some(plan);
        }
    }
    None
}
