use std::sync::atomic::{AtomicU32, Ordering};

/// Run-wide frame budget shared by every session.
///
/// A session claims a slot right before handing a frame to the writer, so the
/// total number of persisted frames never exceeds `limit` even when offsets
/// run in parallel.
#[derive(Debug)]
pub struct FrameBudget {
    limit: u32,
    claimed: AtomicU32,
}

impl FrameBudget {
    pub fn new(limit: u32) -> Self {
        Self { limit, claimed: AtomicU32::new(0) }
    }

    /// Takes one slot. Returns false once the budget is spent.
    pub fn try_claim(&self) -> bool {
        self.claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < self.limit).then_some(n + 1))
            .is_ok()
    }

    /// Gives back a slot whose frame never made it to disk.
    pub fn release(&self) {
        let _ = self
            .claimed
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    pub fn claimed(&self) -> u32 {
        self.claimed.load(Ordering::Acquire)
    }

    pub fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.claimed())
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }
}
