//! Monotonic request id allocation.

use cast_proto::RequestId;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};

/// Shared counter handing out request ids.
///
/// Clones share the same counter. Ids are never reset; after `u32::MAX`
/// the counter wraps.
#[derive(Debug, Clone)]
pub struct RequestIdSequence {
    next: Arc<AtomicU32>,
}

impl RequestIdSequence {
    /// Fresh sequence starting at 1.
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: RequestId) -> Self {
        Self {
            next: Arc::new(AtomicU32::new(first)),
        }
    }

    /// The sequence shared by every client in this process.
    pub fn process_wide() -> Self {
        static GLOBAL: OnceLock<RequestIdSequence> = OnceLock::new();
        GLOBAL.get_or_init(RequestIdSequence::new).clone()
    }

    /// Allocate the next id.
    pub fn next_id(&self) -> RequestId {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Whether two handles share one counter.
    pub fn shares_counter_with(&self, other: &RequestIdSequence) -> bool {
        Arc::ptr_eq(&self.next, &other.next)
    }
}

impl Default for RequestIdSequence {
    fn default() -> Self {
        Self::new()
    }
}
