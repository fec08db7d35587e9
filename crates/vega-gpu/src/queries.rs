//! Occlusion query pool.
//!
//! Query objects are device resources with a lifetime of several frames (a
//! query issued this frame is polled on a later one), so they are pooled and
//! recycled rather than created per use.

/// Handle to a device occlusion query object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OcclusionQueryId(pub u32);

/// Allocator for occlusion query objects.
///
/// `begin_frame` recycles every query released since it could last have been
/// in flight; `allocate` hands out a recycled query or mints a new id. The
/// pool never shrinks.
#[derive(Debug, Default)]
pub struct OcclusionQueryPool {
    free: Vec<OcclusionQueryId>,
    /// Queries released this frame; they may still be in flight on the
    /// device, so they only become allocatable after `latency` frames.
    retiring: Vec<Vec<OcclusionQueryId>>,
    next_id: u32,
    frame: usize,
}

/// Frames a query result may lag its issue before the pool reuses the
/// object.
const QUERY_LATENCY_FRAMES: usize = 2;

impl OcclusionQueryPool {
    pub fn new() -> Self {
        Self {
            free: Vec::new(),
            retiring: (0..=QUERY_LATENCY_FRAMES).map(|_| Vec::new()).collect(),
            next_id: 0,
            frame: 0,
        }
    }

    /// Total query objects ever created.
    pub fn created(&self) -> usize {
        self.next_id as usize
    }

    /// Advance the recycle window. Queries released `QUERY_LATENCY_FRAMES`
    /// frames ago become allocatable again.
    pub fn begin_frame(&mut self) {
        self.frame += 1;
        let slot = self.frame % self.retiring.len();
        let recycled = std::mem::take(&mut self.retiring[slot]);
        self.free.extend(recycled);
    }

    pub fn allocate(&mut self) -> OcclusionQueryId {
        match self.free.pop() {
            Some(id) => id,
            None => {
                let id = OcclusionQueryId(self.next_id);
                self.next_id += 1;
                id
            }
        }
    }

    /// Return a query whose result has been consumed (or abandoned).
    pub fn release(&mut self, id: OcclusionQueryId) {
        let slot = self.frame % self.retiring.len();
        self.retiring[slot].push(id);
    }
}
