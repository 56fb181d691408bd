use crossbeam_utils::CachePadded;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time view of a queue's segment bookkeeping.
///
/// Counters are only touched at segment boundaries, never per item. A snapshot
/// taken while other threads are active may be slightly stale, but never
/// shows more retired segments than allocated ones.
///
/// # Examples
///
/// ```
/// use segq::SegQueue;
///
/// # fn main() -> Result<(), segq::QueueError> {
/// let queue = SegQueue::with_segment_capacity(2)?;
/// queue.enqueue(1u8);
/// queue.enqueue(2u8);
///
/// let stats = queue.stats();
/// assert_eq!(stats.segments_allocated, 2);
/// assert_eq!(stats.live_segments(), 2);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Segments allocated so far, including the initial one.
    pub segments_allocated: usize,
    /// Segments drained and handed to the reclaimer.
    pub segments_retired: usize,
    /// Times a producer claimed an index past the end of a full segment and
    /// had to wait for the tail to move.
    pub producer_overshoots: usize,
    /// Times a consumer claimed an index past the end of a drained segment and
    /// had to wait for the head to move.
    pub consumer_overshoots: usize,
}

impl QueueStats {
    /// Segments currently linked into the chain.
    ///
    /// Saturates at zero for hand-built values where `segments_retired`
    /// exceeds `segments_allocated`.
    pub const fn live_segments(&self) -> usize {
        self.segments_allocated.saturating_sub(self.segments_retired)
    }
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    segments_allocated: CachePadded<AtomicUsize>,
    segments_retired: CachePadded<AtomicUsize>,
    producer_overshoots: CachePadded<AtomicUsize>,
    consumer_overshoots: CachePadded<AtomicUsize>,
}

impl Counters {
    pub(crate) fn segment_allocated(&self) {
        self.segments_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn segment_retired(&self) {
        self.segments_retired.fetch_add(1, Ordering::Release);
    }

    pub(crate) fn producer_overshoot(&self) {
        self.producer_overshoots.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn consumer_overshoot(&self) {
        self.consumer_overshoots.fetch_add(1, Ordering::Relaxed);
    }

    /// A segment's successor is counted before it is linked, and a segment is
    /// retired only after its successor is linked. Reading the retired count
    /// first therefore never yields more retirements than allocations.
    pub(crate) fn snapshot(&self) -> QueueStats {
        let segments_retired = self.segments_retired.load(Ordering::Acquire);
        let segments_allocated = self.segments_allocated.load(Ordering::Relaxed);
        QueueStats {
            segments_allocated,
            segments_retired,
            producer_overshoots: self.producer_overshoots.load(Ordering::Relaxed),
            consumer_overshoots: self.consumer_overshoots.load(Ordering::Relaxed),
        }
    }
}
