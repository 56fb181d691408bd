use crate::{
    DEFAULT_SEGMENT_CAPACITY, QueueError,
    segment::Segment,
    stats::{Counters, QueueStats},
    traits::{QueueConsumer, QueueFactory, QueueProducer},
};
use crossbeam_epoch::{self as epoch, Atomic, Guard, Owned, Shared};
use crossbeam_utils::{Backoff, CachePadded};
use std::{
    fmt,
    marker::PhantomData,
    sync::{Arc, atomic::Ordering},
};
use tracing::{debug, trace};

/// Unbounded segmented lock-free MPMC queue.
///
/// Items live in a singly linked chain of fixed-capacity segments. Producers
/// claim slots at the tail with a fetch-and-add on the tail segment's write
/// cursor; consumers claim slots at the head with either a fetch-and-add (the
/// segment is full and its successor exists) or a compare-and-swap guarded by
/// an emptiness check (the segment may still be receiving writes).
///
/// - **Unbounded**: [`enqueue`](Self::enqueue) always succeeds
/// - **Non-blocking consumption**: [`try_dequeue`](Self::try_dequeue) returns
///   `None` instead of waiting for data
/// - **FIFO in claim order**: items come out in the order their slots were
///   claimed, so one producer's items are never reordered
///
/// # Waiting
///
/// The queue never parks a thread, but four short busy-waits exist: a producer
/// that overshoots a full segment waits for the tail to move, and a consumer
/// may wait for a slot to be published, for a full segment's successor link,
/// or for the head to move past a drained segment. Each wait ends when another
/// thread's in-flight operation completes. A producer that is descheduled
/// between claiming and publishing a slot stalls consumers that reach that
/// slot, and a producer that dies there stalls them forever.
///
/// # Reclamation
///
/// Drained segments are retired through `crossbeam-epoch` and freed once no
/// pinned thread can still observe them.
///
/// # Examples
///
/// ```
/// use segq::SegQueue;
///
/// let queue = SegQueue::new();
/// queue.enqueue("a");
/// queue.enqueue("b");
///
/// assert_eq!(queue.try_dequeue(), Some("a"));
/// assert_eq!(queue.try_dequeue(), Some("b"));
/// assert_eq!(queue.try_dequeue(), None);
/// ```
pub struct SegQueue<T> {
    head: CachePadded<Atomic<Segment<T>>>,
    tail: CachePadded<Atomic<Segment<T>>>,
    segment_capacity: usize,
    counters: Counters,
}

impl<T> fmt::Debug for SegQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SegQueue")
            .field("segment_capacity", &self.segment_capacity)
            .field("len", &self.len())
            .field("segments", &self.segment_count())
            .finish_non_exhaustive()
    }
}

impl<T> Default for SegQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SegQueue<T> {
    /// Create an empty queue with [`DEFAULT_SEGMENT_CAPACITY`] slots per
    /// segment.
    pub fn new() -> Self {
        Self::from_capacity(DEFAULT_SEGMENT_CAPACITY)
    }

    /// Create an empty queue whose segments hold `capacity` slots each.
    ///
    /// Larger segments mean fewer allocations and boundary hand-offs, smaller
    /// ones mean less memory held by a mostly empty queue.
    pub fn with_segment_capacity(capacity: usize) -> Result<Self, QueueError> {
        if capacity == 0 {
            return Err(QueueError::InvalidCapacity);
        }
        Ok(Self::from_capacity(capacity))
    }

    fn from_capacity(segment_capacity: usize) -> Self {
        let guard = &epoch::pin();
        let first = Owned::new(Segment::new(segment_capacity, 0)).into_shared(guard);
        let counters = Counters::default();
        counters.segment_allocated();
        debug!(segment_capacity, "created segmented queue");

        Self {
            head: CachePadded::new(Atomic::from(first)),
            tail: CachePadded::new(Atomic::from(first)),
            segment_capacity,
            counters,
        }
    }

    /// Number of slots in every segment of this queue.
    pub const fn segment_capacity(&self) -> usize {
        self.segment_capacity
    }

    /// Append `value` at the tail.
    ///
    /// Never fails. Returns the global sequence number of the claimed slot;
    /// consumers receive items in increasing sequence order.
    pub fn enqueue(&self, value: T) -> usize {
        let guard = &epoch::pin();
        let backoff = Backoff::new();

        loop {
            let tail = self.tail.load(Ordering::Acquire, guard);
            // SAFETY: the tail is never null, and the pinned guard keeps the
            // segment alive even if it is retired meanwhile.
            let segment = unsafe { tail.deref() };
            let index = segment.claim_write();

            if index < self.segment_capacity {
                // SAFETY: `index` is in bounds and was claimed by this thread.
                unsafe { segment.publish(index, value) };
                if index + 1 == self.segment_capacity {
                    self.install_successor(segment, guard);
                }
                return segment.sequence(index);
            }

            // Raced past the end of a full segment: the producer that claimed
            // its last slot is installing the successor.
            self.counters.producer_overshoot();
            trace!(segment = segment.index(), index, "producer overshot segment");
            while self.tail.load(Ordering::Acquire, guard) == tail {
                backoff.snooze();
            }
            backoff.reset();
        }
    }

    /// Link a fresh segment after `full`.
    ///
    /// The tail moves before `next` is published: a consumer that sees `next`
    /// may retire `full`, and by then nothing may still route producers to it.
    /// The allocation is counted before either store so that no snapshot sees
    /// `full` retired ahead of its successor being counted.
    fn install_successor(&self, full: &Segment<T>, guard: &Guard) {
        let next = Owned::new(Segment::new(self.segment_capacity, full.index() + 1))
            .into_shared(guard);
        self.counters.segment_allocated();
        self.tail.store(next, Ordering::Release);
        full.next.store(next, Ordering::Release);
        trace!(segment = full.index() + 1, "allocated segment");
    }

    /// Remove the item at the head, if one is available right now.
    ///
    /// Returns `None` without waiting when every claimed slot has already been
    /// handed out.
    pub fn try_dequeue(&self) -> Option<T> {
        self.try_dequeue_with_seq().map(|(value, _)| value)
    }

    /// Like [`try_dequeue`](Self::try_dequeue), also returning the sequence
    /// number the item was enqueued with.
    pub fn try_dequeue_with_seq(&self) -> Option<(T, usize)> {
        let guard = &epoch::pin();
        let backoff = Backoff::new();

        loop {
            let head = self.head.load(Ordering::Acquire, guard);
            // SAFETY: the head is never null and the guard keeps it alive.
            let segment = unsafe { head.deref() };

            let index = if segment.next.load(Ordering::Acquire, guard).is_null() {
                segment.claim_read_slow()?
            } else {
                segment.claim_read_fast()
            };

            if index < self.segment_capacity {
                // SAFETY: `index` is in bounds and was claimed by this thread.
                let value = unsafe { segment.take(index) };
                if index + 1 == self.segment_capacity {
                    self.retire_head(head, segment, guard);
                }
                return Some((value, segment.sequence(index)));
            }

            // Raced past the end of a drained segment: the consumer that
            // claimed its last slot is moving the head along.
            self.counters.consumer_overshoot();
            trace!(segment = segment.index(), index, "consumer overshot segment");
            while self.head.load(Ordering::Acquire, guard) == head {
                backoff.snooze();
            }
            backoff.reset();
        }
    }

    /// Advance the head past `drained` and hand it to the reclaimer.
    fn retire_head<'g>(
        &self,
        head: Shared<'g, Segment<T>>,
        drained: &Segment<T>,
        guard: &'g Guard,
    ) {
        let next = drained.wait_next(guard);
        self.head.store(next, Ordering::Release);
        // SAFETY: the head no longer points at the segment, the tail moved on
        // before `next` became visible, and the predecessor is already retired.
        // Threads still holding it are pinned, so destruction is deferred
        // past them.
        unsafe { guard.defer_destroy(head) };
        self.counters.segment_retired();
        trace!(segment = drained.index(), "retired segment");
    }

    /// Approximate number of items in the queue.
    ///
    /// Counts claimed write slots minus claimed read slots between the head
    /// and the tail; racing operations make the value a snapshot at best.
    pub fn len(&self) -> usize {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        let tail = self.tail.load(Ordering::Acquire, guard);
        // SAFETY: both pointers are non-null and protected by the guard.
        let (head, tail) = unsafe { (head.deref(), tail.deref()) };

        if head.index() == tail.index() {
            return head.pending();
        }
        let written = tail.index() * self.segment_capacity + tail.written();
        let consumed = head.index() * self.segment_capacity + head.consumed();
        written.saturating_sub(consumed)
    }

    /// Whether the queue appears empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of segments currently linked between head and tail.
    pub fn segment_count(&self) -> usize {
        let guard = &epoch::pin();
        let head = self.head.load(Ordering::Acquire, guard);
        let tail = self.tail.load(Ordering::Acquire, guard);
        // SAFETY: both pointers are non-null and protected by the guard.
        let (head, tail) = unsafe { (head.deref(), tail.deref()) };
        (tail.index() + 1).saturating_sub(head.index())
    }

    /// Snapshot of segment transition counters.
    pub fn stats(&self) -> QueueStats {
        self.counters.snapshot()
    }
}

impl<T> Drop for SegQueue<T> {
    fn drop(&mut self) {
        let stats = self.counters.snapshot();
        debug!(
            pending = self.len(),
            segments_allocated = stats.segments_allocated,
            segments_retired = stats.segments_retired,
            "dropping segmented queue"
        );

        // SAFETY: `&mut self` means no other thread can reach the chain, and
        // retired segments are no longer linked from the head.
        unsafe {
            let guard = epoch::unprotected();
            let mut current = self.head.load(Ordering::Relaxed, guard);
            while !current.is_null() {
                let next = current.deref().next.load(Ordering::Relaxed, guard);
                drop(current.into_owned());
                current = next;
            }
        }
    }
}

// Safety: values of `T` are moved between threads through the slots, and all
// shared bookkeeping is atomic.
unsafe impl<T: Send> Send for SegQueue<T> {}

unsafe impl<T: Send> Sync for SegQueue<T> {}

/// Builder for creating segmented queues.
///
/// # Examples
///
/// ```
/// use segq::{
///     queue,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), segq::QueueError> {
/// let (producer, consumer) = queue::<u32>().segment_capacity(64).channels()?;
///
/// producer.push(100);
/// assert_eq!(consumer.try_pop()?, 100);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct QueueBuilder<T> {
    segment_capacity: Option<usize>,
    _phantom: PhantomData<T>,
}

impl<T> Default for QueueBuilder<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> QueueBuilder<T> {
    /// Create a new queue builder
    pub const fn new() -> Self {
        Self {
            segment_capacity: None,
            _phantom: PhantomData,
        }
    }

    /// Set the number of slots per segment (must be non-zero)
    #[must_use]
    pub const fn segment_capacity(mut self, capacity: usize) -> Self {
        self.segment_capacity = Some(capacity);
        self
    }

    /// Build the queue
    pub fn build(self) -> Result<Arc<SegQueue<T>>, QueueError> {
        let capacity = self.segment_capacity.unwrap_or(DEFAULT_SEGMENT_CAPACITY);
        Ok(Arc::new(SegQueue::with_segment_capacity(capacity)?))
    }

    /// Create producer/consumer pair
    pub fn channels(self) -> Result<(Producer<T>, Consumer<T>), QueueError> {
        let queue = self.build()?;
        Ok((queue.producer(), queue.consumer()))
    }
}

/// Convenience function for creating queues.
///
/// # Examples
///
/// ```
/// use segq::{queue, traits::QueueProducer};
///
/// # fn main() -> Result<(), segq::QueueError> {
/// let (producer, _consumer) = queue::<String>().channels()?;
///
/// producer.push("hello".to_string());
/// # Ok(())
/// # }
/// ```
pub const fn queue<T>() -> QueueBuilder<T> {
    QueueBuilder::new()
}

/// Convenient type alias for [`QueueProducerHandle`].
pub type Producer<T> = QueueProducerHandle<T>;

/// Convenient type alias for [`QueueConsumerHandle`].
pub type Consumer<T> = QueueConsumerHandle<T>;

/// Producer handle for the segmented queue.
///
/// A lightweight, cloneable handle sharing the queue via `Arc`.
///
/// # Examples
///
/// ```
/// use segq::{queue, traits::QueueProducer};
/// use std::thread;
///
/// # fn main() -> Result<(), segq::QueueError> {
/// let (producer, consumer) = queue::<u64>().channels()?;
///
/// let producer2 = producer.clone();
/// let handle = thread::spawn(move || {
///     producer2.push(42);
/// });
///
/// producer.push(100);
/// handle.join().unwrap();
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueueProducerHandle<T> {
    queue: Arc<SegQueue<T>>,
}

impl<T> Clone for QueueProducerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> QueueProducer<T> for QueueProducerHandle<T> {
    fn push(&self, value: T) {
        self.queue.enqueue(value);
    }

    fn push_with_seq(&self, value: T) -> usize {
        self.queue.enqueue(value)
    }
}

/// Consumer handle for the segmented queue.
///
/// A lightweight, cloneable handle sharing the queue via `Arc`.
///
/// # Examples
///
/// ```
/// use segq::{
///     queue,
///     traits::{QueueConsumer, QueueProducer},
/// };
///
/// # fn main() -> Result<(), segq::QueueError> {
/// let (producer, consumer) = queue::<i32>().channels()?;
///
/// producer.push(1);
/// producer.push(2);
/// producer.push(3);
///
/// let mut sum = 0;
/// consumer.consume(|val, _seq| {
///     sum += val;
///     false // continue until empty
/// });
/// assert_eq!(sum, 6);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct QueueConsumerHandle<T> {
    queue: Arc<SegQueue<T>>,
}

impl<T> Clone for QueueConsumerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
        }
    }
}

impl<T> QueueConsumer<T> for QueueConsumerHandle<T> {
    fn try_pop(&self) -> Result<T, QueueError> {
        self.queue.try_dequeue().ok_or(QueueError::Empty)
    }

    fn pop_with_seq(&self) -> Result<(T, usize), QueueError> {
        self.queue.try_dequeue_with_seq().ok_or(QueueError::Empty)
    }

    fn consume<F>(&self, mut consumer: F) -> usize
    where
        F: FnMut(T, usize) -> bool,
    {
        let mut count = 0;
        while let Ok((value, seq)) = self.pop_with_seq() {
            count += 1;
            if consumer(value, seq) {
                break;
            }
        }
        count
    }

    fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    fn size(&self) -> usize {
        self.queue.len()
    }
}

impl<T> QueueFactory<T> for Arc<SegQueue<T>> {
    type Producer = QueueProducerHandle<T>;
    type Consumer = QueueConsumerHandle<T>;

    fn producer(&self) -> Self::Producer {
        QueueProducerHandle {
            queue: self.clone(),
        }
    }

    fn consumer(&self) -> Self::Consumer {
        QueueConsumerHandle {
            queue: self.clone(),
        }
    }
}
