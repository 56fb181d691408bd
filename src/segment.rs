use crossbeam_epoch::{Atomic, Guard, Shared};
use crossbeam_utils::{Backoff, CachePadded};
use std::{
    cell::UnsafeCell,
    mem::MaybeUninit,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// A single cell of a segment.
///
/// The value is written exactly once by the producer that claimed the slot and
/// moved out exactly once by the consumer that claimed it. `published` flips to
/// `true` only after the value has been stored.
struct Slot<T> {
    value: UnsafeCell<MaybeUninit<T>>,
    published: AtomicBool,
}

impl<T> Slot<T> {
    const fn new() -> Self {
        Self {
            value: UnsafeCell::new(MaybeUninit::uninit()),
            published: AtomicBool::new(false),
        }
    }
}

/// Fixed-capacity block of slots forming one link of the queue chain.
///
/// Both cursors count claims, not completed operations, and keep counting past
/// `capacity` when threads race over the end of the segment. Readers of a claim
/// at or beyond `capacity` never touch a slot; they wait for the queue to move
/// on to the successor.
pub(crate) struct Segment<T> {
    slots: Box<[Slot<T>]>,
    write: CachePadded<AtomicUsize>,
    read: CachePadded<AtomicUsize>,
    /// Successor link. Written once by the producer that claims the last slot.
    pub(crate) next: Atomic<Segment<T>>,
    index: usize,
}

impl<T> Segment<T> {
    /// Allocate an empty segment at position `index` of the chain.
    pub(crate) fn new(capacity: usize, index: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| Slot::new()).collect(),
            write: CachePadded::new(AtomicUsize::new(0)),
            read: CachePadded::new(AtomicUsize::new(0)),
            next: Atomic::null(),
            index,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Position of this segment in the chain, starting at 0.
    #[inline]
    pub(crate) const fn index(&self) -> usize {
        self.index
    }

    /// Global sequence number of slot `slot` across the whole chain.
    #[inline]
    pub(crate) fn sequence(&self, slot: usize) -> usize {
        self.index * self.capacity() + slot
    }

    /// Claim the next write index. The result may be `>= capacity`.
    #[inline]
    pub(crate) fn claim_write(&self) -> usize {
        self.write.fetch_add(1, Ordering::AcqRel)
    }

    /// Store `value` in slot `index` and make it visible to readers.
    ///
    /// # Safety
    ///
    /// `index` must be below `capacity` and must have been returned by
    /// [`claim_write`](Self::claim_write) to the calling thread.
    #[inline]
    pub(crate) unsafe fn publish(&self, index: usize, value: T) {
        let slot = &self.slots[index];
        // SAFETY: the claim makes this thread the only writer of the slot and
        // no reader touches it before `published` is set.
        unsafe { (*slot.value.get()).write(value) };
        slot.published.store(true, Ordering::Release);
    }

    /// Claim a read index once the segment is known to be full.
    ///
    /// Every index below `capacity` has already been claimed by a writer, so
    /// no emptiness check is needed.
    #[inline]
    pub(crate) fn claim_read_fast(&self) -> usize {
        self.read.fetch_add(1, Ordering::AcqRel)
    }

    /// Claim a read index while writers may still be filling the segment.
    ///
    /// Returns `None` when every index claimed by a writer has already been
    /// claimed by a reader.
    pub(crate) fn claim_read_slow(&self) -> Option<usize> {
        let backoff = Backoff::new();
        let mut read = self.read.load(Ordering::Acquire);
        loop {
            let write = self.write.load(Ordering::Acquire);
            if read >= write {
                return None;
            }
            match self.read.compare_exchange_weak(
                read,
                read + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return Some(read),
                Err(current) => {
                    read = current;
                    backoff.spin();
                },
            }
        }
    }

    /// Wait for slot `index` to be published and move its value out.
    ///
    /// # Safety
    ///
    /// `index` must be below `capacity` and must have been claimed for reading
    /// by the calling thread.
    pub(crate) unsafe fn take(&self, index: usize) -> T {
        let slot = &self.slots[index];
        let backoff = Backoff::new();
        while !slot.published.load(Ordering::Acquire) {
            backoff.snooze();
        }
        // SAFETY: the slot is published, so the value is initialised, and the
        // read claim makes this thread its only reader.
        unsafe { (*slot.value.get()).assume_init_read() }
    }

    /// Wait for the successor link. Only called once the last slot has been
    /// claimed for writing, so the wait ends as soon as that producer finishes.
    pub(crate) fn wait_next<'g>(&self, guard: &'g Guard) -> Shared<'g, Self> {
        let backoff = Backoff::new();
        loop {
            let next = self.next.load(Ordering::Acquire, guard);
            if !next.is_null() {
                return next;
            }
            backoff.snooze();
        }
    }

    /// Number of published slots that no reader has claimed yet.
    pub(crate) fn pending(&self) -> usize {
        let capacity = self.capacity();
        let write = self.write.load(Ordering::Acquire).min(capacity);
        let read = self.read.load(Ordering::Acquire).min(capacity);
        write.saturating_sub(read)
    }

    /// Number of slots claimed for writing, capped at `capacity`.
    pub(crate) fn written(&self) -> usize {
        self.write.load(Ordering::Acquire).min(self.capacity())
    }

    /// Number of slots claimed for reading, capped at `capacity`.
    pub(crate) fn consumed(&self) -> usize {
        self.read.load(Ordering::Acquire).min(self.capacity())
    }
}

impl<T> Drop for Segment<T> {
    fn drop(&mut self) {
        // Values in [read, write) were published but never handed out. A
        // segment retired by the queue has read == write == capacity here.
        let capacity = self.slots.len();
        let start = (*self.read.get_mut()).min(capacity);
        let end = (*self.write.get_mut()).min(capacity);
        for slot in &mut self.slots[start..end] {
            if *slot.published.get_mut() {
                // SAFETY: published and unclaimed, so initialised and owned by
                // nobody else.
                unsafe { slot.value.get_mut().assume_init_drop() };
            }
        }
    }
}
