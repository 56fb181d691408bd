//! # segq: Unbounded Segmented Lock-Free MPMC Queue
//!
//! `segq` provides an unbounded FIFO queue for any number of concurrent
//! producer and consumer threads, built without locks.
//!
//! ## Features
//!
//! - **Lock-free claims**: producers and consumers take slots with a single
//!   fetch-and-add or compare-and-swap
//! - **Unbounded**: storage grows one fixed-size segment at a time, and
//!   enqueueing never fails
//! - **Non-blocking consumption**: an empty queue is reported immediately, it is
//!   never waited on
//! - **Any payload**: values are moved in and out, no `Copy` or `Default` bound
//! - **Safe reclamation**: drained segments are freed through epoch-based
//!   deferred destruction
//!
//! ## Usage
//!
//! ```rust
//! use segq::SegQueue;
//!
//! let queue = SegQueue::new();
//! queue.enqueue(String::from("hello"));
//!
//! assert_eq!(queue.try_dequeue().as_deref(), Some("hello"));
//! assert_eq!(queue.try_dequeue(), None);
//! ```
//!
//! ### Producer and consumer handles
//!
//! ```rust
//! use segq::{
//!     queue,
//!     traits::{QueueConsumer, QueueProducer},
//! };
//! use std::thread;
//!
//! # fn main() -> Result<(), segq::QueueError> {
//! let (producer, consumer) = queue::<usize>().segment_capacity(64).channels()?;
//!
//! let handles: Vec<_> = (0..4)
//!     .map(|t| {
//!         let producer = producer.clone();
//!         thread::spawn(move || {
//!             for i in 0..100 {
//!                 producer.push(t * 100 + i);
//!             }
//!         })
//!     })
//!     .collect();
//! for handle in handles {
//!     handle.join().unwrap();
//! }
//!
//! let mut received = 0;
//! while consumer.try_pop().is_ok() {
//!     received += 1;
//! }
//! assert_eq!(received, 400);
//! # Ok(())
//! # }
//! ```
//!
//! ## How it works
//!
//! The queue is a chain of segments, each an array of
//! [`DEFAULT_SEGMENT_CAPACITY`] slots (configurable) with a write cursor, a read
//! cursor and a per-slot publish flag. A producer claims an index with a
//! fetch-and-add on the tail segment's write cursor, stores its value and then
//! raises the slot's flag. The producer that claims the last slot allocates the
//! next segment and moves the tail.
//!
//! A consumer reading a segment that already has a successor claims with a
//! fetch-and-add; otherwise it first checks that a writer is ahead of it and
//! claims with a compare-and-swap. It then waits for the slot's flag. The
//! consumer that takes the last slot moves the head to the successor and
//! retires the drained segment.
//!
//! Items are delivered in the order their slots were claimed, so a single
//! producer's items are never reordered.
//!
//! ## Error Handling
//!
//! Enqueueing cannot fail and an empty dequeue is `None`. [`QueueError`] only
//! covers:
//! - `QueueError::Empty` - returned by the `Result`-based consumer trait
//! - `QueueError::InvalidCapacity` - a zero segment capacity
//!
//! ## Known limitation
//!
//! A producer that stops between claiming a slot and publishing it stalls every
//! consumer that reaches that slot. Nothing recovers such a slot.
#![deny(
    missing_docs,
    unused_imports,
    unused_variables,
    dead_code,
    unreachable_code,
    unused_must_use
)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::cast_precision_loss,
    clippy::missing_panics_doc
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// The segmented queue, its builder and its producer/consumer handles.
///
/// [`SegQueue`] is usable directly through a shared reference; the builder
/// returned by [`queue()`] wraps it in an `Arc` and hands out cloneable
/// handles.
pub mod queue;

/// Segment transition counters exposed through [`SegQueue::stats`].
pub mod stats;

/// Common traits for queue producers, consumers, and factories.
///
/// [`QueueProducer`]: traits::QueueProducer
/// [`QueueConsumer`]: traits::QueueConsumer
/// [`QueueFactory`]: traits::QueueFactory
pub mod traits;

mod segment;

pub use queue::{Consumer, Producer, QueueBuilder, SegQueue, queue};
pub use stats::QueueStats;

use thiserror::Error;

/// Slots per segment when no capacity is configured.
pub const DEFAULT_SEGMENT_CAPACITY: usize = 200;

/// Errors that can occur during queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue contains no elements to consume.
    ///
    /// Only the `Result`-based [`QueueConsumer`](traits::QueueConsumer)
    /// methods report this; [`SegQueue::try_dequeue`] returns `None` instead.
    #[error("queue is empty")]
    Empty,

    /// The requested segment capacity is invalid.
    ///
    /// Every segment must hold at least one slot.
    #[error("invalid segment capacity: must be at least 1")]
    InvalidCapacity,
}
