use crate::QueueError;

/// Trait for queue producers that can push items into a queue.
///
/// The segmented queue is unbounded, so pushing never fails and never reports
/// back-pressure.
pub trait QueueProducer<T> {
    /// Push a value into the queue.
    ///
    /// # Arguments
    /// * `value` - The value to push
    fn push(&self, value: T);

    /// Push a value and get its sequence number.
    ///
    /// Sequence numbers follow the order in which slots were claimed across
    /// the whole segment chain, which is also the order consumers see.
    ///
    /// # Arguments
    /// * `value` - The value to push
    ///
    /// # Returns
    /// The global sequence number of the slot the value landed in
    fn push_with_seq(&self, value: T) -> usize;
}

/// Trait for queue consumers that can pop items from a queue.
///
/// None of these operations park the calling thread. A caller that wants to
/// wait for data loops on [`try_pop`](Self::try_pop) with its own back-off.
pub trait QueueConsumer<T> {
    /// Pop a value from the queue without waiting for new data.
    ///
    /// # Returns
    /// The popped value on success, or `QueueError::Empty` if the queue is
    /// empty
    fn try_pop(&self) -> Result<T, QueueError>;

    /// Pop a value with sequence number from the queue.
    ///
    /// # Returns
    /// The popped value and sequence number on success, or `QueueError::Empty`
    /// if empty
    fn pop_with_seq(&self) -> Result<(T, usize), QueueError>;

    /// Consume elements with a closure until queue is empty or closure returns
    /// true to stop.
    ///
    /// # Arguments
    /// * `consumer` - Function to process each element, returns true to stop
    ///
    /// # Returns
    /// Number of elements consumed
    fn consume<F>(&self, consumer: F) -> usize
    where
        F: FnMut(T, usize) -> bool;

    /// Check if the queue appears empty.
    /// Note: In concurrent scenarios, this may race with other operations.
    fn is_empty(&self) -> bool;

    /// Get approximate queue size.
    /// Note: In concurrent scenarios, this may not be exact.
    fn size(&self) -> usize;
}

/// Trait for queues that can create producers and consumers.
pub trait QueueFactory<T> {
    /// The type of producers this queue creates
    type Producer: QueueProducer<T>;

    /// The type of consumers this queue creates
    type Consumer: QueueConsumer<T>;

    /// Create both producer and consumer handles in one call.
    ///
    /// # Returns
    /// A tuple containing `(producer, consumer)` handles
    fn channel(&self) -> (Self::Producer, Self::Consumer) {
        (self.producer(), self.consumer())
    }

    /// Create a new producer handle for this queue.
    fn producer(&self) -> Self::Producer;

    /// Create a new consumer handle for this queue.
    fn consumer(&self) -> Self::Consumer;
}
