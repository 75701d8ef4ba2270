//! Bounded FIFO queue with blocking backpressure.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::{Notify, Semaphore, TryAcquireError};

use crate::error::SpindleError;

/// Largest capacity a queue accepts; bounded by what the slot semaphore can count.
pub const MAX_CAPACITY: usize = Semaphore::MAX_PERMITS;

struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// Fixed-capacity FIFO shared by many producers and one consumer.
///
/// # 実装詳細
/// - `slots`: 空きスロット数。tokio の Semaphore は待ち行列が FIFO なので、
///   満杯で待っている producer は到着順に入る
/// - `state`: VecDeque + closed フラグ。ロックは await を跨がない
/// - `not_empty`: push / close の通知
pub struct WorkQueue<T> {
    capacity: usize,
    state: Mutex<QueueState<T>>,
    slots: Semaphore,
    not_empty: Notify,
}

impl<T> WorkQueue<T> {
    /// # Errors
    /// [`SpindleError::InvalidCapacity`] when `capacity` is zero or above
    /// [`MAX_CAPACITY`].
    pub fn new(capacity: usize) -> Result<Self, SpindleError> {
        if capacity == 0 || capacity > MAX_CAPACITY {
            return Err(SpindleError::InvalidCapacity(capacity));
        }
        Ok(Self {
            capacity,
            state: Mutex::new(QueueState {
                // 上限は slots が守るので事前確保はしない
                items: VecDeque::new(),
                closed: false,
            }),
            slots: Semaphore::new(capacity),
            not_empty: Notify::new(),
        })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().items.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Append `item`, suspending while the queue is full.
    ///
    /// No timeout: race this future against your own deadline if needed.
    ///
    /// # Errors
    /// [`SpindleError::QueueClosed`] if the queue is closed before a slot
    /// frees up. The item is dropped.
    pub async fn enqueue(&self, item: T) -> Result<(), SpindleError> {
        let permit = self
            .slots
            .acquire()
            .await
            .map_err(|_| SpindleError::QueueClosed)?;
        self.push(item, permit)
    }

    /// Append `item` only if a slot is free right now.
    ///
    /// # Errors
    /// [`SpindleError::QueueFull`] or [`SpindleError::QueueClosed`].
    pub fn try_enqueue(&self, item: T) -> Result<(), SpindleError> {
        let permit = self.slots.try_acquire().map_err(|e| match e {
            TryAcquireError::NoPermits => SpindleError::QueueFull,
            TryAcquireError::Closed => SpindleError::QueueClosed,
        })?;
        self.push(item, permit)
    }

    fn push(&self, item: T, permit: tokio::sync::SemaphorePermit<'_>) -> Result<(), SpindleError> {
        {
            let mut state = self.state.lock();
            // permit を取った後に close された場合
            if state.closed {
                return Err(SpindleError::QueueClosed);
            }
            state.items.push_back(item);
            // slot is handed back by dequeue, not by dropping the permit
            permit.forget();
        }
        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove and return the head item, suspending while the queue is empty.
    ///
    /// # Errors
    /// [`SpindleError::QueueClosed`] once the queue is closed and everything
    /// buffered before the close has been handed out.
    pub async fn dequeue(&self) -> Result<T, SpindleError> {
        loop {
            let notified = self.not_empty.notified();
            tokio::pin!(notified);
            // close() の notify_waiters を取りこぼさないよう、状態確認の前に登録する
            notified.as_mut().enable();

            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    drop(state);
                    self.slots.add_permits(1);
                    return Ok(item);
                }
                if state.closed {
                    return Err(SpindleError::QueueClosed);
                }
            }

            notified.await;
        }
    }

    /// Stop accepting items. Buffered items stay available to `dequeue`.
    ///
    /// Producers suspended in `enqueue` are woken with `QueueClosed`.
    /// Calling this more than once is harmless.
    pub fn close(&self) {
        {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
        }
        self.slots.close();
        self.not_empty.notify_waiters();
    }

    /// Remove every buffered item at once, in FIFO order.
    pub fn drain_pending(&self) -> Vec<T> {
        let drained: Vec<T> = self.state.lock().items.drain(..).collect();
        if !drained.is_empty() {
            self.slots.add_permits(drained.len());
        }
        drained
    }
}

impl<T> std::fmt::Debug for WorkQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("WorkQueue")
            .field("capacity", &self.capacity)
            .field("len", &state.items.len())
            .field("closed", &state.closed)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn zero_capacity_is_rejected() {
        let err = WorkQueue::<u32>::new(0).unwrap_err();
        assert_eq!(err, SpindleError::InvalidCapacity(0));
    }

    #[rstest]
    #[case::past_semaphore_limit(MAX_CAPACITY + 1)]
    #[case::usize_max(usize::MAX)]
    fn oversized_capacity_is_rejected(#[case] capacity: usize) {
        let err = WorkQueue::<u64>::new(capacity).unwrap_err();
        assert_eq!(err, SpindleError::InvalidCapacity(capacity));
    }

    #[test]
    fn max_capacity_does_not_preallocate() {
        let queue = WorkQueue::<u64>::new(MAX_CAPACITY).unwrap();
        assert_eq!(queue.capacity(), MAX_CAPACITY);
        queue.try_enqueue(1).unwrap();
        assert_eq!(queue.len(), 1);
    }

    #[rstest]
    #[case::exact(4, 4)]
    #[case::roomy(16, 5)]
    #[case::single(1, 1)]
    #[tokio::test]
    async fn dequeue_order_matches_enqueue_order(#[case] capacity: usize, #[case] n: u32) {
        let queue = WorkQueue::new(capacity).unwrap();
        for i in 0..n {
            queue.enqueue(i).await.unwrap();
        }
        assert_eq!(queue.len(), n as usize);

        let mut seen = Vec::new();
        for _ in 0..n {
            seen.push(queue.dequeue().await.unwrap());
        }
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn full_queue_blocks_until_dequeue() {
        let queue = Arc::new(WorkQueue::new(1).unwrap());
        queue.enqueue("a").await.unwrap();

        let producer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.enqueue("b").await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.dequeue().await.unwrap(), "a");
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue().await.unwrap(), "b");
    }

    #[tokio::test]
    async fn blocked_producers_are_admitted_in_arrival_order() {
        let queue = Arc::new(WorkQueue::new(1).unwrap());
        queue.enqueue(0).await.unwrap();

        let mut producers = Vec::new();
        for i in 1..=3 {
            let queue = Arc::clone(&queue);
            producers.push(tokio::spawn(async move { queue.enqueue(i).await }));
            // 到着順を確定させる
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        let mut seen = Vec::new();
        for _ in 0..4 {
            seen.push(queue.dequeue().await.unwrap());
        }
        for p in producers {
            p.await.unwrap().unwrap();
        }
        assert_eq!(seen, vec![0, 1, 2, 3]);
    }

    #[tokio::test]
    async fn dequeue_waits_for_item() {
        let queue = Arc::new(WorkQueue::new(2).unwrap());
        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.dequeue().await }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!consumer.is_finished());

        queue.enqueue(7).await.unwrap();
        assert_eq!(consumer.await.unwrap(), Ok(7));
    }

    #[test]
    fn try_enqueue_rejects_when_full() {
        let queue = WorkQueue::new(2).unwrap();
        queue.try_enqueue(1).unwrap();
        queue.try_enqueue(2).unwrap();
        assert_eq!(queue.try_enqueue(3), Err(SpindleError::QueueFull));
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn close_rejects_new_items_but_drains_old() {
        let queue = WorkQueue::new(4).unwrap();
        queue.enqueue(1).await.unwrap();
        queue.enqueue(2).await.unwrap();
        queue.close();

        assert!(queue.is_closed());
        assert_eq!(queue.enqueue(3).await, Err(SpindleError::QueueClosed));
        assert_eq!(queue.try_enqueue(3), Err(SpindleError::QueueClosed));

        assert_eq!(queue.dequeue().await, Ok(1));
        assert_eq!(queue.dequeue().await, Ok(2));
        assert_eq!(queue.dequeue().await, Err(SpindleError::QueueClosed));
        // closed-and-drained は何度呼んでも同じ結果
        assert_eq!(queue.dequeue().await, Err(SpindleError::QueueClosed));
    }

    #[tokio::test]
    async fn close_wakes_waiting_consumer() {
        let queue = Arc::new(WorkQueue::<u8>::new(1).unwrap());
        let consumer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.dequeue().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = timeout(Duration::from_secs(1), consumer).await.unwrap().unwrap();
        assert_eq!(result, Err(SpindleError::QueueClosed));
    }

    #[tokio::test]
    async fn close_wakes_blocked_producer() {
        let queue = Arc::new(WorkQueue::new(1).unwrap());
        queue.enqueue(1).await.unwrap();

        let producer = tokio::spawn({
            let queue = Arc::clone(&queue);
            async move { queue.enqueue(2).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.close();

        let result = timeout(Duration::from_secs(1), producer).await.unwrap().unwrap();
        assert_eq!(result, Err(SpindleError::QueueClosed));
        assert_eq!(queue.dequeue().await, Ok(1));
    }

    #[tokio::test]
    async fn drain_pending_frees_slots() {
        let queue = WorkQueue::new(2).unwrap();
        queue.enqueue('x').await.unwrap();
        queue.enqueue('y').await.unwrap();

        assert_eq!(queue.drain_pending(), vec!['x', 'y']);
        assert!(queue.is_empty());
        queue.try_enqueue('z').unwrap();
    }
}
