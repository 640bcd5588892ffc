//! Single-worker priority queue reached by message passing only, no locks.
//! Used for the GenICam framerate observer's trailing-window of frame
//! timestamps (oldest evicted first) and anywhere else that wants a heap
//! shared across tasks without a mutex around it.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::{mpsc, Notify};

pub trait Prioritized: Send + Sync + 'static {
    fn priority(&self) -> f32;
}

pub struct ConcurrentPriorityQueue<T: Prioritized + Ord> {
    enqueue_tx: mpsc::UnboundedSender<T>,
    dequeue_rx: mpsc::UnboundedReceiver<T>,
    signal: Arc<Notify>,
}

impl<T: Prioritized + Ord> ConcurrentPriorityQueue<T> {
    pub fn new() -> Self {
        let (enqueue_tx, mut enqueue_rx) = mpsc::unbounded_channel::<T>();
        let (dequeue_tx, dequeue_rx) = mpsc::unbounded_channel::<T>();
        let signal = Arc::new(Notify::new());
        let signal_clone = signal.clone();

        tokio::spawn(async move {
            let mut heap: BinaryHeap<T> = BinaryHeap::new();

            loop {
                tokio::select! {
                    Some(item) = enqueue_rx.recv() => {
                        heap.push(item);
                        signal_clone.notify_one();
                    }
                    _ = signal_clone.notified(), if !heap.is_empty() => {
                        if let Some(item) = heap.pop() {
                            let _ = dequeue_tx.send(item);
                        }
                    }
                }
            }
        });

        Self { enqueue_tx, dequeue_rx, signal }
    }

    pub fn enqueue(&self, item: T) {
        let _ = self.enqueue_tx.send(item);
    }

    pub async fn dequeue(&mut self) -> Option<T> {
        self.signal.notify_one();
        self.dequeue_rx.recv().await
    }

    pub async fn wait_for_work(&self) {
        self.signal.notified().await;
    }
}

impl<T: Prioritized + Ord> Default for ConcurrentPriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Wraps a timestamp (nanoseconds since reactor start) so the most recent
/// arrival sorts highest; used to evict everything older than the trailing
/// 1s framerate window with a handful of `peek`/`pop` calls instead of a
/// linear scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timestamped(pub u64);

impl Prioritized for Timestamped {
    fn priority(&self) -> f32 {
        self.0 as f32
    }
}

impl PartialOrd for Timestamped {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timestamped {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct TestMessage {
        priority: f32,
    }

    impl Prioritized for TestMessage {
        fn priority(&self) -> f32 {
            self.priority
        }
    }
    impl PartialEq for TestMessage {
        fn eq(&self, other: &Self) -> bool {
            self.priority == other.priority
        }
    }
    impl Eq for TestMessage {}
    impl PartialOrd for TestMessage {
        fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
            Some(self.cmp(other))
        }
    }
    impl Ord for TestMessage {
        fn cmp(&self, other: &Self) -> Ordering {
            self.priority.partial_cmp(&other.priority).unwrap_or(Ordering::Equal)
        }
    }

    #[tokio::test]
    async fn dequeues_highest_priority_first() {
        let mut queue = ConcurrentPriorityQueue::new();
        queue.enqueue(TestMessage { priority: 0.3 });
        queue.enqueue(TestMessage { priority: 0.9 });
        queue.enqueue(TestMessage { priority: 0.5 });

        tokio::time::sleep(tokio::time::Duration::from_millis(50)).await;

        assert_eq!(queue.dequeue().await.unwrap().priority, 0.9);
        assert_eq!(queue.dequeue().await.unwrap().priority, 0.5);
        assert_eq!(queue.dequeue().await.unwrap().priority, 0.3);
    }
}
