pub mod message_processor;
pub mod priority_queue;
pub mod worker_pool;

pub use message_processor::{ConcurrentProcessor, MessageProcessor};
pub use priority_queue::{ConcurrentPriorityQueue, Prioritized};
pub use worker_pool::WorkerPool;
