//! CPU-bound parallel work: FFT framing, per-channel deinterleave, and other
//! jobs that want to block a thread doing real computation rather than
//! yield cooperatively. Backed by a dedicated `rayon::ThreadPool` so this
//! work never competes with tokio's own worker threads.

use std::sync::Arc;

use rayon::{ThreadPool, ThreadPoolBuilder};

#[derive(Clone)]
pub struct WorkerPool {
    pool: Arc<ThreadPool>,
}

impl WorkerPool {
    /// `threads = 0` asks rayon to size the pool to the number of logical
    /// CPUs, matching `num_cpus::get()`.
    pub fn new(threads: usize) -> Self {
        let threads = if threads == 0 { num_cpus::get() } else { threads };
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("thalamus-worker-{i}"))
            .build()
            .expect("failed to build worker thread pool");
        Self { pool: Arc::new(pool) }
    }

    /// Run `f` on the pool and block the calling (async) task until it
    /// completes. Callers on a tokio runtime should wrap this in
    /// `spawn_blocking` rather than call it directly from an async fn, the
    /// same way `thalamus-rpc`'s handlers offload spectrogram/FFT work.
    pub fn install<R: Send>(&self, f: impl FnOnce() -> R + Send) -> R {
        self.pool.install(f)
    }

    /// Split `items` across the pool and map each with `f`, preserving
    /// order. Used for per-channel deinterleave where each channel's
    /// transform is independent.
    pub fn map<T: Send, R: Send>(&self, items: Vec<T>, f: impl Fn(T) -> R + Sync) -> Vec<R> {
        self.pool.install(|| {
            use rayon::prelude::*;
            items.into_par_iter().map(f).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_order() {
        let pool = WorkerPool::new(2);
        let result = pool.map(vec![1, 2, 3, 4], |x| x * x);
        assert_eq!(result, vec![1, 4, 9, 16]);
    }
}
