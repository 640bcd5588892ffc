//! Generic work-stealing worker pool for async message processing: N
//! worker tasks pull from one shared channel. Used by the neural-adapter
//! client to fan ticket-queue responses out across workers and by the
//! capture hydration pipeline to decode wire records concurrently.

use std::sync::Arc;

use tokio::sync::mpsc;

#[async_trait::async_trait]
pub trait MessageProcessor: Send + Sync {
    type Message: Send + 'static;
    type Error: std::error::Error + Send + Sync + 'static;

    async fn process(&self, message: Self::Message) -> Result<(), Self::Error>;

    async fn on_start(&self) -> Result<(), Self::Error> {
        Ok(())
    }

    async fn on_stop(&self) -> Result<(), Self::Error> {
        Ok(())
    }
}

pub struct ConcurrentProcessor<P: MessageProcessor> {
    tx: mpsc::UnboundedSender<P::Message>,
    #[allow(dead_code)] // kept alive to hold the Arc refcount the workers share
    processor: Arc<P>,
}

impl<P: MessageProcessor + 'static> ConcurrentProcessor<P> {
    pub fn new(processor: P, worker_count: usize) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let processor = Arc::new(processor);

        for worker_id in 0..worker_count {
            let rx = rx.clone();
            let processor = processor.clone();

            tokio::spawn(async move {
                if let Err(e) = processor.on_start().await {
                    tracing::error!(worker_id, error = %e, "worker start failed");
                    return;
                }

                loop {
                    let message = {
                        let mut rx = rx.lock().await;
                        rx.recv().await
                    };

                    match message {
                        Some(msg) => {
                            if let Err(e) = processor.process(msg).await {
                                tracing::error!(worker_id, error = %e, "message processing failed");
                            }
                        }
                        None => break,
                    }
                }

                let _ = processor.on_stop().await;
            });
        }

        Self { tx, processor }
    }

    pub fn submit(&self, message: P::Message) {
        let _ = self.tx.send(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct TestProcessor {
        counter: Arc<AtomicUsize>,
    }

    #[derive(thiserror::Error, Debug)]
    enum TestError {
        #[error("test error")]
        #[allow(dead_code)]
        Test,
    }

    #[async_trait::async_trait]
    impl MessageProcessor for TestProcessor {
        type Message = u32;
        type Error = TestError;

        async fn process(&self, _message: Self::Message) -> Result<(), Self::Error> {
            self.counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn all_submitted_messages_get_processed() {
        let counter = Arc::new(AtomicUsize::new(0));
        let processor = TestProcessor { counter: counter.clone() };
        let concurrent = ConcurrentProcessor::new(processor, 4);

        for i in 0..100 {
            concurrent.submit(i);
        }

        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }
}
