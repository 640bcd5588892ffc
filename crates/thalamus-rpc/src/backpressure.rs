//! The in-process backpressure rule every streaming RPC shares: "a
//! `try_lock` on a per-subscription mutex in the slot drops frames when the
//! previous frame's writer has not yet returned" (spec.md §4.4/§5). A
//! bounded, capacity-1 `mpsc` channel with `try_send` is the `tokio`
//! equivalent of that try-lock — at most one frame is ever queued behind
//! the writer task, and a frame that arrives while the writer is still
//! serializing the last one is dropped rather than queued.

use tokio::sync::mpsc;

/// Wraps a capacity-1 `mpsc::Sender`. `send` never blocks the reactor
/// thread or the `ready` slot that calls it: a full channel just drops the
/// new frame, exactly like the original's try_lock-miss path.
pub struct DropSender<T> {
    tx: mpsc::Sender<T>,
    label: &'static str,
}

impl<T> DropSender<T> {
    pub fn new(label: &'static str) -> (Self, mpsc::Receiver<T>) {
        let (tx, rx) = mpsc::channel(1);
        (Self { tx, label }, rx)
    }

    /// Returns `true` if the frame was queued, `false` if it was dropped
    /// because the writer hadn't drained the previous one yet.
    pub fn send(&self, value: T) -> bool {
        match self.tx.try_send(value) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!(stream = self.label, "dropping frame, subscriber writer still busy");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }
}

impl<T> Clone for DropSender<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone(), label: self.label }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drops_second_frame_when_first_unread() {
        let (sender, mut rx) = DropSender::new("test");
        assert!(sender.send(1));
        assert!(!sender.send(2));
        assert_eq!(rx.recv().await, Some(1));
    }
}
