//! Shared subscription-attachment machinery every per-modality stream
//! handler uses: resolve a node by name (retrying once a second per
//! spec.md §4.4's resolution loop), attach a `ready` slot once it exists
//! and carries the required modality, and tear the slot down when the
//! subscription's `Subscription` handle drops.
//!
//! A node's `Rc<RefCell<dyn Node>>` can never cross off the reactor thread
//! (see `thalamus-core::reactor`), so everything that touches one —
//! including reading the frame back out from inside the `ready` slot —
//! runs as a closure posted onto the reactor. Only the extracted, `Send`
//! result value crosses back over a [`crate::backpressure::DropSender`].

use std::sync::Arc;
use std::time::Duration;

use thalamus_core::{Modality, Node, ReactorHandle};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tonic::Status;

use crate::backpressure::DropSender;

/// RAII handle for an attached `ready` subscription. Dropping it posts a
/// job that disconnects the underlying `Connection`, mirroring every other
/// scoped-connection handle in this codebase.
pub struct Subscription {
    id: u64,
    reactor: ReactorHandle,
}

impl Subscription {
    /// Wrap an already-registered subscription id. Used by handlers that
    /// attach directly to a graph-wide signal (e.g. `Events`) rather than
    /// going through [`subscribe_when_ready`]/[`subscribe_channels_changed`].
    pub fn new(id: u64, reactor: ReactorHandle) -> Self {
        Self { id, reactor }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let id = self.id;
        self.reactor.post(move |graph| graph.unregister_subscription(id));
    }
}

type Extractor<T> = Arc<dyn Fn(&dyn Node) -> Option<T> + Send + Sync>;

/// Resolve `node_name`, wait for it to carry `required`, and attach
/// `extract` to its `ready` signal, retrying every second until it
/// resolves or `cancel` fires. Every fired frame for which `extract`
/// returns `Some` is pushed through a capacity-1 drop-on-full channel.
pub async fn subscribe_when_ready<T: Send + 'static>(
    reactor: &ReactorHandle,
    node_name: &str,
    required: Modality,
    label: &'static str,
    cancel: &CancellationToken,
    extract: impl Fn(&dyn Node) -> Option<T> + Send + Sync + 'static,
) -> Option<(Subscription, mpsc::Receiver<T>)> {
    let extract: Extractor<T> = Arc::new(extract);
    loop {
        if let Some(result) = try_attach(reactor, node_name, required, label, extract.clone()).await {
            return Some(result);
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

async fn try_attach<T: Send + 'static>(
    reactor: &ReactorHandle,
    node_name: &str,
    required: Modality,
    label: &'static str,
    extract: Extractor<T>,
) -> Option<(Subscription, mpsc::Receiver<T>)> {
    let (sender, rx) = DropSender::new(label);
    let name = node_name.to_string();
    let id = reactor
        .call(move |graph| {
            let handle = graph.get(&name)?;
            if !handle.borrow().modalities().contains(required) {
                return None;
            }
            let slot_handle = handle.clone();
            let connection = handle.borrow().ready().connect(move |_| {
                let node = slot_handle.borrow();
                if let Some(value) = extract(&*node) {
                    sender.send(value);
                }
            });
            Some(graph.register_subscription(connection))
        })
        .await
        .ok()
        .flatten()?;
    Some((Subscription { id, reactor: reactor.clone() }, rx))
}

/// Forward a subscription's frames onto a tonic-compatible response
/// stream until the subscriber drops it or `shutdown` fires, then release
/// the subscription. Every streaming RPC handler that forwards its
/// extracted frames 1:1 to the wire goes through this rather than
/// re-deriving the forwarding loop.
pub fn spawn_forwarder<T: Send + 'static>(
    subscription: Subscription,
    mut rx: mpsc::Receiver<T>,
    shutdown: CancellationToken,
) -> ReceiverStream<Result<T, Status>> {
    let (out_tx, out_rx) = mpsc::channel(8);
    tokio::spawn(async move {
        let _subscription = subscription;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = rx.recv() => {
                    match frame {
                        Some(value) => {
                            if out_tx.send(Ok(value)).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
    });
    ReceiverStream::new(out_rx)
}

type ManyExtractor<T> = Arc<dyn Fn(&dyn Node) -> Vec<T> + Send + Sync>;

/// As [`subscribe_when_ready`], but `extract` may produce zero, one, or
/// several messages per `ready` tick — the `Graph` downsampler can close
/// out several bins in one frame, and `Spectrogram` can emit several
/// windows once its hop counter rolls over enough samples. Every produced
/// value still goes through the capacity-1 drop-on-full channel
/// independently, so a burst beyond the first value is dropped exactly
/// like a single slow frame would be.
pub async fn subscribe_many_when_ready<T: Send + 'static>(
    reactor: &ReactorHandle,
    node_name: &str,
    required: Modality,
    label: &'static str,
    cancel: &CancellationToken,
    extract: impl Fn(&dyn Node) -> Vec<T> + Send + Sync + 'static,
) -> Option<(Subscription, mpsc::Receiver<T>)> {
    let extract: ManyExtractor<T> = Arc::new(extract);
    loop {
        let (sender, rx) = DropSender::new(label);
        let name = node_name.to_string();
        let extract2 = extract.clone();
        let attached = reactor
            .call(move |graph| {
                let handle = graph.get(&name)?;
                if !handle.borrow().modalities().contains(required) {
                    return None;
                }
                let slot_handle = handle.clone();
                let connection = handle.borrow().ready().connect(move |_| {
                    let node = slot_handle.borrow();
                    for value in extract2(&*node) {
                        sender.send(value);
                    }
                });
                Some(graph.register_subscription(connection))
            })
            .await
            .ok()
            .flatten();
        if let Some(id) = attached {
            return Some((Subscription { id, reactor: reactor.clone() }, rx));
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}

/// As [`subscribe_when_ready`] but attaches to `channels_changed` instead
/// of `ready` — used by `ChannelInfo`, which only emits on topology change.
pub async fn subscribe_channels_changed<T: Send + 'static>(
    reactor: &ReactorHandle,
    node_name: &str,
    required: Modality,
    label: &'static str,
    cancel: &CancellationToken,
    extract: impl Fn(&dyn Node) -> Option<T> + Send + Sync + 'static,
) -> Option<(Subscription, mpsc::Receiver<T>)> {
    let extract: Extractor<T> = Arc::new(extract);
    loop {
        let (sender, rx) = DropSender::new(label);
        let name = node_name.to_string();
        let extract2 = extract.clone();
        let attached = reactor
            .call(move |graph| {
                let handle = graph.get(&name)?;
                if !handle.borrow().modalities().contains(required) {
                    return None;
                }
                let slot_handle = handle.clone();
                let connection = handle.borrow().channels_changed().connect(move |_| {
                    let node = slot_handle.borrow();
                    if let Some(value) = extract2(&*node) {
                        sender.send(value);
                    }
                });
                Some(graph.register_subscription(connection))
            })
            .await
            .ok()
            .flatten();
        if let Some(id) = attached {
            return Some((Subscription { id, reactor: reactor.clone() }, rx));
        }
        tokio::select! {
            _ = cancel.cancelled() => return None,
            _ = tokio::time::sleep(Duration::from_secs(1)) => {}
        }
    }
}
