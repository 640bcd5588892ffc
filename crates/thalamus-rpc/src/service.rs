//! The `ThalamusService` struct: the shared state every RPC handler
//! closes over — a plain struct of shared handles plus a `ServerStats`
//! counter pair, constructed once in `thalamus-server` and cloned
//! (cheaply, via `Arc`-backed fields) into the tonic service.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thalamus_core::concurrent::WorkerPool;
use thalamus_core::ReactorHandle;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use thalamus_proto::{EvalRequest, EvalResponse, NotificationMessage};

/// Server-initiated eval channel state: the currently-attached `Eval`
/// stream's outbound sender (one peer at a time — a later attach replaces
/// it) plus the table of promises awaiting a matching `EvalResponse.id`.
#[derive(Default)]
pub(crate) struct EvalChannel {
    pub(crate) out: Mutex<Option<mpsc::Sender<EvalRequest>>>,
    pub(crate) pending: Mutex<HashMap<u64, oneshot::Sender<EvalResponse>>>,
    pub(crate) next_id: AtomicU64,
}

/// Request-in-flight bookkeeping, surfaced for operational visibility.
/// Every RPC handler bumps `requests_pending` on entry and
/// `requests_completed` on exit.
#[derive(Default)]
pub struct ServerStats {
    pub requests_pending: AtomicU64,
    pub requests_completed: AtomicU64,
}

impl ServerStats {
    pub fn inc_pending(&self) {
        self.requests_pending.fetch_add(1, Ordering::Relaxed);
    }
    pub fn dec_pending(&self) {
        self.requests_pending.fetch_sub(1, Ordering::Relaxed);
    }
    pub fn inc_completed(&self) {
        self.requests_completed.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct ThalamusService {
    pub(crate) reactor: ReactorHandle,
    pub(crate) worker_pool: Arc<WorkerPool>,
    pub(crate) shutdown: CancellationToken,
    pub(crate) notifications: broadcast::Sender<NotificationMessage>,
    pub(crate) mirror_attached: Arc<AtomicBool>,
    pub(crate) notification_attached: Arc<AtomicBool>,
    pub(crate) stats: Arc<ServerStats>,
    pub(crate) eval_channel: Arc<EvalChannel>,
}

impl ThalamusService {
    pub fn new(reactor: ReactorHandle, worker_pool: Arc<WorkerPool>) -> Self {
        let (notifications, _rx) = broadcast::channel(64);
        Self {
            reactor,
            worker_pool,
            shutdown: CancellationToken::new(),
            notifications,
            mirror_attached: Arc::new(AtomicBool::new(false)),
            notification_attached: Arc::new(AtomicBool::new(false)),
            stats: Arc::new(ServerStats::default()),
            eval_channel: Arc::new(EvalChannel::default()),
        }
    }

    /// Ask whichever peer is currently attached to `Eval` to evaluate
    /// `code`, returning its correlated response. Fails if no peer is
    /// attached or the attached peer never answers (the send side closing
    /// resolves the pending oneshot with an error).
    pub async fn eval_on_remote(&self, code: impl Into<String>) -> Result<EvalResponse, tonic::Status> {
        let id = self.eval_channel.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.eval_channel.pending.lock().unwrap_or_else(|e| e.into_inner()).insert(id, tx);

        let sender = self.eval_channel.out.lock().unwrap_or_else(|e| e.into_inner()).clone();
        let Some(sender) = sender else {
            self.eval_channel.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            return Err(tonic::Status::unavailable("no peer attached to Eval"));
        };
        if sender.send(EvalRequest { id, code: code.into() }).await.is_err() {
            self.eval_channel.pending.lock().unwrap_or_else(|e| e.into_inner()).remove(&id);
            return Err(tonic::Status::unavailable("Eval peer disconnected"));
        }

        rx.await.map_err(|_| tonic::Status::cancelled("Eval peer disconnected before answering"))
    }

    /// Whether both the mirror and notification streams are attached —
    /// spec.md's definition of "the service is ready."
    pub fn is_ready(&self) -> bool {
        self.mirror_attached.load(Ordering::Acquire) && self.notification_attached.load(Ordering::Acquire)
    }

    /// The reactor's global soft-stop flag. `Stop` sets it; every
    /// subscription loop observes it via `self.shutdown.cancelled()`
    /// alongside the client's own cancellation.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn notify(&self, title: impl Into<String>, text: impl Into<String>, level: u32) {
        let _ = self.notifications.send(NotificationMessage { title: title.into(), text: text.into(), level });
    }
}
