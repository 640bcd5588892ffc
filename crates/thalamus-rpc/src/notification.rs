//! `Notification`/`Warn`: a plain broadcast channel of operator-facing
//! messages, independent of the reactor — `ThalamusService::notifications`
//! is a `tokio::sync::broadcast::Sender` fanning one send out to every
//! subscribed stream.

use tonic::{Request, Response, Status};

use thalamus_proto::{Empty, NotificationMessage, WarnRequest};

use crate::service::ThalamusService;

pub async fn handle_notification(service: &ThalamusService, _request: Request<Empty>) -> Result<Response<super::ResponseStream<NotificationMessage>>, Status> {
    service.notification_attached.store(true, std::sync::atomic::Ordering::Release);
    let mut rx = service.notifications.subscribe();
    let notification_attached = service.notification_attached.clone();
    let shutdown = service.shutdown_token();

    let (out_tx, out_rx) = tokio::sync::mpsc::channel(8);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                message = rx.recv() => {
                    match message {
                        Ok(message) => {
                            if out_tx.send(Ok(message)).await.is_err() {
                                break;
                            }
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    }
                }
            }
        }
        notification_attached.store(false, std::sync::atomic::Ordering::Release);
    });
    Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(out_rx))))
}

pub async fn handle_warn(service: &ThalamusService, request: Request<WarnRequest>) -> Result<Response<Empty>, Status> {
    let req = request.into_inner();
    service.notify("warning", req.text, 1);
    Ok(Response::new(Empty {}))
}
