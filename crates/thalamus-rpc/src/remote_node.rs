//! `RemoteNode`: one bidi stream wrapping an analog subscribe (reusing
//! `analog.rs`'s selection/response-building machinery) alongside an
//! application-level ping/pong liveness check multiplexed onto the same
//! stream via `RemoteNodeRequest.ping_nonce`/`RemoteNodeResponse.pong_nonce`.

use tonic::{Request, Response, Status, Streaming};

use thalamus_core::Modality;
use thalamus_proto::remote_node_response::Payload;
use thalamus_proto::{AnalogRequest, RemoteNodeRequest, RemoteNodeResponse};

use crate::analog::{build_response, resolve_selection};
use crate::resolve::{spawn_forwarder, subscribe_when_ready};
use crate::service::ThalamusService;

pub async fn handle_remote_node(
    service: &ThalamusService,
    request: Request<Streaming<RemoteNodeRequest>>,
) -> Result<Response<super::ResponseStream<RemoteNodeResponse>>, Status> {
    service.stats.inc_pending();
    let mut stream = request.into_inner();

    let Some(first) = stream.message().await? else {
        service.stats.dec_pending();
        return Err(Status::invalid_argument("RemoteNode stream closed before the subscribe message"));
    };
    let node_name = first.node.clone();
    if node_name.is_empty() {
        service.stats.dec_pending();
        return Err(Status::invalid_argument("first RemoteNode message must name a node"));
    }

    let req = AnalogRequest { node: node_name.clone(), channel_names: Vec::new(), channel_indices: Vec::new() };
    let result = subscribe_when_ready(&service.reactor, &node_name, Modality::ANALOG, "remote_node", &service.shutdown, move |node| {
        let analog = node.as_analog()?;
        let selected = resolve_selection(analog, &req)?;
        Some(RemoteNodeResponse { payload: Some(Payload::Analog(build_response(node.name(), analog, &selected))) })
    })
    .await;

    service.stats.dec_pending();
    service.stats.inc_completed();
    let Some((subscription, rx)) = result else {
        return Err(Status::cancelled("server shutting down while resolving node"));
    };

    let analog_stream = spawn_forwarder(subscription, rx, service.shutdown_token());
    let (out_tx, out_rx) = tokio::sync::mpsc::channel(8);
    let shutdown = service.shutdown_token();

    tokio::spawn(async move {
        use tokio_stream::StreamExt;
        let mut analog_stream = analog_stream;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                frame = analog_stream.next() => {
                    match frame {
                        Some(frame) => {
                            if out_tx.send(frame).await.is_err() {
                                break;
                            }
                        }
                        None => break,
                    }
                }
                incoming = stream.message() => {
                    match incoming {
                        Ok(Some(message)) if message.ping_nonce != 0 => {
                            let pong = Ok(RemoteNodeResponse { payload: Some(Payload::PongNonce(message.ping_nonce)) });
                            if out_tx.send(pong).await.is_err() {
                                break;
                            }
                        }
                        Ok(Some(_)) => {}
                        Ok(None) => break,
                        Err(_) => break,
                    }
                }
            }
        }
    });

    Ok(Response::new(Box::pin(tokio_stream::wrappers::ReceiverStream::new(out_rx))))
}
