//! `ChannelInfo`: emits the node's current span table only when its
//! topology changes, rather than on every frame — the one handler that
//! attaches to `channels_changed` instead of `ready`.

use tonic::{Request, Response, Status};

use thalamus_core::modality::AnalogNode as AnalogNodeTrait;
use thalamus_core::Modality;
use thalamus_proto::{ChannelInfoResponse, NodeRequest, Span};

use crate::resolve::{spawn_forwarder, subscribe_channels_changed};
use crate::service::ThalamusService;

pub async fn handle_channel_info(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<super::ResponseStream<ChannelInfoResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();

    let result = subscribe_channels_changed(&service.reactor, &req.node, Modality::ANALOG, "channel_info", &service.shutdown, move |node| {
        let analog = node.as_analog()?;
        let spans = analog
            .spans()
            .iter()
            .enumerate()
            .map(|(i, s)| Span {
                name: s.name.clone(),
                begin: s.begin as u32,
                end: s.end as u32,
                sample_interval_ns: analog.sample_interval(i).as_nanos() as u64,
            })
            .collect();
        Some(ChannelInfoResponse { spans })
    })
    .await;

    service.stats.dec_pending();
    service.stats.inc_completed();
    match result {
        Some((subscription, rx)) => {
            let stream = spawn_forwarder(subscription, rx, service.shutdown_token());
            Ok(Response::new(Box::pin(stream)))
        }
        None => Err(Status::cancelled("server shutting down while resolving node")),
    }
}
