//! `Analog` (subscribe) and `InjectAnalog` (the inverse: client pushes
//! samples into a node).

use tonic::{Request, Response, Status, Streaming};

use thalamus_core::modality::AnalogNode as AnalogNodeTrait;
use thalamus_core::Modality;
use thalamus_proto::{AnalogRequest, AnalogResponse, InjectAck, Span};

use crate::clock::now_ns;
use crate::resolve::{spawn_forwarder, subscribe_when_ready};
use crate::service::ThalamusService;

pub type AnalogStream = tonic::codec::Streaming<AnalogResponse>;

pub(crate) fn build_response(node_name: &str, analog: &dyn AnalogNodeTrait, selected: &[usize]) -> AnalogResponse {
    let all_spans = analog.spans();
    let data = analog.data();
    let (spans, flat): (Vec<Span>, Vec<f32>) = if selected.is_empty() {
        let spans = all_spans
            .iter()
            .enumerate()
            .map(|(i, s)| Span {
                name: s.name.clone(),
                begin: s.begin as u32,
                end: s.end as u32,
                sample_interval_ns: analog.sample_interval(i).as_nanos() as u64,
            })
            .collect();
        (spans, data.to_vec())
    } else {
        let mut spans = Vec::new();
        let mut flat = Vec::new();
        for &i in selected {
            let Some(s) = all_spans.get(i) else { continue };
            spans.push(Span {
                name: s.name.clone(),
                begin: flat.len() as u32,
                end: (flat.len() + (s.end - s.begin)) as u32,
                sample_interval_ns: analog.sample_interval(i).as_nanos() as u64,
            });
            flat.extend_from_slice(&data[s.begin..s.end]);
        }
        (spans, flat)
    };
    AnalogResponse { node: node_name.to_string(), spans, data: flat, time_ns: now_ns() }
}

/// Resolve which span indices the request selects. Channel names take
/// priority over indices; both empty means "all" (empty `selected`
/// sentinel). Names that never resolve defer emission (return `None`)
/// until every requested name is present in the node's span table — an
/// out-of-range index is silently skipped rather than failing the whole
/// frame, per the recorded Open Question decision.
pub(crate) fn resolve_selection(analog: &dyn AnalogNodeTrait, req: &AnalogRequest) -> Option<Vec<usize>> {
    if !req.channel_names.is_empty() {
        let spans = analog.spans();
        let mut indices = Vec::with_capacity(req.channel_names.len());
        for name in &req.channel_names {
            let idx = spans.iter().position(|s| &s.name == name)?;
            indices.push(idx);
        }
        Some(indices)
    } else if !req.channel_indices.is_empty() {
        Some(req.channel_indices.iter().map(|&i| i as usize).collect())
    } else {
        Some(Vec::new())
    }
}

pub async fn handle_analog(
    service: &ThalamusService,
    request: Request<AnalogRequest>,
) -> Result<Response<super::ResponseStream<AnalogResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();
    let node_name = req.node.clone();

    let result = subscribe_when_ready(
        &service.reactor,
        &node_name,
        Modality::ANALOG,
        "analog",
        &service.shutdown,
        move |node| {
            let analog = node.as_analog()?;
            let selected = resolve_selection(analog, &req)?;
            Some(build_response(node.name(), analog, &selected))
        },
    )
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

pub async fn handle_inject_analog(
    service: &ThalamusService,
    request: Request<Streaming<AnalogResponse>>,
) -> Result<Response<InjectAck>, Status> {
    service.stats.inc_pending();
    let mut stream = request.into_inner();
    let mut target: Option<String> = None;
    let mut samples_accepted: u64 = 0;

    while let Some(message) = stream.message().await? {
        if !message.node.is_empty() {
            target = Some(message.node.clone());
        }
        let Some(node_name) = target.clone() else {
            service.stats.dec_pending();
            return Err(Status::invalid_argument("first InjectAnalog message must name a node"));
        };

        let spans: Vec<serde_json::Value> = message
            .spans
            .iter()
            .map(|s| serde_json::json!({ "name": s.name, "begin": s.begin, "end": s.end }))
            .collect();
        let intervals: Vec<u64> = message.spans.iter().map(|s| s.sample_interval_ns).collect();
        let count = message.data.len() as u64;
        let payload = serde_json::json!({
            "publish_analog": {
                "spans": spans,
                "sample_interval_ns": intervals,
                "data": message.data,
            }
        });

        service
            .reactor
            .call(move |graph| graph.apply_and_notify(&node_name, payload))
            .await
            .map_err(|e| crate::error::to_status(&e))?;
        samples_accepted += count;
    }

    service.stats.dec_pending();
    service.stats.inc_completed();
    Ok(Response::new(InjectAck { samples_accepted }))
}
