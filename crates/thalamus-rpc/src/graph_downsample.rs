//! `Graph`: the min/max downsampler. Grounded directly on spec.md §4.4's
//! literal state machine — "per channel, maintain `(current_time, bin_end,
//! min, max)`. For each incoming sample, advance time by the channel's
//! sample interval; when `current_time >= bin_end`, emit the `(min,max)`
//! pair into a bin vector and start a new bin" — and its §8 scenario 6,
//! which pins the exact emission boundary this module is tested against.

use std::collections::HashMap;
use std::sync::Mutex;

use tonic::{Request, Response, Status};

use thalamus_core::modality::AnalogNode as AnalogNodeTrait;
use thalamus_core::Modality;
use thalamus_proto::{GraphRequest, GraphResponse};

use crate::resolve::{spawn_forwarder, subscribe_many_when_ready};
use crate::service::ThalamusService;

struct BinState {
    current_time_ns: u64,
    bin_start_ns: u64,
    bin_end_ns: u64,
    min: f32,
    max: f32,
    started: bool,
}

impl BinState {
    fn new(bin_ns: u64) -> Self {
        Self { current_time_ns: 0, bin_start_ns: 0, bin_end_ns: bin_ns, min: 0.0, max: 0.0, started: false }
    }
}

/// Advance one channel's bin state machine across every sample in this
/// frame, returning one `GraphResponse` per bin boundary crossed. A frame
/// may close zero, one, or several bins depending on how many samples it
/// carries relative to `bin_ns`.
fn feed_channel(states: &mut HashMap<String, BinState>, node: &str, name: &str, bin_ns: u64, interval_ns: u64, samples: &[f32]) -> Vec<GraphResponse> {
    let entry = states.entry(name.to_string()).or_insert_with(|| BinState::new(bin_ns));
    let mut emitted = Vec::new();
    for &sample in samples {
        if !entry.started {
            entry.min = sample;
            entry.max = sample;
            entry.started = true;
        } else {
            entry.min = entry.min.min(sample);
            entry.max = entry.max.max(sample);
        }
        entry.current_time_ns = entry.current_time_ns.saturating_add(interval_ns);
        if entry.current_time_ns >= entry.bin_end_ns {
            emitted.push(GraphResponse {
                node: node.to_string(),
                bin_start_ns: entry.bin_start_ns,
                bin_end_ns: entry.bin_end_ns,
                min: vec![entry.min],
                max: vec![entry.max],
            });
            entry.bin_start_ns = entry.bin_end_ns;
            entry.bin_end_ns = entry.bin_start_ns + bin_ns;
            entry.started = false;
        }
    }
    emitted
}

fn selected_spans<'a>(analog: &'a dyn AnalogNodeTrait, names: &[String], indices: &[u32]) -> Vec<(usize, &'a str)> {
    let spans = analog.spans();
    if !names.is_empty() {
        names
            .iter()
            .filter_map(|n| spans.iter().position(|s| &s.name == n).map(|i| (i, spans[i].name.as_str())))
            .collect()
    } else if !indices.is_empty() {
        indices.iter().filter_map(|&i| spans.get(i as usize).map(|s| (i as usize, s.name.as_str()))).collect()
    } else {
        spans.iter().enumerate().map(|(i, s)| (i, s.name.as_str())).collect()
    }
}

pub async fn handle_graph(service: &ThalamusService, request: Request<GraphRequest>) -> Result<Response<super::ResponseStream<GraphResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();
    let node_name = req.node.clone();
    let bin_ns = if req.bin_ns <= 0.0 { 1 } else { req.bin_ns as u64 };
    let channel_names = req.channel_names.clone();
    let channel_indices = req.channel_indices.clone();
    let states: Mutex<HashMap<String, BinState>> = Mutex::new(HashMap::new());

    let result = subscribe_many_when_ready(&service.reactor, &node_name, Modality::ANALOG, "graph", &service.shutdown, move |node| {
        let Some(analog) = node.as_analog() else { return Vec::new() };
        let data = analog.data();
        let mut states = states.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for (idx, name) in selected_spans(analog, &channel_names, &channel_indices) {
            let Some(span) = analog.spans().get(idx) else { continue };
            let samples = &data[span.begin..span.end];
            let interval_ns = analog.sample_interval(idx).as_nanos() as u64;
            out.extend(feed_channel(&mut states, node.name(), name, bin_ns, interval_ns, samples));
        }
        out
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closes_first_bin_at_fourth_sample_and_starts_second_with_fifth() {
        let mut states = HashMap::new();
        let emitted = feed_channel(&mut states, "probe", "ch0", 1_000_000, 250_000, &[0.0, 10.0, -5.0, 3.0, 7.0]);
        assert_eq!(emitted.len(), 1);
        assert_eq!(emitted[0].min, vec![-5.0]);
        assert_eq!(emitted[0].max, vec![10.0]);
        let entry = states.get("ch0").unwrap();
        assert!(entry.started);
        assert_eq!(entry.min, 7.0);
        assert_eq!(entry.max, 7.0);
    }
}
