//! `Replay`: drains a hydrated capture (`thalamus_hydrate::CaptureReader`)
//! and injects each recorded slab back into its owning node via the same
//! `apply_and_notify` path `InjectAnalog`/mocap ingest use, either
//! wall-clock-paced against each slab's recorded `time_ns` gap or
//! as-fast-as-possible — `ReplayRequest.fast` picks between the original's
//! two playback modes (see `DESIGN.md`). `ReplayRequest.nodes` restricts
//! injection to the named nodes; empty means every node the capture holds.

use tonic::{Request, Response, Status};

use thalamus_hydrate::CaptureReader;
use thalamus_proto::{Empty, ReplayRequest};

use crate::service::ThalamusService;

/// One slab pulled out of a `CaptureReader`, in whatever order its index
/// entries appeared, tagged with the owning node's name and whether it's
/// analog or motion so injection can build the right `publish_*` payload.
enum Slab {
    Analog { node: String, time_ns: u64, samples: Vec<f64>, channel_names: Vec<String> },
    Motion { node: String, time_ns: u64, positions: Vec<f32>, rotations: Vec<f32>, segment_names: Vec<String> },
}

fn slab_node(slab: &Slab) -> &str {
    match slab {
        Slab::Analog { node, .. } | Slab::Motion { node, .. } => node,
    }
}

fn slab_time(slab: &Slab) -> u64 {
    match slab {
        Slab::Analog { time_ns, .. } | Slab::Motion { time_ns, .. } => *time_ns,
    }
}

fn flatten_slabs(reader: &CaptureReader) -> Vec<Slab> {
    let mut slabs = Vec::new();
    for (name, buffer) in &reader.nodes {
        let mut start = 0usize;
        for entry in &buffer.index {
            let end = entry.cumulative_sample_count as usize;
            slabs.push(Slab::Analog {
                node: name.clone(),
                time_ns: entry.time_ns,
                samples: buffer.samples[start.min(buffer.samples.len())..end.min(buffer.samples.len())].to_vec(),
                channel_names: buffer.channel_names.clone(),
            });
            start = end;
        }
    }
    for (name, buffer) in &reader.motion_nodes {
        let stride = buffer.segment_names.len() * 3;
        let rot_stride = buffer.segment_names.len() * 4;
        let mut start_pos = 0usize;
        let mut start_rot = 0usize;
        for entry in &buffer.index {
            let frames = entry.cumulative_sample_count as usize;
            let end_pos = (frames * stride).min(buffer.positions.len());
            let end_rot = (frames * rot_stride).min(buffer.rotations.len());
            slabs.push(Slab::Motion {
                node: name.clone(),
                time_ns: entry.time_ns,
                positions: buffer.positions[start_pos.min(end_pos)..end_pos].to_vec(),
                rotations: buffer.rotations[start_rot.min(end_rot)..end_rot].to_vec(),
                segment_names: buffer.segment_names.clone(),
            });
            start_pos = end_pos;
            start_rot = end_rot;
        }
    }
    slabs.sort_by_key(slab_time);
    slabs
}

/// Build the `{"publish_analog": ...}` / `{"publish_motion": ...}` payload
/// `NodeGraph::apply_and_notify` expects, the same shape `InjectAnalog` and
/// `MocapIngest` build.
fn inject_payload(slab: &Slab) -> serde_json::Value {
    match slab {
        Slab::Analog { samples, channel_names, .. } => {
            let spans: Vec<serde_json::Value> = if channel_names.is_empty() {
                Vec::new()
            } else {
                let per = samples.len() / channel_names.len().max(1);
                channel_names
                    .iter()
                    .enumerate()
                    .map(|(i, name)| serde_json::json!({ "name": name, "begin": i * per, "end": (i + 1) * per }))
                    .collect()
            };
            serde_json::json!({
                "publish_analog": {
                    "spans": spans,
                    "sample_interval_ns": vec![0u64; channel_names.len()],
                    "data": samples,
                }
            })
        }
        Slab::Motion { positions, rotations, segment_names, .. } => {
            let positions: Vec<[f32; 3]> = segment_names.iter().enumerate().map(|(i, _)| positions.get(i * 3..i * 3 + 3).map(|s| [s[0], s[1], s[2]]).unwrap_or_default()).collect();
            let rotations: Vec<[f32; 4]> = segment_names
                .iter()
                .enumerate()
                .map(|(i, _)| rotations.get(i * 4..i * 4 + 4).map(|s| [s[0], s[1], s[2], s[3]]).unwrap_or_default())
                .collect();
            serde_json::json!({
                "publish_motion": {
                    "segment_names": segment_names,
                    "positions": positions,
                    "rotations": rotations,
                }
            })
        }
    }
}

pub async fn handle_replay(service: &ThalamusService, request: Request<ReplayRequest>) -> Result<Response<Empty>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();

    let reader = tokio::task::spawn_blocking(move || CaptureReader::open(&req.path).map(|r| (r, req.fast, req.nodes)))
        .await
        .map_err(|_| Status::internal("replay read task panicked"))?
        .map_err(|e| Status::not_found(e.to_string()))?;
    let (reader, fast, nodes) = reader;

    let slabs: Vec<Slab> = flatten_slabs(&reader).into_iter().filter(|s| nodes.is_empty() || nodes.iter().any(|n| n == slab_node(s))).collect();

    let mut previous_time_ns: Option<u64> = None;
    for slab in &slabs {
        if !fast {
            if let Some(prev) = previous_time_ns {
                let gap = slab_time(slab).saturating_sub(prev);
                if gap > 0 {
                    tokio::time::sleep(std::time::Duration::from_nanos(gap)).await;
                }
            }
        }
        previous_time_ns = Some(slab_time(slab));

        let node_name = slab_node(slab).to_string();
        let payload = inject_payload(slab);
        service
            .reactor
            .call(move |graph| graph.apply_and_notify(&node_name, payload))
            .await
            .map_err(|e| crate::error::to_status(&e))?;
    }

    service.stats.dec_pending();
    service.stats.inc_completed();
    Ok(Response::new(Empty {}))
}
