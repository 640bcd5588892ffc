//! `MotionCapture`: subscribes to a motion-capture node's segment poses,
//! flattening `[x,y,z]`/`[w,x,y,z]` per segment in `segment_names` order —
//! the same flattening `thalamus-hydrate`'s `MotionNodeBuffer` uses for its
//! `xsens/<node>` capture groups.

use tonic::{Request, Response, Status};

use thalamus_core::Modality;
use thalamus_proto::{MotionCaptureResponse, NodeRequest, Segment};

use crate::clock::now_ns;
use crate::resolve::{spawn_forwarder, subscribe_when_ready};
use crate::service::ThalamusService;

pub async fn handle_motion_capture(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<super::ResponseStream<MotionCaptureResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();

    let result = subscribe_when_ready(&service.reactor, &req.node, Modality::MOTION, "motion_capture", &service.shutdown, move |node| {
        let motion = node.as_motion()?;
        let segment_ids = motion.segment_ids();
        let positions = motion.positions();
        let rotations = motion.rotations();
        let frame_number = motion.frame_number();
        let time_within_frame = motion.time_within_frame().as_secs_f64();
        let pose_name = motion.pose_name().to_string();
        let actor = motion.actor() as u32;
        let segments = (0..motion.segment_names().len())
            .map(|i| Segment {
                frame_number,
                segment_id: segment_ids.get(i).copied().unwrap_or(i as u32),
                time_within_frame,
                position_x: positions[i][0],
                position_y: positions[i][1],
                position_z: positions[i][2],
                rotation_w: rotations[i][0],
                rotation_x: rotations[i][1],
                rotation_y: rotations[i][2],
                rotation_z: rotations[i][3],
                pose_name: pose_name.clone(),
                actor,
            })
            .collect();
        Some(MotionCaptureResponse {
            node: node.name().to_string(),
            segment_names: motion.segment_names().to_vec(),
            segments,
            time_ns: now_ns(),
        })
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
