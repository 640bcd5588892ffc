//! `Image`: subscribes to a node's image frames and splits each one into
//! wire chunks of at most 524288 bytes, exactly one of which carries
//! `last=true` — spec.md §8's chunker invariant and its two literal
//! scenarios (a single 307200-byte Gray8 frame fitting one chunk; a
//! 2764800-byte RGB8 frame splitting into exactly six).

use std::sync::atomic::{AtomicU64, Ordering};

use tonic::{Request, Response, Status};

use thalamus_core::modality::{ImageFormat as CoreImageFormat, ImageNode as ImageNodeTrait};
use thalamus_core::Modality;
use thalamus_proto::{ImageFormat as WireImageFormat, ImageResponse, NodeRequest};

use crate::clock::now_ns;
use crate::resolve::{spawn_forwarder, subscribe_many_when_ready};
use crate::service::ThalamusService;

const MAX_CHUNK_BYTES: usize = 524_288;

fn to_wire_format(format: CoreImageFormat) -> WireImageFormat {
    match format {
        CoreImageFormat::Gray8 => WireImageFormat::Gray8,
        CoreImageFormat::Gray16 => WireImageFormat::Gray16,
        CoreImageFormat::Rgb8 => WireImageFormat::Rgb8,
        CoreImageFormat::Rgb16 => WireImageFormat::Rgb16,
        CoreImageFormat::Yuyv422 => WireImageFormat::Yuyv422,
        CoreImageFormat::Yuv420p => WireImageFormat::Yuv420p,
        CoreImageFormat::Yuvj420p => WireImageFormat::Yuvj420p,
        CoreImageFormat::Mpeg1 => WireImageFormat::Mpeg1,
        CoreImageFormat::Mpeg4 => WireImageFormat::Mpeg4,
    }
}

/// Splits one source frame's bytes into `ImageResponse` chunks, stamping
/// one shared `frame_id` across every chunk and setting `last=true` on
/// exactly the final one (even a zero-byte frame still yields exactly one
/// chunk, so the invariant holds at the empty-frame edge too). Every chunk
/// carries the full frame metadata so a receiver can reassemble and decode
/// from the `last` chunk alone.
#[allow(clippy::too_many_arguments)]
fn chunk_frame(
    node: &str,
    width: u32,
    height: u32,
    format: WireImageFormat,
    plane_lengths: Vec<u32>,
    little_endian: bool,
    frame_interval_ns: u64,
    data: &[u8],
    frame_id: u64,
) -> Vec<ImageResponse> {
    if data.is_empty() {
        return vec![ImageResponse {
            node: node.to_string(),
            width,
            height,
            format: format as i32,
            plane_lengths,
            little_endian,
            frame_interval_ns,
            chunk: Vec::new(),
            last: true,
            frame_id,
        }];
    }
    let total_chunks = data.len().div_ceil(MAX_CHUNK_BYTES);
    data.chunks(MAX_CHUNK_BYTES)
        .enumerate()
        .map(|(i, slice)| ImageResponse {
            node: node.to_string(),
            width,
            height,
            format: format as i32,
            plane_lengths: plane_lengths.clone(),
            little_endian,
            frame_interval_ns,
            chunk: slice.to_vec(),
            last: i + 1 == total_chunks,
            frame_id,
        })
        .collect()
}

pub async fn handle_image(service: &ThalamusService, request: Request<NodeRequest>) -> Result<Response<super::ResponseStream<ImageResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();
    let next_frame_id = AtomicU64::new(0);

    let result = subscribe_many_when_ready(&service.reactor, &req.node, Modality::IMAGE, "image", &service.shutdown, move |node| {
        let Some(image) = node.as_image() else { return Vec::new() };
        let frame_id = next_frame_id.fetch_add(1, Ordering::Relaxed) + 1;
        chunk_frame(
            node.name(),
            image.width(),
            image.height(),
            to_wire_format(image.format()),
            image.plane_lengths(),
            image.little_endian(),
            image.frame_interval().as_nanos() as u64,
            image.data(),
            frame_id,
        )
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
    fn gray8_640x480_frame_fits_one_chunk() {
        let data = vec![0u8; 640 * 480];
        let chunks = chunk_frame("cam", 640, 480, WireImageFormat::Gray8, vec![data.len() as u32], true, 0, &data, 1);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].last);
        assert_eq!(chunks[0].chunk.len(), 307_200);
    }

    #[test]
    fn rgb8_1280x720_frame_splits_into_six_chunks_with_one_last() {
        let data = vec![0u8; 1280 * 720 * 3];
        let chunks = chunk_frame("cam", 1280, 720, WireImageFormat::Rgb8, vec![data.len() as u32], true, 0, &data, 1);
        assert_eq!(chunks.len(), 6);
        assert_eq!(chunks.iter().filter(|c| c.last).count(), 1);
        assert!(chunks.last().unwrap().last);
        let total: usize = chunks.iter().map(|c| c.chunk.len()).sum();
        assert_eq!(total, data.len());
    }
}
