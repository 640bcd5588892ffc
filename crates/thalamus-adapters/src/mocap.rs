//! Motion-capture UDP ingest: an MVN-style datagram carries a fixed
//! 24-byte header followed by N fixed 32-byte segment records, all
//! big-endian. Segment ids are stable across frames for a given
//! physical joint, which is what lets [`MocapIngest`] track a running
//! min/max per derived pose-distance channel.

use std::collections::HashMap;
use std::net::UdpSocket;

use byteorder::{BigEndian, ReadBytesExt};
use thalamus_core::ReactorHandle;

use crate::error::{AdapterError, Result};

const HEADER_LEN: usize = 24;
const SEGMENT_LEN: usize = 32;

#[derive(Debug, Clone, Copy)]
pub struct FrameHeader {
    pub frame_number: u32,
    pub actor: u8,
    pub pose_id: u8,
    pub time_within_frame_ns: u64,
    pub segment_count: u32,
}

#[derive(Debug, Clone, Copy)]
pub struct Segment {
    pub segment_id: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct MocapFrame {
    pub header: FrameHeader,
    pub segments: Vec<Segment>,
}

/// Parse one datagram. Returns [`AdapterError::Datagram`] if the buffer
/// is too short for the header or for the declared segment count.
pub fn parse_datagram(buf: &[u8]) -> Result<MocapFrame> {
    if buf.len() < HEADER_LEN {
        return Err(AdapterError::Datagram(format!("datagram too short for header: {} bytes", buf.len())));
    }
    let mut header_cursor = &buf[..HEADER_LEN];
    let frame_number = header_cursor.read_u32::<BigEndian>().unwrap();
    let actor = header_cursor.read_u8().unwrap();
    let pose_id = header_cursor.read_u8().unwrap();
    let _reserved = header_cursor.read_u16::<BigEndian>().unwrap();
    let time_within_frame_ns = header_cursor.read_u64::<BigEndian>().unwrap();
    let segment_count = header_cursor.read_u32::<BigEndian>().unwrap();
    let _reserved2 = header_cursor.read_u32::<BigEndian>().unwrap();

    let header = FrameHeader { frame_number, actor, pose_id, time_within_frame_ns, segment_count };

    let expected = HEADER_LEN + segment_count as usize * SEGMENT_LEN;
    if buf.len() < expected {
        return Err(AdapterError::Datagram(format!(
            "datagram declares {} segments but only has {} bytes (need {})",
            segment_count,
            buf.len(),
            expected
        )));
    }

    let mut segments = Vec::with_capacity(segment_count as usize);
    let mut cursor = &buf[HEADER_LEN..expected];
    for _ in 0..segment_count {
        let segment_id = cursor.read_u32::<BigEndian>().unwrap();
        let mut position = [0f32; 3];
        for p in position.iter_mut() {
            *p = cursor.read_f32::<BigEndian>().unwrap();
        }
        let mut rotation = [0f32; 4];
        for r in rotation.iter_mut() {
            *r = cursor.read_f32::<BigEndian>().unwrap();
        }
        segments.push(Segment { segment_id, position, rotation });
    }

    Ok(MocapFrame { header, segments })
}

fn distance(a: [f32; 3], b: [f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

/// Tracks the running min/max of each fingertip-to-base distance channel
/// so successive frames can be reported normalized into `[0, 1]`.
#[derive(Default)]
struct DistanceNormalizer {
    observed_min: HashMap<u32, f32>,
    observed_max: HashMap<u32, f32>,
}

impl DistanceNormalizer {
    fn normalize(&mut self, fingertip_id: u32, raw: f32) -> f32 {
        let min = self.observed_min.entry(fingertip_id).or_insert(raw);
        let max = self.observed_max.entry(fingertip_id).or_insert(raw);
        if raw < *min {
            *min = raw;
        }
        if raw > *max {
            *max = raw;
        }
        if *max > *min {
            (raw - *min) / (*max - *min)
        } else {
            0.0
        }
    }
}

/// A pairing of a fingertip segment id against the base segment its
/// distance is measured from, reported as one derived analog channel.
pub struct PoseDistanceChannel {
    pub name: String,
    pub fingertip_segment_id: u32,
    pub base_segment_id: u32,
}

/// Listens for MVN-style datagrams on a UDP socket, publishes a motion
/// node with the raw segment pose per frame, and a companion analog node
/// with normalized fingertip-to-base pose-distance channels.
pub struct MocapIngest {
    socket: UdpSocket,
    distance_channels: Vec<PoseDistanceChannel>,
    normalizer: DistanceNormalizer,
}

impl MocapIngest {
    pub fn bind(addr: &str, distance_channels: Vec<PoseDistanceChannel>) -> Result<Self> {
        let socket = UdpSocket::bind(addr).map_err(AdapterError::Io)?;
        Ok(Self { socket, distance_channels, normalizer: DistanceNormalizer::default() })
    }

    /// Block for the next datagram, parse it, and post the derived frame
    /// and analog-channel payloads onto the reactor by name. `motion_node`
    /// and `analog_node` must already exist in the graph.
    pub fn poll_once(&mut self, reactor: &ReactorHandle, motion_node: &str, analog_node: &str) -> Result<()> {
        let mut buf = [0u8; 4096];
        let (n, _src) = self.socket.recv_from(&mut buf).map_err(AdapterError::Io)?;
        let frame = parse_datagram(&buf[..n])?;

        let segment_names: Vec<String> = frame.segments.iter().map(|s| s.segment_id.to_string()).collect();
        let segment_ids: Vec<u32> = frame.segments.iter().map(|s| s.segment_id).collect();
        let positions: Vec<[f32; 3]> = frame.segments.iter().map(|s| s.position).collect();
        let rotations: Vec<[f32; 4]> = frame.segments.iter().map(|s| s.rotation).collect();

        let motion_payload = serde_json::json!({
            "publish_motion": {
                "segment_names": segment_names,
                "segment_ids": segment_ids,
                "positions": positions,
                "rotations": rotations,
                "frame_number": frame.header.frame_number,
                "time_within_frame_ns": frame.header.time_within_frame_ns,
                "pose_name": frame.header.pose_id.to_string(),
                "actor": frame.header.actor,
            }
        });
        let motion_name = motion_node.to_string();
        reactor.post(move |graph| {
            graph.apply_and_notify(&motion_name, motion_payload);
        });

        let by_id: HashMap<u32, [f32; 3]> = frame.segments.iter().map(|s| (s.segment_id, s.position)).collect();
        let mut spans = Vec::new();
        let mut data = Vec::new();
        for (i, channel) in self.distance_channels.iter().enumerate() {
            let (Some(&tip), Some(&base)) = (by_id.get(&channel.fingertip_segment_id), by_id.get(&channel.base_segment_id)) else {
                continue;
            };
            let raw = distance(tip, base);
            let normalized = self.normalizer.normalize(channel.fingertip_segment_id, raw);
            spans.push(serde_json::json!({ "name": channel.name, "begin": i, "end": i + 1 }));
            data.push(normalized);
        }
        if !spans.is_empty() {
            let analog_payload = serde_json::json!({
                "publish_analog": {
                    "spans": spans,
                    "sample_interval_ns": vec![frame.header.time_within_frame_ns.max(1); data.len()],
                    "data": data,
                }
            });
            let analog_name = analog_node.to_string();
            reactor.post(move |graph| {
                graph.apply_and_notify(&analog_name, analog_payload);
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_datagram() -> Vec<u8> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&7u32.to_be_bytes()); // frame_number
        buf.push(1); // actor
        buf.push(0); // pose_id
        buf.extend_from_slice(&0u16.to_be_bytes()); // reserved
        buf.extend_from_slice(&16_666_667u64.to_be_bytes()); // time_within_frame_ns
        buf.extend_from_slice(&2u32.to_be_bytes()); // segment_count
        buf.extend_from_slice(&0u32.to_be_bytes()); // reserved2

        for (id, pos) in [(1u32, [0.0f32, 0.0, 0.0]), (2u32, [1.0f32, 2.0, 2.0])] {
            buf.extend_from_slice(&id.to_be_bytes());
            for p in pos {
                buf.extend_from_slice(&p.to_be_bytes());
            }
            for r in [1.0f32, 0.0, 0.0, 0.0] {
                buf.extend_from_slice(&r.to_be_bytes());
            }
        }
        buf
    }

    #[test]
    fn parses_header_and_segments() {
        let buf = sample_datagram();
        let frame = parse_datagram(&buf).unwrap();
        assert_eq!(frame.header.frame_number, 7);
        assert_eq!(frame.header.segment_count, 2);
        assert_eq!(frame.segments.len(), 2);
        assert_eq!(frame.segments[1].segment_id, 2);
        assert_eq!(frame.segments[1].position, [1.0, 2.0, 2.0]);
    }

    #[test]
    fn rejects_truncated_segment_data() {
        let mut buf = sample_datagram();
        buf.truncate(HEADER_LEN + SEGMENT_LEN);
        let err = parse_datagram(&buf).unwrap_err();
        assert!(matches!(err, AdapterError::Datagram(_)));
    }

    #[test]
    fn normalizer_tracks_running_min_max() {
        let mut normalizer = DistanceNormalizer::default();
        assert_eq!(normalizer.normalize(1, 5.0), 0.0);
        assert_eq!(normalizer.normalize(1, 10.0), 1.0);
        assert_eq!(normalizer.normalize(1, 7.5), 0.5);
    }

    #[test]
    fn distance_matches_euclidean_norm() {
        let d = distance([0.0, 0.0, 0.0], [3.0, 4.0, 0.0]);
        assert!((d - 5.0).abs() < 1e-6);
    }
}
