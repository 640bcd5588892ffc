//! The capture log wire format: a sequence of `(u64 be size, size bytes)`
//! length-prefixed records, each a tagged union over the frame kinds a
//! node can publish plus a `Compressed` envelope used to batch many inner
//! records through one deflate stream (see `demux.rs`).
//!
//! The byte layout inside each record is this crate's own encoding —
//! only the logical record shapes are pinned; every integer is
//! little-endian via `byteorder`, strings/byte blobs are u32-length
//! prefixed.

use std::io::{Cursor, Read, Write};

use byteorder::{ReadBytesExt, WriteBytesExt, LE};

use crate::error::{HydrateError, Result};

#[derive(Clone, Debug, PartialEq)]
pub struct SpanRecord {
    pub name: String,
    pub begin: u32,
    pub end: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct AnalogFrameRecord {
    pub node: String,
    pub time_ns: u64,
    pub spans: Vec<SpanRecord>,
    pub sample_intervals_ns: Vec<u64>,
    pub data: Vec<f64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SegmentRecord {
    pub segment_id: u32,
    pub position: [f32; 3],
    pub rotation: [f32; 4],
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionFrameRecord {
    pub node: String,
    pub time_ns: u64,
    pub pose_name: String,
    pub segments: Vec<SegmentRecord>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageFormatRecord {
    Gray8,
    Rgb8,
    Yuv420p,
    Mpeg1,
    Mpeg4,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ImageFrameRecord {
    pub node: String,
    pub time_ns: u64,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormatRecord,
    pub frame_interval_ns: u64,
    pub last: bool,
    pub planes: Vec<Vec<u8>>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TextEventRecord {
    pub node: String,
    pub time_ns: u64,
    pub text: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ArbitraryEventRecord {
    pub node: String,
    pub time_ns: u64,
    pub payload: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CompressedRecord {
    pub stream_id: u32,
    pub inner_size: u32,
    pub deflated: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum WireRecord {
    Analog(AnalogFrameRecord),
    Motion(MotionFrameRecord),
    Image(ImageFrameRecord),
    Text(TextEventRecord),
    Arbitrary(ArbitraryEventRecord),
    Compressed(CompressedRecord),
}

const TAG_ANALOG: u8 = 0;
const TAG_MOTION: u8 = 1;
const TAG_IMAGE: u8 = 2;
const TAG_TEXT: u8 = 3;
const TAG_ARBITRARY: u8 = 4;
const TAG_COMPRESSED: u8 = 5;

fn write_string(w: &mut impl Write, s: &str) -> Result<()> {
    w.write_u32::<LE>(s.len() as u32)?;
    w.write_all(s.as_bytes())?;
    Ok(())
}

fn read_string(r: &mut impl Read) -> Result<String> {
    let len = r.read_u32::<LE>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|e| HydrateError::Record(format!("invalid utf8: {e}")))
}

fn write_bytes(w: &mut impl Write, b: &[u8]) -> Result<()> {
    w.write_u32::<LE>(b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

fn read_bytes(r: &mut impl Read) -> Result<Vec<u8>> {
    let len = r.read_u32::<LE>()? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

impl WireRecord {
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            WireRecord::Analog(r) => {
                out.write_u8(TAG_ANALOG)?;
                write_string(&mut out, &r.node)?;
                out.write_u64::<LE>(r.time_ns)?;
                out.write_u32::<LE>(r.spans.len() as u32)?;
                for span in &r.spans {
                    write_string(&mut out, &span.name)?;
                    out.write_u32::<LE>(span.begin)?;
                    out.write_u32::<LE>(span.end)?;
                }
                out.write_u32::<LE>(r.sample_intervals_ns.len() as u32)?;
                for interval in &r.sample_intervals_ns {
                    out.write_u64::<LE>(*interval)?;
                }
                out.write_u32::<LE>(r.data.len() as u32)?;
                for sample in &r.data {
                    out.write_f64::<LE>(*sample)?;
                }
            }
            WireRecord::Motion(r) => {
                out.write_u8(TAG_MOTION)?;
                write_string(&mut out, &r.node)?;
                out.write_u64::<LE>(r.time_ns)?;
                write_string(&mut out, &r.pose_name)?;
                out.write_u32::<LE>(r.segments.len() as u32)?;
                for seg in &r.segments {
                    out.write_u32::<LE>(seg.segment_id)?;
                    for v in seg.position {
                        out.write_f32::<LE>(v)?;
                    }
                    for v in seg.rotation {
                        out.write_f32::<LE>(v)?;
                    }
                }
            }
            WireRecord::Image(r) => {
                out.write_u8(TAG_IMAGE)?;
                write_string(&mut out, &r.node)?;
                out.write_u64::<LE>(r.time_ns)?;
                out.write_u32::<LE>(r.width)?;
                out.write_u32::<LE>(r.height)?;
                out.write_u8(format_tag(r.format))?;
                out.write_u64::<LE>(r.frame_interval_ns)?;
                out.write_u8(r.last as u8)?;
                out.write_u32::<LE>(r.planes.len() as u32)?;
                for plane in &r.planes {
                    write_bytes(&mut out, plane)?;
                }
            }
            WireRecord::Text(r) => {
                out.write_u8(TAG_TEXT)?;
                write_string(&mut out, &r.node)?;
                out.write_u64::<LE>(r.time_ns)?;
                write_string(&mut out, &r.text)?;
            }
            WireRecord::Arbitrary(r) => {
                out.write_u8(TAG_ARBITRARY)?;
                write_string(&mut out, &r.node)?;
                out.write_u64::<LE>(r.time_ns)?;
                write_bytes(&mut out, &r.payload)?;
            }
            WireRecord::Compressed(r) => {
                out.write_u8(TAG_COMPRESSED)?;
                out.write_u32::<LE>(r.stream_id)?;
                out.write_u32::<LE>(r.inner_size)?;
                write_bytes(&mut out, &r.deflated)?;
            }
        }
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<WireRecord> {
        let mut cursor = Cursor::new(bytes);
        let tag = cursor.read_u8()?;
        Ok(match tag {
            TAG_ANALOG => {
                let node = read_string(&mut cursor)?;
                let time_ns = cursor.read_u64::<LE>()?;
                let span_count = cursor.read_u32::<LE>()?;
                let mut spans = Vec::with_capacity(span_count as usize);
                for _ in 0..span_count {
                    let name = read_string(&mut cursor)?;
                    let begin = cursor.read_u32::<LE>()?;
                    let end = cursor.read_u32::<LE>()?;
                    spans.push(SpanRecord { name, begin, end });
                }
                let interval_count = cursor.read_u32::<LE>()?;
                let mut sample_intervals_ns = Vec::with_capacity(interval_count as usize);
                for _ in 0..interval_count {
                    sample_intervals_ns.push(cursor.read_u64::<LE>()?);
                }
                let sample_count = cursor.read_u32::<LE>()?;
                let mut data = Vec::with_capacity(sample_count as usize);
                for _ in 0..sample_count {
                    data.push(cursor.read_f64::<LE>()?);
                }
                WireRecord::Analog(AnalogFrameRecord { node, time_ns, spans, sample_intervals_ns, data })
            }
            TAG_MOTION => {
                let node = read_string(&mut cursor)?;
                let time_ns = cursor.read_u64::<LE>()?;
                let pose_name = read_string(&mut cursor)?;
                let seg_count = cursor.read_u32::<LE>()?;
                let mut segments = Vec::with_capacity(seg_count as usize);
                for _ in 0..seg_count {
                    let segment_id = cursor.read_u32::<LE>()?;
                    let mut position = [0f32; 3];
                    for v in position.iter_mut() {
                        *v = cursor.read_f32::<LE>()?;
                    }
                    let mut rotation = [0f32; 4];
                    for v in rotation.iter_mut() {
                        *v = cursor.read_f32::<LE>()?;
                    }
                    segments.push(SegmentRecord { segment_id, position, rotation });
                }
                WireRecord::Motion(MotionFrameRecord { node, time_ns, pose_name, segments })
            }
            TAG_IMAGE => {
                let node = read_string(&mut cursor)?;
                let time_ns = cursor.read_u64::<LE>()?;
                let width = cursor.read_u32::<LE>()?;
                let height = cursor.read_u32::<LE>()?;
                let format = format_from_tag(cursor.read_u8()?)?;
                let frame_interval_ns = cursor.read_u64::<LE>()?;
                let last = cursor.read_u8()? != 0;
                let plane_count = cursor.read_u32::<LE>()?;
                let mut planes = Vec::with_capacity(plane_count as usize);
                for _ in 0..plane_count {
                    planes.push(read_bytes(&mut cursor)?);
                }
                WireRecord::Image(ImageFrameRecord { node, time_ns, width, height, format, frame_interval_ns, last, planes })
            }
            TAG_TEXT => {
                let node = read_string(&mut cursor)?;
                let time_ns = cursor.read_u64::<LE>()?;
                let text = read_string(&mut cursor)?;
                WireRecord::Text(TextEventRecord { node, time_ns, text })
            }
            TAG_ARBITRARY => {
                let node = read_string(&mut cursor)?;
                let time_ns = cursor.read_u64::<LE>()?;
                let payload = read_bytes(&mut cursor)?;
                WireRecord::Arbitrary(ArbitraryEventRecord { node, time_ns, payload })
            }
            TAG_COMPRESSED => {
                let stream_id = cursor.read_u32::<LE>()?;
                let inner_size = cursor.read_u32::<LE>()?;
                let deflated = read_bytes(&mut cursor)?;
                WireRecord::Compressed(CompressedRecord { stream_id, inner_size, deflated })
            }
            other => return Err(HydrateError::Record(format!("unknown record tag {other}"))),
        })
    }
}

fn format_tag(format: ImageFormatRecord) -> u8 {
    match format {
        ImageFormatRecord::Gray8 => 0,
        ImageFormatRecord::Rgb8 => 1,
        ImageFormatRecord::Yuv420p => 2,
        ImageFormatRecord::Mpeg1 => 3,
        ImageFormatRecord::Mpeg4 => 4,
    }
}

fn format_from_tag(tag: u8) -> Result<ImageFormatRecord> {
    Ok(match tag {
        0 => ImageFormatRecord::Gray8,
        1 => ImageFormatRecord::Rgb8,
        2 => ImageFormatRecord::Yuv420p,
        3 => ImageFormatRecord::Mpeg1,
        4 => ImageFormatRecord::Mpeg4,
        other => return Err(HydrateError::Record(format!("unknown image format tag {other}"))),
    })
}

/// Read one length-prefixed outer record (`u64 be size` + `size` bytes) off
/// a stream, returning `None` at clean EOF.
pub fn read_outer_record(r: &mut impl Read) -> Result<Option<Vec<u8>>> {
    let mut size_buf = [0u8; 8];
    match r.read_exact(&mut size_buf) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let size = u64::from_be_bytes(size_buf) as usize;
    let mut buf = vec![0u8; size];
    r.read_exact(&mut buf)?;
    Ok(Some(buf))
}

pub fn write_outer_record(w: &mut impl Write, record: &WireRecord) -> Result<()> {
    let bytes = record.encode()?;
    w.write_all(&(bytes.len() as u64).to_be_bytes())?;
    w.write_all(&bytes)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analog_record_roundtrips() {
        let record = WireRecord::Analog(AnalogFrameRecord {
            node: "ni".into(),
            time_ns: 42,
            spans: vec![SpanRecord { name: "A".into(), begin: 0, end: 3 }],
            sample_intervals_ns: vec![1_000_000],
            data: vec![1.0, 2.0, 3.0],
        });
        let bytes = record.encode().unwrap();
        let decoded = WireRecord::decode(&bytes).unwrap();
        assert_eq!(record, decoded);
    }

    #[test]
    fn outer_record_roundtrips_through_a_stream() {
        let record = WireRecord::Text(TextEventRecord { node: "cam".into(), time_ns: 7, text: "hello".into() });
        let mut buf = Vec::new();
        write_outer_record(&mut buf, &record).unwrap();

        let mut cursor = Cursor::new(buf);
        let bytes = read_outer_record(&mut cursor).unwrap().unwrap();
        assert_eq!(WireRecord::decode(&bytes).unwrap(), record);
        assert!(read_outer_record(&mut cursor).unwrap().is_none());
    }
}
