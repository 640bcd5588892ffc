//! HDF5 capture writer and replay reader.
//!
//! Layout: one group per node under `analog/<node>` (motion-capture nodes
//! land under `xsens/<node>`, matching the vendor suite name the original
//! ingest used), each holding a `data` dataset (chunked, optionally
//! deflated) and an `index` dataset of `(time_ns, cumulative_sample_count,
//! remote_time_ns)` triples — one entry per received slab, so a reader can
//! binary-search wall-clock time back to a sample offset without scanning
//! the whole dataset.

use hdf5::types::VarLenUnicode;
use hdf5::{File, H5Type};

use crate::error::{HydrateError, Result};

#[derive(Clone, Copy, Debug, H5Type)]
#[repr(C)]
pub struct SlabIndexEntry {
    pub time_ns: u64,
    pub cumulative_sample_count: u64,
    pub remote_time_ns: u64,
}

/// One node's accumulated analog samples plus the per-slab index, built up
/// in memory across a capture session before the two-pass write.
#[derive(Default)]
pub struct AnalogNodeBuffer {
    pub samples: Vec<f64>,
    pub channel_names: Vec<String>,
    pub channel_count: usize,
    pub index: Vec<SlabIndexEntry>,
}

impl AnalogNodeBuffer {
    pub fn push_slab(&mut self, samples: &[f64], time_ns: u64, remote_time_ns: u64) {
        self.samples.extend_from_slice(samples);
        self.index.push(SlabIndexEntry {
            time_ns,
            cumulative_sample_count: self.samples.len() as u64,
            remote_time_ns,
        });
    }
}

/// One motion-capture node's accumulated frames, landing under `xsens/<node>`
/// per the vendor suite name the original ingest used. `positions`/
/// `rotations` are flattened `[x,y,z]`/`[w,x,y,z]` per segment per frame, in
/// the same segment order as `segment_names`; `index.cumulative_sample_count`
/// counts frames (not floats) so it lines up with `segment_names.len()`-sized
/// strides the same way `AnalogNodeBuffer::index` counts samples.
#[derive(Default)]
pub struct MotionNodeBuffer {
    pub segment_names: Vec<String>,
    pub positions: Vec<f32>,
    pub rotations: Vec<f32>,
    pub index: Vec<SlabIndexEntry>,
}

impl MotionNodeBuffer {
    pub fn push_frame(&mut self, positions: &[f32], rotations: &[f32], time_ns: u64, remote_time_ns: u64) {
        self.positions.extend_from_slice(positions);
        self.rotations.extend_from_slice(rotations);
        let frames = if self.segment_names.is_empty() {
            0
        } else {
            self.positions.len() / (self.segment_names.len() * 3)
        };
        self.index.push(SlabIndexEntry {
            time_ns,
            cumulative_sample_count: frames as u64,
            remote_time_ns,
        });
    }
}

fn map_err(e: impl std::fmt::Display) -> HydrateError {
    HydrateError::Hdf5(e.to_string())
}

/// Two-pass writer: the caller accumulates `AnalogNodeBuffer`s for the
/// whole capture first (first pass, sizing every dataset), then calls
/// `write` once per node (second pass) so each dataset is created at its
/// final, correctly-chunked size instead of growing incrementally.
pub struct CaptureWriter {
    file: File,
    deflate_level: Option<u8>,
}

impl CaptureWriter {
    pub fn create(path: &str, deflate_level: Option<u8>) -> Result<Self> {
        let file = File::create(path).map_err(map_err)?;
        Ok(Self { file, deflate_level })
    }

    pub fn write_analog_node(&self, node_name: &str, buffer: &AnalogNodeBuffer) -> Result<()> {
        let group = self.file.create_group(&format!("analog/{node_name}")).map_err(map_err)?;

        let mut data_builder = group.new_dataset::<f64>();
        if !buffer.samples.is_empty() {
            data_builder = data_builder.chunk(buffer.samples.len().min(8192));
        }
        if let Some(level) = self.deflate_level {
            data_builder = data_builder.deflate(level as u32);
        }
        data_builder
            .shape(buffer.samples.len())
            .create("data")
            .map_err(map_err)?
            .write(&buffer.samples)
            .map_err(map_err)?;

        group
            .new_dataset::<SlabIndexEntry>()
            .shape(buffer.index.len())
            .create("index")
            .map_err(map_err)?
            .write(&buffer.index)
            .map_err(map_err)?;

        let names: Vec<VarLenUnicode> =
            buffer.channel_names.iter().map(|n| n.parse().unwrap_or_default()).collect();
        group
            .new_dataset::<VarLenUnicode>()
            .shape(names.len())
            .create("channel_names")
            .map_err(map_err)?
            .write(&names)
            .map_err(map_err)?;

        Ok(())
    }

    pub fn write_motion_node(&self, node_name: &str, buffer: &MotionNodeBuffer) -> Result<()> {
        let group = self.file.create_group(&format!("xsens/{node_name}")).map_err(map_err)?;

        for (field, values) in [("positions", &buffer.positions), ("rotations", &buffer.rotations)] {
            let mut builder = group.new_dataset::<f32>();
            if !values.is_empty() {
                builder = builder.chunk(values.len().min(8192));
            }
            if let Some(level) = self.deflate_level {
                builder = builder.deflate(level as u32);
            }
            builder.shape(values.len()).create(field).map_err(map_err)?.write(values).map_err(map_err)?;
        }

        group
            .new_dataset::<SlabIndexEntry>()
            .shape(buffer.index.len())
            .create("index")
            .map_err(map_err)?
            .write(&buffer.index)
            .map_err(map_err)?;

        let names: Vec<VarLenUnicode> =
            buffer.segment_names.iter().map(|n| n.parse().unwrap_or_default()).collect();
        group
            .new_dataset::<VarLenUnicode>()
            .shape(names.len())
            .create("segment_names")
            .map_err(map_err)?
            .write(&names)
            .map_err(map_err)?;

        Ok(())
    }
}

/// Read-side companion used by `thalamus-rpc`'s `Replay` handler: loads
/// every `analog/<node>` and `xsens/<node>` group's data+index into memory
/// (captures are expected to fit; this mirrors the original's "preloaded
/// slab" replay design) and exposes per-node sample/time lookups.
pub struct CaptureReader {
    pub nodes: Vec<(String, AnalogNodeBuffer)>,
    pub motion_nodes: Vec<(String, MotionNodeBuffer)>,
}

impl CaptureReader {
    pub fn open(path: &str) -> Result<Self> {
        let file = File::open(path).map_err(map_err)?;
        let mut nodes = Vec::new();
        if let Ok(analog_group) = file.group("analog") {
            for member in analog_group.member_names().map_err(map_err)? {
                let group = analog_group.group(&member).map_err(map_err)?;
                let samples: Vec<f64> = group.dataset("data").map_err(map_err)?.read_raw().map_err(map_err)?;
                let index: Vec<SlabIndexEntry> =
                    group.dataset("index").map_err(map_err)?.read_raw().map_err(map_err)?;
                let channel_names = group
                    .dataset("channel_names")
                    .ok()
                    .and_then(|ds| ds.read_raw::<VarLenUnicode>().ok())
                    .map(|names| names.iter().map(|n| n.to_string()).collect())
                    .unwrap_or_default();
                nodes.push((member, AnalogNodeBuffer { samples, channel_names, channel_count: 0, index }));
            }
        }

        let mut motion_nodes = Vec::new();
        if let Ok(xsens_group) = file.group("xsens") {
            for member in xsens_group.member_names().map_err(map_err)? {
                let group = xsens_group.group(&member).map_err(map_err)?;
                let positions: Vec<f32> = group.dataset("positions").map_err(map_err)?.read_raw().map_err(map_err)?;
                let rotations: Vec<f32> = group.dataset("rotations").map_err(map_err)?.read_raw().map_err(map_err)?;
                let index: Vec<SlabIndexEntry> =
                    group.dataset("index").map_err(map_err)?.read_raw().map_err(map_err)?;
                let segment_names = group
                    .dataset("segment_names")
                    .ok()
                    .and_then(|ds| ds.read_raw::<VarLenUnicode>().ok())
                    .map(|names| names.iter().map(|n| n.to_string()).collect())
                    .unwrap_or_default();
                motion_nodes.push((member, MotionNodeBuffer { segment_names, positions, rotations, index }));
            }
        }

        Ok(Self { nodes, motion_nodes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_and_reads_back_an_analog_node() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.h5");
        let path_str = path.to_str().unwrap();

        let mut buffer = AnalogNodeBuffer {
            channel_names: vec!["A".to_string()],
            channel_count: 1,
            ..Default::default()
        };
        buffer.push_slab(&[1.0, 2.0, 3.0], 1_000_000, 1_000_500);

        let writer = CaptureWriter::create(path_str, None).unwrap();
        writer.write_analog_node("ni", &buffer).unwrap();
        drop(writer);

        let reader = CaptureReader::open(path_str).unwrap();
        assert_eq!(reader.nodes.len(), 1);
        let (name, read_back) = &reader.nodes[0];
        assert_eq!(name, "ni");
        assert_eq!(read_back.samples, vec![1.0, 2.0, 3.0]);
        assert_eq!(read_back.index[0].time_ns, 1_000_000);
    }
}
