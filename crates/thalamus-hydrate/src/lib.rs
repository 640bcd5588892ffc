//! Capture log hydration: the wire-record reader, zlib demultiplexer,
//! video decode seam, and HDF5 writer/replay source.
//!
//! Everything here is offline — no reactor, no tokio. `thalamus-rpc`'s
//! `Replay` handler drives a `CaptureReader` and injects the resulting
//! records back into the live node graph on its own virtual clock.

pub mod demux;
pub mod error;
pub mod h5;
pub mod record;
pub mod video;

pub use demux::Demultiplexer;
pub use error::{HydrateError, Result};
pub use h5::{AnalogNodeBuffer, CaptureReader, CaptureWriter, MotionNodeBuffer, SlabIndexEntry};
pub use record::{read_outer_record, write_outer_record, WireRecord};
pub use video::{snap_to_broadcast_framerate, NullVideoDecoder, VideoDecoder};
