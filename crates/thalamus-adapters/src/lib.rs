//! Reference acquisition adapters that stand in for real vendor hardware:
//! a DAQ analog input/output pair, a motion-capture UDP ingest, a
//! neural-acquisition TCP client, and a GenICam camera stream. None of
//! these touch `Rc`-backed node state off the reactor thread — every
//! adapter either runs its vendor-facing work on a dedicated thread and
//! posts plain `Send` data to the reactor, or (the TCP client) runs as
//! an ordinary tokio task.

pub mod daq;
pub mod error;
pub mod genicam_stream;
pub mod mocap;
pub mod neural;
pub mod node;

pub use daq::{DaqInputAdapter, DaqOutputAdapter, DaqTask};
pub use error::{AdapterError, Result};
pub use genicam_stream::{GenicamStreamAdapter, StreamConfig};
pub use mocap::{MocapIngest, PoseDistanceChannel};
pub use neural::{FetchHeader, FetchTarget, NeuralClient, SharedNeuralClient, Turnstile};
pub use node::{AnalogBufferNode, ImageBufferNode, MotionBufferNode};
