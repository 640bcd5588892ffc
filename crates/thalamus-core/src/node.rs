//! The `Node` trait: the uniform surface every data-producing or
//! data-consuming component in the graph implements, regardless of which
//! modality it carries.

use std::cell::RefCell;
use std::rc::Rc;

use crate::modality::{AnalogNode, ImageNode, Modality, MotionNode, TextNode};
use crate::signal::Signal;

pub type NodeHandle = Rc<RefCell<dyn Node>>;

/// A node in the graph. Concrete nodes (a DAQ adapter, a GenICam camera, a
/// replay source) implement this and the `as_*` accessor matching whatever
/// modality bits they report.
pub trait Node {
    fn name(&self) -> &str;
    fn type_name(&self) -> &str;
    fn modalities(&self) -> Modality;

    /// Fires every time this node publishes a new frame, on the reactor
    /// thread. Subscribers read the frame back out through the matching
    /// `as_*` accessor from inside the slot.
    fn ready(&self) -> &Signal<()>;

    /// Fires when the node's channel topology changes (channels added or
    /// removed, spans resized) rather than on every frame.
    fn channels_changed(&self) -> &Signal<()>;

    fn as_analog(&self) -> Option<&dyn AnalogNode> {
        None
    }
    fn as_image(&self) -> Option<&dyn ImageNode> {
        None
    }
    fn as_motion(&self) -> Option<&dyn MotionNode> {
        None
    }
    fn as_text(&self) -> Option<&dyn TextNode> {
        None
    }

    /// Arbitrary node-specific request/response, used by the `node_request`
    /// RPC for commands that don't fit a modality stream (e.g. "recalibrate").
    fn process_request(&mut self, _request: serde_json::Value) -> Option<serde_json::Value> {
        None
    }
}
