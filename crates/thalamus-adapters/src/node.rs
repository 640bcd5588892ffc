//! Concrete `Node` implementations the reference adapters publish through.
//! Each owns its latest frame and the `ready`/`channels_changed` signals;
//! adapters construct one on the reactor thread and call `publish_*` from
//! inside a posted `Job`, never from the vendor callback thread directly.

use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use thalamus_core::modality::{AnalogNode as AnalogNodeTrait, ChannelSpan, ImageFormat};
use thalamus_core::{Modality, Node, Signal};

/// Body of a `{"publish_analog": ...}` request. Adapter callback threads
/// never hold the node's `Rc`, so a frame crosses onto the reactor thread
/// as a plain JSON value via `Node::process_request` and is applied here.
#[derive(Deserialize)]
struct PublishAnalog {
    spans: Vec<ChannelSpanJson>,
    sample_interval_ns: Vec<u64>,
    data: Vec<f32>,
}

#[derive(Deserialize)]
struct ChannelSpanJson {
    name: String,
    begin: usize,
    end: usize,
}

#[derive(Deserialize)]
struct PublishMotion {
    segment_names: Vec<String>,
    #[serde(default)]
    segment_ids: Vec<u32>,
    positions: Vec<[f32; 3]>,
    rotations: Vec<[f32; 4]>,
    #[serde(default)]
    frame_number: u32,
    #[serde(default)]
    time_within_frame_ns: u64,
    #[serde(default)]
    pose_name: String,
    #[serde(default)]
    actor: u8,
}

#[derive(Deserialize)]
struct PublishImage {
    width: u32,
    height: u32,
    format: ImageFormatJson,
    data: Vec<u8>,
    #[serde(default)]
    plane_lengths: Vec<u32>,
    #[serde(default = "default_true")]
    little_endian: bool,
    #[serde(default)]
    frame_interval_ns: u64,
}

fn default_true() -> bool {
    true
}

#[derive(Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
enum ImageFormatJson {
    Gray8,
    Gray16,
    Rgb8,
    Rgb16,
    Yuyv422,
    Yuv420p,
    Yuvj420p,
    Mpeg1,
    Mpeg4,
}

impl From<ImageFormatJson> for ImageFormat {
    fn from(f: ImageFormatJson) -> Self {
        match f {
            ImageFormatJson::Gray8 => ImageFormat::Gray8,
            ImageFormatJson::Gray16 => ImageFormat::Gray16,
            ImageFormatJson::Rgb8 => ImageFormat::Rgb8,
            ImageFormatJson::Rgb16 => ImageFormat::Rgb16,
            ImageFormatJson::Yuyv422 => ImageFormat::Yuyv422,
            ImageFormatJson::Yuv420p => ImageFormat::Yuv420p,
            ImageFormatJson::Yuvj420p => ImageFormat::Yuvj420p,
            ImageFormatJson::Mpeg1 => ImageFormat::Mpeg1,
            ImageFormatJson::Mpeg4 => ImageFormat::Mpeg4,
        }
    }
}

pub struct AnalogBufferNode {
    name: String,
    type_name: &'static str,
    spans: Vec<ChannelSpan>,
    sample_intervals: Vec<Duration>,
    data: Vec<f32>,
    ready: Signal<()>,
    channels_changed: Signal<()>,
}

impl AnalogBufferNode {
    pub fn new(name: impl Into<String>, type_name: &'static str) -> Self {
        Self {
            name: name.into(),
            type_name,
            spans: Vec::new(),
            sample_intervals: Vec::new(),
            data: Vec::new(),
            ready: Signal::new(),
            channels_changed: Signal::new(),
        }
    }

    /// Replace the current frame in place. Returns whether the span
    /// layout differs from the previous frame, i.e. whether a caller
    /// going through a `Signal` should fire `channels_changed` before
    /// `ready`. Does not emit anything itself — see [`Self::publish`]
    /// for direct callers and `NodeGraph::apply_and_notify` for the
    /// reactor-confined path, which must emit from a released borrow.
    pub fn apply(&mut self, spans: Vec<ChannelSpan>, sample_intervals: Vec<Duration>, data: Vec<f32>) -> bool {
        let layout_changed = spans.len() != self.spans.len()
            || spans.iter().zip(self.spans.iter()).any(|(a, b)| a.name != b.name || a.begin != b.begin || a.end != b.end);
        self.spans = spans;
        self.sample_intervals = sample_intervals;
        self.data = data;
        layout_changed
    }

    /// Replace the current frame and fire `ready` (and `channels_changed`
    /// first, if the span layout changed). Only safe to call directly
    /// when `self` isn't behind a `Rc<RefCell<dyn Node>>` some subscriber
    /// might be mid-read of, e.g. in tests.
    pub fn publish(&mut self, spans: Vec<ChannelSpan>, sample_intervals: Vec<Duration>, data: Vec<f32>) {
        let layout_changed = self.apply(spans, sample_intervals, data);
        if layout_changed {
            self.channels_changed.emit(());
        }
        self.ready.emit(());
    }
}

impl Node for AnalogBufferNode {
    fn name(&self) -> &str {
        &self.name
    }
    fn type_name(&self) -> &str {
        self.type_name
    }
    fn modalities(&self) -> Modality {
        Modality::ANALOG
    }
    fn ready(&self) -> &Signal<()> {
        &self.ready
    }
    fn channels_changed(&self) -> &Signal<()> {
        &self.channels_changed
    }
    fn as_analog(&self) -> Option<&dyn AnalogNodeTrait> {
        Some(self)
    }
    fn process_request(&mut self, request: Value) -> Option<Value> {
        let body = request.get("publish_analog")?.clone();
        let publish: PublishAnalog = serde_json::from_value(body).ok()?;
        let spans = publish
            .spans
            .into_iter()
            .map(|s| ChannelSpan { name: s.name, begin: s.begin, end: s.end })
            .collect();
        let intervals = publish.sample_interval_ns.into_iter().map(Duration::from_nanos).collect();
        let channels_changed = self.apply(spans, intervals, publish.data);
        Some(serde_json::json!({ "channels_changed": channels_changed }))
    }
}

impl AnalogNodeTrait for AnalogBufferNode {
    fn channel_count(&self) -> usize {
        self.spans.len()
    }
    fn spans(&self) -> &[ChannelSpan] {
        &self.spans
    }
    fn sample_interval(&self, span_index: usize) -> Duration {
        self.sample_intervals.get(span_index).copied().unwrap_or_default()
    }
    fn data(&self) -> &[f32] {
        &self.data
    }
    fn sample_count(&self, span_index: usize) -> usize {
        self.spans.get(span_index).map(|s| s.end - s.begin).unwrap_or(0)
    }
}

pub struct MotionBufferNode {
    name: String,
    segment_names: Vec<String>,
    segment_ids: Vec<u32>,
    positions: Vec<[f32; 3]>,
    rotations: Vec<[f32; 4]>,
    frame_number: u32,
    time_within_frame: Duration,
    pose_name: String,
    actor: u8,
    ready: Signal<()>,
    channels_changed: Signal<()>,
}

impl MotionBufferNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            segment_names: Vec::new(),
            segment_ids: Vec::new(),
            positions: Vec::new(),
            rotations: Vec::new(),
            frame_number: 0,
            time_within_frame: Duration::ZERO,
            pose_name: String::new(),
            actor: 0,
            ready: Signal::new(),
            channels_changed: Signal::new(),
        }
    }

    /// Mutate only — see [`AnalogBufferNode::apply`] for why the reactor-
    /// confined path can't emit from here.
    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        segment_names: Vec<String>,
        segment_ids: Vec<u32>,
        positions: Vec<[f32; 3]>,
        rotations: Vec<[f32; 4]>,
        frame_number: u32,
        time_within_frame: Duration,
        pose_name: String,
        actor: u8,
    ) -> bool {
        let layout_changed = segment_names != self.segment_names;
        self.segment_names = segment_names;
        self.segment_ids = segment_ids;
        self.positions = positions;
        self.rotations = rotations;
        self.frame_number = frame_number;
        self.time_within_frame = time_within_frame;
        self.pose_name = pose_name;
        self.actor = actor;
        layout_changed
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        &mut self,
        segment_names: Vec<String>,
        segment_ids: Vec<u32>,
        positions: Vec<[f32; 3]>,
        rotations: Vec<[f32; 4]>,
        frame_number: u32,
        time_within_frame: Duration,
        pose_name: String,
        actor: u8,
    ) {
        let layout_changed = self.apply(segment_names, segment_ids, positions, rotations, frame_number, time_within_frame, pose_name, actor);
        if layout_changed {
            self.channels_changed.emit(());
        }
        self.ready.emit(());
    }
}

impl Node for MotionBufferNode {
    fn name(&self) -> &str {
        &self.name
    }
    fn type_name(&self) -> &str {
        "mocap"
    }
    fn modalities(&self) -> Modality {
        Modality::MOTION
    }
    fn ready(&self) -> &Signal<()> {
        &self.ready
    }
    fn channels_changed(&self) -> &Signal<()> {
        &self.channels_changed
    }
    fn as_motion(&self) -> Option<&dyn thalamus_core::modality::MotionNode> {
        Some(self)
    }
    fn process_request(&mut self, request: Value) -> Option<Value> {
        let body = request.get("publish_motion")?.clone();
        let publish: PublishMotion = serde_json::from_value(body).ok()?;
        let segment_ids = if publish.segment_ids.is_empty() {
            (0..publish.segment_names.len() as u32).collect()
        } else {
            publish.segment_ids
        };
        let channels_changed = self.apply(
            publish.segment_names,
            segment_ids,
            publish.positions,
            publish.rotations,
            publish.frame_number,
            Duration::from_nanos(publish.time_within_frame_ns),
            publish.pose_name,
            publish.actor,
        );
        Some(serde_json::json!({ "channels_changed": channels_changed }))
    }
}

impl thalamus_core::modality::MotionNode for MotionBufferNode {
    fn segment_names(&self) -> &[String] {
        &self.segment_names
    }
    fn segment_ids(&self) -> &[u32] {
        &self.segment_ids
    }
    fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }
    fn rotations(&self) -> &[[f32; 4]] {
        &self.rotations
    }
    fn frame_number(&self) -> u32 {
        self.frame_number
    }
    fn time_within_frame(&self) -> Duration {
        self.time_within_frame
    }
    fn pose_name(&self) -> &str {
        &self.pose_name
    }
    fn actor(&self) -> u8 {
        self.actor
    }
}

/// Buffers the latest decoded frame from an image-producing acquisition
/// source (the GenICam streaming node, chiefly) the same way
/// [`AnalogBufferNode`] buffers one analog frame.
pub struct ImageBufferNode {
    name: String,
    width: u32,
    height: u32,
    format: ImageFormat,
    data: Vec<u8>,
    plane_lengths: Vec<u32>,
    little_endian: bool,
    frame_interval: Duration,
    ready: Signal<()>,
    channels_changed: Signal<()>,
}

impl ImageBufferNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            width: 0,
            height: 0,
            format: ImageFormat::Gray8,
            data: Vec::new(),
            plane_lengths: Vec::new(),
            little_endian: true,
            frame_interval: Duration::ZERO,
            ready: Signal::new(),
            channels_changed: Signal::new(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn apply(
        &mut self,
        width: u32,
        height: u32,
        format: ImageFormat,
        data: Vec<u8>,
        plane_lengths: Vec<u32>,
        little_endian: bool,
        frame_interval: Duration,
    ) -> bool {
        let layout_changed = width != self.width || height != self.height || format != self.format;
        self.width = width;
        self.height = height;
        self.format = format;
        self.data = data;
        self.plane_lengths = plane_lengths;
        self.little_endian = little_endian;
        self.frame_interval = frame_interval;
        layout_changed
    }

    #[allow(clippy::too_many_arguments)]
    pub fn publish(
        &mut self,
        width: u32,
        height: u32,
        format: ImageFormat,
        data: Vec<u8>,
        plane_lengths: Vec<u32>,
        little_endian: bool,
        frame_interval: Duration,
    ) {
        let layout_changed = self.apply(width, height, format, data, plane_lengths, little_endian, frame_interval);
        if layout_changed {
            self.channels_changed.emit(());
        }
        self.ready.emit(());
    }
}

impl Node for ImageBufferNode {
    fn name(&self) -> &str {
        &self.name
    }
    fn type_name(&self) -> &str {
        "genicam_camera"
    }
    fn modalities(&self) -> Modality {
        Modality::IMAGE
    }
    fn ready(&self) -> &Signal<()> {
        &self.ready
    }
    fn channels_changed(&self) -> &Signal<()> {
        &self.channels_changed
    }
    fn as_image(&self) -> Option<&dyn thalamus_core::modality::ImageNode> {
        Some(self)
    }
    fn process_request(&mut self, request: Value) -> Option<Value> {
        let body = request.get("publish_image")?.clone();
        let publish: PublishImage = serde_json::from_value(body).ok()?;
        let plane_lengths = if publish.plane_lengths.is_empty() { vec![publish.data.len() as u32] } else { publish.plane_lengths };
        let channels_changed = self.apply(
            publish.width,
            publish.height,
            publish.format.into(),
            publish.data,
            plane_lengths,
            publish.little_endian,
            Duration::from_nanos(publish.frame_interval_ns),
        );
        Some(serde_json::json!({ "channels_changed": channels_changed }))
    }
}

impl thalamus_core::modality::ImageNode for ImageBufferNode {
    fn width(&self) -> u32 {
        self.width
    }
    fn height(&self) -> u32 {
        self.height
    }
    fn format(&self) -> ImageFormat {
        self.format
    }
    fn data(&self) -> &[u8] {
        &self.data
    }
    fn plane_lengths(&self) -> Vec<u32> {
        self.plane_lengths.clone()
    }
    fn little_endian(&self) -> bool {
        self.little_endian
    }
    fn frame_interval(&self) -> Duration {
        self.frame_interval
    }
}
