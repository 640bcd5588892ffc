//! GenICam buffer acquisition: announces a fixed ring of buffers to a
//! producer's data stream, starts acquisition, and blocks a dedicated
//! thread on the stream's `EVENT_NEW_BUFFER` queue — the same
//! callback-thread/reactor-post shape [`crate::daq::DaqInputAdapter`] uses
//! for its vendor task, just driven by `thalamus-genicam::gentl`'s event
//! wait instead of a blocking read.
//!
//! Wiring a device up to this module (opening the interface, resolving the
//! device's pixel format/width/height from its register map) is left to
//! the caller; this module only owns the stream/buffer lifecycle once
//! handed an open device handle and a pixel geometry.

use std::sync::Arc;

use thalamus_core::modality::ImageFormat;
use thalamus_core::ReactorHandle;
use thalamus_genicam::gentl::{DevHandle, DsHandle, EventHandle, GenTl};

use crate::error::{AdapterError, Result};
use crate::node::ImageBufferNode;

fn bytes_per_pixel(format: ImageFormat) -> usize {
    match format {
        ImageFormat::Gray8 => 1,
        ImageFormat::Gray16 => 2,
        ImageFormat::Rgb8 => 3,
        ImageFormat::Rgb16 => 6,
        ImageFormat::Yuyv422 => 2,
        ImageFormat::Yuv420p | ImageFormat::Yuvj420p => 3, // average bytes/pixel across Y+U+V planes, rounded up
        ImageFormat::Mpeg1 | ImageFormat::Mpeg4 => 1,
    }
}

pub struct StreamConfig {
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
    pub buffer_count: usize,
    pub stream_id: String,
}

/// Owns one data stream's announced buffers and the acquisition thread
/// blocking on its event queue. Dropping without calling [`Self::stop`]
/// leaks the acquisition thread; `stop` is the only supported teardown.
pub struct GenicamStreamAdapter {
    gentl: Arc<GenTl>,
    stream: DsHandle,
    event: EventHandle,
    buffer_handles: Vec<u64>,
    stop_flag: Arc<std::sync::atomic::AtomicBool>,
    thread: Option<std::thread::JoinHandle<()>>,
}

impl GenicamStreamAdapter {
    /// Open `device`'s data stream, announce and queue `config.buffer_count`
    /// fixed-size buffers sized for `config.width x config.height` at
    /// `config.format`, register for new-buffer events, and start
    /// acquisition. Spawns the thread that blocks on the event queue and
    /// posts each filled frame onto the reactor as a `publish_image` job
    /// against an [`ImageBufferNode`] registered at `node_name`.
    ///
    /// # Safety
    /// `device` must be a valid, open GenTL device handle that outlives
    /// this adapter.
    pub unsafe fn start(gentl: Arc<GenTl>, device: DevHandle, reactor: ReactorHandle, node_name: impl Into<String>, config: StreamConfig) -> Result<Self> {
        let node_name = node_name.into();
        let frame_bytes = config.width as usize * config.height as usize * bytes_per_pixel(config.format);

        let stream = gentl.open_data_stream(device, &config.stream_id)?;

        let mut buffers: Vec<Box<[u8]>> = (0..config.buffer_count).map(|_| vec![0u8; frame_bytes].into_boxed_slice()).collect();
        let mut buffer_handles = Vec::with_capacity(config.buffer_count);
        for buffer in buffers.iter_mut() {
            let handle = gentl.announce_buffer(stream, buffer, std::ptr::null_mut())?;
            gentl.queue_buffer(stream, handle)?;
            buffer_handles.push(handle);
        }

        let Some(event) = gentl.register_new_buffer_event(stream)? else {
            return Err(AdapterError::Device { code: 0, message: "producer does not support GCRegisterEvent, polling fallback not implemented".into() });
        };
        gentl.start_acquisition(stream)?;

        {
            let node_name = node_name.clone();
            reactor.post(move |graph| {
                let node = std::rc::Rc::new(std::cell::RefCell::new(ImageBufferNode::new(node_name.clone())));
                graph.insert(node_name, node);
            });
        }

        let stop_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let thread_stop = stop_flag.clone();
        let thread_gentl = gentl.clone();
        let thread_reactor = reactor.clone();
        let width = config.width;
        let height = config.height;
        let format = config.format;
        let plane_lengths = vec![frame_bytes as u32];
        let thread_buffers: Vec<Box<[u8]>> = buffers.drain(..).collect();
        let thread_handles = buffer_handles.clone();
        // Raw GenTL handles are opaque `*mut c_void`, not `Send` — the
        // producer documents them as safe to hand across threads as long
        // as calls into the same stream/event are serialized, which this
        // single acquisition thread does.
        let stream_addr = stream as usize;
        let event_addr = event as usize;

        let thread = std::thread::Builder::new()
            .name(format!("genicam-stream-{node_name}"))
            .spawn(move || {
                let stream = stream_addr as DsHandle;
                let event = event_addr as EventHandle;
                let mut owned_buffers = thread_buffers;
                while !thread_stop.load(std::sync::atomic::Ordering::Relaxed) {
                    let filled_handle = match unsafe { thread_gentl.wait_new_buffer_event(event, 1_000) } {
                        Ok(handle) => handle,
                        Err(thalamus_genicam::error::GenicamError::NoData) => continue,
                        Err(e) => {
                            tracing::warn!(node = %node_name, error = %e, "GenICam stream event wait failed, stopping");
                            break;
                        }
                    };
                    let Some(index) = thread_handles.iter().position(|&h| h == filled_handle) else { continue };
                    let data = owned_buffers[index].to_vec();

                    let name = node_name.clone();
                    let plane_lengths = plane_lengths.clone();
                    thread_reactor.post(move |graph| {
                        let payload = serde_json::json!({
                            "publish_image": {
                                "width": width,
                                "height": height,
                                "format": format_tag(format),
                                "data": data,
                                "plane_lengths": plane_lengths,
                                "little_endian": true,
                                "frame_interval_ns": 0,
                            }
                        });
                        graph.apply_and_notify(&name, payload);
                    });

                    let _ = unsafe { thread_gentl.queue_buffer(stream, filled_handle) };
                }
            })
            .map_err(AdapterError::Io)?;

        Ok(Self { gentl, stream, event, buffer_handles, stop_flag, thread: Some(thread) })
    }

    /// Kill the blocked event wait, join the acquisition thread, stop
    /// acquisition, flush the queue, and revoke every announced buffer —
    /// in that order, so no buffer is revoked while still queued or the
    /// thread still reading from it.
    pub fn stop(mut self) -> Result<()> {
        self.stop_flag.store(true, std::sync::atomic::Ordering::Relaxed);
        unsafe {
            self.gentl.kill_event(self.event)?;
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
        unsafe {
            self.gentl.stop_acquisition(self.stream)?;
            self.gentl.flush_queue(self.stream)?;
            for handle in &self.buffer_handles {
                self.gentl.revoke_buffer(self.stream, *handle)?;
            }
        }
        Ok(())
    }
}

fn format_tag(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Gray8 => "gray8",
        ImageFormat::Gray16 => "gray16",
        ImageFormat::Rgb8 => "rgb8",
        ImageFormat::Rgb16 => "rgb16",
        ImageFormat::Yuyv422 => "yuyv422",
        ImageFormat::Yuv420p => "yuv420p",
        ImageFormat::Yuvj420p => "yuvj420p",
        ImageFormat::Mpeg1 => "mpeg1",
        ImageFormat::Mpeg4 => "mpeg4",
    }
}
