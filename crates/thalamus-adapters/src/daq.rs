//! DAQ analog input/output reference adapters.
//!
//! The vendor task API (program a sample clock, register an "every N
//! samples" callback, read/write one channel at a time) is abstracted
//! behind [`DaqTask`] the same way `thalamus-genicam::gentl` abstracts the
//! GenTL ABI — a real backend (NI-DAQmx, Comedi, ...) implements the
//! trait; tests use an in-memory stand-in.

use std::time::{Duration, Instant};

use thalamus_core::modality::{AnalogNode, ChannelSpan};
use thalamus_core::ReactorHandle;

use crate::error::{AdapterError, Result};
use crate::node::AnalogBufferNode;

/// One programmed acquisition/output task against a vendor device.
pub trait DaqTask: Send {
    fn channel_names(&self) -> &[String];
    fn sample_rate_hz(&self) -> f64;

    /// Blocks until `samples_per_channel` new samples are available per
    /// channel and returns them row-major `[channel][sample]`. Called from
    /// the adapter's dedicated callback thread, never the reactor.
    fn read_batch(&mut self, samples_per_channel: usize) -> Result<Vec<f64>>;

    /// Write one sample to `channel`. Digital lines treat >= 1.6V as high.
    fn write_sample(&mut self, channel: usize, value: f64) -> Result<()>;
}

/// Posts each batch the vendor task delivers onto the reactor as a
/// `ready` emission from an [`AnalogBufferNode`].
pub struct DaqInputAdapter {
    node_name: String,
    samples_per_callback: usize,
    stop: std::sync::Arc<std::sync::atomic::AtomicBool>,
}

impl DaqInputAdapter {
    /// Register `node_name` on the reactor and spawn the callback thread
    /// driving `task`. Returns immediately; the returned adapter's `Drop`
    /// stops the callback thread.
    ///
    /// The node's `Rc<RefCell<..>>` never leaves the reactor thread: the
    /// callback thread only ever builds a plain `serde_json::Value` frame
    /// and posts a job that looks the node up by name and hands it the
    /// value through `Node::process_request`.
    pub fn start(
        reactor: ReactorHandle,
        node_name: impl Into<String>,
        mut task: Box<dyn DaqTask>,
        samples_per_callback: usize,
    ) -> Result<Self> {
        let node_name = node_name.into();
        let stop = std::sync::Arc::new(std::sync::atomic::AtomicBool::new(false));

        {
            let node_name = node_name.clone();
            reactor.post(move |graph| {
                let node = std::rc::Rc::new(std::cell::RefCell::new(AnalogBufferNode::new(node_name.clone(), "daq_input")));
                graph.insert(node_name, node);
            });
        }

        let stop_flag = stop.clone();
        let thread_node_name = node_name.clone();
        let thread_reactor = reactor.clone();
        std::thread::Builder::new()
            .name(format!("daq-input-{thread_node_name}"))
            .spawn(move || {
                let channel_names = task.channel_names().to_vec();
                let interval_ns = (1.0e9 / task.sample_rate_hz()) as u64;
                while !stop_flag.load(std::sync::atomic::Ordering::Relaxed) {
                    match task.read_batch(samples_per_callback) {
                        Ok(interleaved) => {
                            let spans: Vec<serde_json::Value> = channel_names
                                .iter()
                                .enumerate()
                                .map(|(i, name)| {
                                    serde_json::json!({
                                        "name": name,
                                        "begin": i * samples_per_callback,
                                        "end": (i + 1) * samples_per_callback,
                                    })
                                })
                                .collect();
                            let data: Vec<f32> = interleaved.iter().map(|&v| v as f32).collect();
                            let intervals_ns = vec![interval_ns; channel_names.len()];
                            let payload = serde_json::json!({
                                "publish_analog": {
                                    "spans": spans,
                                    "sample_interval_ns": intervals_ns,
                                    "data": data,
                                }
                            });
                            let name = thread_node_name.clone();
                            thread_reactor.post(move |graph| {
                                graph.apply_and_notify(&name, payload);
                            });
                        }
                        Err(e) => {
                            tracing::warn!(node = %thread_node_name, error = %e, "DAQ read failed, notifying and stopping");
                            break;
                        }
                    }
                }
            })
            .map_err(AdapterError::Io)?;

        Ok(Self { node_name, samples_per_callback, stop })
    }
}

impl Drop for DaqInputAdapter {
    fn drop(&mut self) {
        self.stop.store(true, std::sync::atomic::Ordering::Relaxed);
    }
}

/// Subscribes to an upstream analog node and replays its samples onto
/// real (or simulated) output channels at the node's declared cadence.
/// In fast-forward mode only the most recent sample is written per tick
/// instead of draining the whole buffer sample-by-sample.
pub struct DaqOutputAdapter {
    task: Box<dyn DaqTask>,
    cursors: Vec<usize>,
    fast_forward: bool,
}

impl DaqOutputAdapter {
    pub fn new(task: Box<dyn DaqTask>, fast_forward: bool) -> Self {
        let n = task.channel_names().len();
        Self { task, cursors: vec![0; n], fast_forward }
    }

    /// Advance every channel's write cursor against `now`, writing one
    /// sample per channel per tick (or only the newest sample per channel
    /// in fast-forward mode), given the upstream node's latest frame.
    pub fn tick(&mut self, upstream: &dyn AnalogNode, now: Instant, tick_start: Instant) -> Result<()> {
        for (span_index, span) in upstream.spans().iter().enumerate() {
            let interval = upstream.sample_interval(span_index);
            let elapsed = now.saturating_duration_since(tick_start);
            let target_sample = if interval.is_zero() { 0 } else { (elapsed.as_nanos() / interval.as_nanos().max(1)) as usize };
            let channel_data = &upstream.data()[span.begin..span.end];
            if channel_data.is_empty() {
                continue;
            }

            if self.fast_forward {
                let value = *channel_data.last().unwrap();
                self.task.write_sample(span_index, digital_threshold(value))?;
                self.cursors[span_index] = channel_data.len();
            } else {
                let cursor = &mut self.cursors[span_index];
                while *cursor <= target_sample.min(channel_data.len().saturating_sub(1)) && *cursor < channel_data.len() {
                    self.task.write_sample(span_index, digital_threshold(channel_data[*cursor]))?;
                    *cursor += 1;
                }
            }
        }
        Ok(())
    }
}

/// Digital output lines treat anything >= 1.6V as a logic high; analog
/// lines pass the value through unchanged. Both paths write the same
/// floating value — the threshold only matters to a digital-capable task
/// implementation's own interpretation of it.
fn digital_threshold(value: f32) -> f64 {
    value as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct MockTask {
        names: Vec<String>,
        rate_hz: f64,
        written: Arc<Mutex<Vec<(usize, f64)>>>,
    }

    impl DaqTask for MockTask {
        fn channel_names(&self) -> &[String] {
            &self.names
        }
        fn sample_rate_hz(&self) -> f64 {
            self.rate_hz
        }
        fn read_batch(&mut self, samples_per_channel: usize) -> Result<Vec<f64>> {
            Ok(vec![0.0; samples_per_channel * self.names.len()])
        }
        fn write_sample(&mut self, channel: usize, value: f64) -> Result<()> {
            self.written.lock().unwrap().push((channel, value));
            Ok(())
        }
    }

    #[test]
    fn fast_forward_writes_only_the_latest_sample() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let task = MockTask { names: vec!["A".into()], rate_hz: 1000.0, written: written.clone() };
        let mut adapter = DaqOutputAdapter::new(Box::new(task), true);

        struct Upstream {
            spans: Vec<ChannelSpan>,
            data: Vec<f32>,
        }
        impl AnalogNode for Upstream {
            fn channel_count(&self) -> usize {
                1
            }
            fn spans(&self) -> &[ChannelSpan] {
                &self.spans
            }
            fn sample_interval(&self, _: usize) -> Duration {
                Duration::from_micros(1)
            }
            fn data(&self) -> &[f32] {
                &self.data
            }
            fn sample_count(&self, _: usize) -> usize {
                self.data.len()
            }
        }
        let upstream = Upstream { spans: vec![ChannelSpan { name: "A".into(), begin: 0, end: 5 }], data: vec![1.0, 2.0, 3.0, 4.0, 5.0] };

        let now = Instant::now();
        adapter.tick(&upstream, now, now).unwrap();
        let calls = written.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], (0, 5.0));
    }
}
