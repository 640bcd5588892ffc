//! `Spectrogram`: accumulate one channel's samples until a window's worth
//! has arrived, window and FFT it, emit the half-spectrum, then drop a
//! hop's worth of samples and keep accumulating. Grounded on spec.md
//! §4.4's "accumulates per-channel samples until >= window ... applies a
//! Hamming window, runs a real FFT, emits the half-spectrum plus
//! `max_frequency = 0.5/interval`. After emission, drop `hop_s`-worth of
//! samples" — `rustfft`'s complex transform over a zero-imaginary input is
//! this crate's real-FFT (no dedicated real-to-complex crate is in the
//! teacher's or pack's dependency stack for this).

use std::collections::HashMap;
use std::sync::Mutex;

use rustfft::{num_complex::Complex32, FftPlanner};
use tonic::{Request, Response, Status};

use thalamus_core::modality::AnalogNode as AnalogNodeTrait;
use thalamus_core::Modality;
use thalamus_proto::{SpectrogramRequest, SpectrogramResponse};

use crate::clock::now_ns;
use crate::resolve::{spawn_forwarder, subscribe_many_when_ready};
use crate::service::ThalamusService;

fn hamming(len: usize) -> Vec<f32> {
    if len <= 1 {
        return vec![1.0; len];
    }
    (0..len)
        .map(|n| 0.54 - 0.46 * ((2.0 * std::f32::consts::PI * n as f32) / (len - 1) as f32).cos())
        .collect()
}

/// Windows and FFTs every full window currently buffered, draining `hop`
/// samples after each, and returns one response per window closed.
fn drain_windows(buffer: &mut Vec<f32>, node: &str, window_len: usize, hop: usize, interval_ns: u64) -> Vec<SpectrogramResponse> {
    let mut out = Vec::new();
    let window = hamming(window_len);
    let mut planner = FftPlanner::<f32>::new();
    let fft = planner.plan_fft_forward(window_len);

    while buffer.len() >= window_len {
        let mut spectrum: Vec<Complex32> = buffer[..window_len]
            .iter()
            .zip(window.iter())
            .map(|(&s, &w)| Complex32::new(s * w, 0.0))
            .collect();
        fft.process(&mut spectrum);
        let half = window_len / 2 + 1;
        let magnitudes = spectrum[..half].iter().map(|c| c.norm()).collect();

        let interval_s = interval_ns as f64 / 1_000_000_000.0;
        let max_frequency = if interval_s > 0.0 { 0.5 / interval_s } else { 0.0 };
        out.push(SpectrogramResponse { node: node.to_string(), magnitudes, max_frequency, time_ns: now_ns() });

        let drop = hop.min(buffer.len());
        buffer.drain(..drop);
        if drop == 0 {
            break;
        }
    }
    out
}

pub async fn handle_spectrogram(service: &ThalamusService, request: Request<SpectrogramRequest>) -> Result<Response<super::ResponseStream<SpectrogramResponse>>, Status> {
    service.stats.inc_pending();
    let req = request.into_inner();
    let node_name = req.node.clone();
    let window_s = if req.window_s <= 0.0 { 0.0 } else { req.window_s };
    let hop_s = if req.hop_s <= 0.0 { 0.0 } else { req.hop_s };
    let channels = req.channels.clone();
    let buffers: Mutex<HashMap<String, Vec<f32>>> = Mutex::new(HashMap::new());

    let result = subscribe_many_when_ready(&service.reactor, &node_name, Modality::ANALOG, "spectrogram", &service.shutdown, move |node| {
        let Some(analog) = node.as_analog() else { return Vec::new() };
        let spans = analog.spans();
        let selected: Vec<usize> = if channels.is_empty() {
            (0..spans.len()).collect()
        } else {
            channels.iter().filter_map(|n| spans.iter().position(|s| &s.name == n)).collect()
        };
        let mut buffers = buffers.lock().unwrap_or_else(|e| e.into_inner());
        let mut out = Vec::new();
        for idx in selected {
            let span = &analog.spans()[idx];
            let interval_ns = analog.sample_interval(idx).as_nanos() as u64;
            let buffer = buffers.entry(span.name.clone()).or_default();
            buffer.extend_from_slice(&analog.data()[span.begin..span.end]);

            let interval_s = interval_ns as f64 / 1_000_000_000.0;
            let window_len = if interval_s > 0.0 { ((window_s / interval_s).round().max(1.0) as usize).next_power_of_two() } else { 1 };
            let hop = if interval_s > 0.0 { (hop_s / interval_s).round().max(1.0) as usize } else { 1 };
            out.extend(drain_windows(buffer, node.name(), window_len, hop, interval_ns));
        }
        out
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
    fn emits_every_window_the_hop_cadence_exposes_and_retains_remainder() {
        let mut buffer: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let responses = drain_windows(&mut buffer, "probe", 8, 4, 1_000_000);
        // windows at samples [0..8) and [4..12), then 4 samples remain
        assert_eq!(responses.len(), 2);
        assert_eq!(responses[0].magnitudes.len(), 5);
        assert_eq!(buffer.len(), 4);
    }
}
