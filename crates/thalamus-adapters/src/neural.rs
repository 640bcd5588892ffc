//! Neural acquisition TCP client: one connection to a vendor server,
//! request/response pairs serialized by a "turnstile" (a monotonic
//! ticket queue — callers block until their ticket is the one being
//! served), and a sampled fetch loop that issues one FETCH per
//! stream/sub-device pair per tick and deinterleaves the response across
//! [`WorkerPool`].

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use byteorder::{BigEndian, ReadBytesExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, Notify};

use thalamus_core::concurrent::WorkerPool;

use crate::error::{AdapterError, Result};

/// Hands out tickets in arrival order and only lets the holder of the
/// currently-served ticket proceed, so request/response pairs against
/// the one TCP connection never interleave even when several async
/// tasks want to FETCH concurrently.
pub struct Turnstile {
    next_ticket: AtomicU64,
    now_serving: Mutex<u64>,
    notify: Notify,
}

impl Default for Turnstile {
    fn default() -> Self {
        Self { next_ticket: AtomicU64::new(0), now_serving: Mutex::new(0), notify: Notify::new() }
    }
}

impl Turnstile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take a ticket and wait until it's this caller's turn. The
    /// returned guard releases the turnstile to the next ticket on drop.
    pub async fn acquire(&self) -> TurnstileGuard<'_> {
        let ticket = self.next_ticket.fetch_add(1, Ordering::SeqCst);
        loop {
            {
                let served = self.now_serving.lock().await;
                if *served == ticket {
                    break;
                }
            }
            self.notify.notified().await;
        }
        TurnstileGuard { turnstile: self }
    }
}

pub struct TurnstileGuard<'a> {
    turnstile: &'a Turnstile,
}

impl Drop for TurnstileGuard<'_> {
    fn drop(&mut self) {
        let turnstile = self.turnstile;
        // now_serving is a tokio Mutex; this runs inside an async drop-less
        // context so take the lock with try_lock, which always succeeds
        // here since nothing else holds it while a guard is alive.
        if let Ok(mut served) = turnstile.now_serving.try_lock() {
            *served += 1;
        }
        turnstile.notify.notify_waiters();
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FetchHeader {
    pub stream_id: u32,
    pub sub_device_id: u32,
    pub channel_count: u32,
    pub samples_per_channel: u32,
}

const FETCH_HEADER_LEN: usize = 16;
const OPCODE_FETCH: u8 = 1;

/// One stream/sub-device pair the fetch loop cycles through, one FETCH
/// per tick per entry.
#[derive(Debug, Clone, Copy)]
pub struct FetchTarget {
    pub stream_id: u32,
    pub sub_device_id: u32,
}

pub struct NeuralClient {
    stream: Mutex<TcpStream>,
    turnstile: Turnstile,
    worker_pool: WorkerPool,
    targets: VecDeque<FetchTarget>,
}

impl NeuralClient {
    pub async fn connect(addr: &str, worker_pool: WorkerPool, targets: Vec<FetchTarget>) -> Result<Self> {
        let stream = TcpStream::connect(addr).await.map_err(AdapterError::Io)?;
        Ok(Self { stream: Mutex::new(stream), turnstile: Turnstile::new(), worker_pool, targets: targets.into() })
    }

    /// Issue one FETCH for `target` and return the header plus the
    /// per-channel deinterleaved samples.
    pub async fn fetch(&self, target: FetchTarget) -> Result<(FetchHeader, Vec<Vec<f32>>)> {
        let _ticket = self.turnstile.acquire().await;
        let mut stream = self.stream.lock().await;

        let mut request = [0u8; 9];
        request[0] = OPCODE_FETCH;
        request[1..5].copy_from_slice(&target.stream_id.to_be_bytes());
        request[5..9].copy_from_slice(&target.sub_device_id.to_be_bytes());
        stream.write_all(&request).await.map_err(AdapterError::Io)?;

        let mut header_buf = [0u8; FETCH_HEADER_LEN];
        stream.read_exact(&mut header_buf).await.map_err(AdapterError::Io)?;
        let header = parse_fetch_header(&header_buf)?;

        let payload_len = header.channel_count as usize * header.samples_per_channel as usize * 4;
        let mut payload = vec![0u8; payload_len];
        stream.read_exact(&mut payload).await.map_err(AdapterError::Io)?;
        drop(stream);

        let interleaved: Vec<f32> = payload
            .chunks_exact(4)
            .map(|b| f32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            .collect();

        let channel_count = header.channel_count as usize;
        let samples_per_channel = header.samples_per_channel as usize;
        let channels: Vec<usize> = (0..channel_count).collect();
        let deinterleaved = self.worker_pool.map(channels, move |channel| {
            (0..samples_per_channel).map(|sample| interleaved[sample * channel_count + channel]).collect::<Vec<f32>>()
        });

        Ok((header, deinterleaved))
    }

    /// Run one pass of the sampled fetch loop: one FETCH per configured
    /// target, in order, each posting its deinterleaved result to
    /// `on_frame`. A vendor-side error on one target is logged and does
    /// not abort the remaining targets this tick.
    pub async fn tick(&self, on_frame: impl Fn(FetchTarget, FetchHeader, Vec<Vec<f32>>) + Send + Sync) -> Result<()> {
        for target in self.targets.iter().copied() {
            match self.fetch(target).await {
                Ok((header, channels)) => on_frame(target, header, channels),
                Err(e) => tracing::warn!(?target, error = %e, "neural fetch failed"),
            }
        }
        Ok(())
    }
}

fn parse_fetch_header(buf: &[u8]) -> Result<FetchHeader> {
    let mut cursor = buf;
    let stream_id = cursor.read_u32::<BigEndian>().map_err(AdapterError::Io)?;
    let sub_device_id = cursor.read_u32::<BigEndian>().map_err(AdapterError::Io)?;
    let channel_count = cursor.read_u32::<BigEndian>().map_err(AdapterError::Io)?;
    let samples_per_channel = cursor.read_u32::<BigEndian>().map_err(AdapterError::Io)?;
    Ok(FetchHeader { stream_id, sub_device_id, channel_count, samples_per_channel })
}

/// Shares one [`NeuralClient`] across tasks; used when several RPC
/// subscribers want frames from the same vendor connection.
pub type SharedNeuralClient = Arc<NeuralClient>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fetch_header() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&3u32.to_be_bytes());
        buf.extend_from_slice(&1u32.to_be_bytes());
        buf.extend_from_slice(&8u32.to_be_bytes());
        buf.extend_from_slice(&100u32.to_be_bytes());
        let header = parse_fetch_header(&buf).unwrap();
        assert_eq!(header.stream_id, 3);
        assert_eq!(header.channel_count, 8);
        assert_eq!(header.samples_per_channel, 100);
    }

    #[tokio::test]
    async fn turnstile_never_admits_two_holders_at_once() {
        let turnstile = Arc::new(Turnstile::new());
        let busy = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let violations = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let turnstile = turnstile.clone();
            let busy = busy.clone();
            let violations = violations.clone();
            handles.push(tokio::spawn(async move {
                let _guard = turnstile.acquire().await;
                if busy.swap(true, Ordering::SeqCst) {
                    violations.fetch_add(1, Ordering::SeqCst);
                }
                tokio::task::yield_now().await;
                busy.store(false, Ordering::SeqCst);
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(violations.load(Ordering::SeqCst), 0, "turnstile admitted overlapping holders");
    }
}
