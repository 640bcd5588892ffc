//! Per-stream zlib demultiplexer for `Compressed` wire records.
//!
//! Every `Compressed` record carries a `stream_id`, the deflated bytes for
//! that chunk, and `inner_size` — the byte length of the next inflated
//! inner record. Chunks accumulate in a per-stream buffer until there is
//! enough inflated data to satisfy the declared size; then exactly one
//! inner record is sliced off the front and the rest stays buffered for
//! the next call, exactly like the reader in `original_source` interleaves
//! compressed and uncompressed outer records on one stream.

use std::collections::HashMap;

use flate2::{Decompress, FlushDecompress, Status};

use crate::error::{HydrateError, Result};
use crate::record::{CompressedRecord, WireRecord};

struct StreamState {
    decompressor: Decompress,
    buffer: Vec<u8>,
    pending_inner_size: usize,
}

impl StreamState {
    fn new() -> Self {
        Self { decompressor: Decompress::new(false), buffer: Vec::new(), pending_inner_size: 0 }
    }
}

/// Demultiplexes any number of concurrently-interleaved `Compressed`
/// streams, each identified by `stream_id`.
#[derive(Default)]
pub struct Demultiplexer {
    streams: HashMap<u32, StreamState>,
}

impl Demultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one `Compressed` record in. Returns the inner [`WireRecord`] if
    /// enough inflated bytes have now accumulated to satisfy the declared
    /// size, otherwise `None` (more chunks are needed).
    pub fn feed(&mut self, record: &CompressedRecord) -> Result<Option<WireRecord>> {
        let state = self.streams.entry(record.stream_id).or_insert_with(StreamState::new);
        state.pending_inner_size = record.inner_size as usize;

        let mut out = [0u8; 8192];
        let mut input = record.deflated.as_slice();
        loop {
            let before_in = state.decompressor.total_in();
            let before_out = state.decompressor.total_out();
            let status = state
                .decompressor
                .decompress(input, &mut out, FlushDecompress::None)
                .map_err(|e| HydrateError::Inflate(e.to_string()))?;
            let consumed = (state.decompressor.total_in() - before_in) as usize;
            let produced = (state.decompressor.total_out() - before_out) as usize;
            state.buffer.extend_from_slice(&out[..produced]);
            input = &input[consumed..];
            match status {
                Status::Ok if !input.is_empty() => continue,
                Status::Ok | Status::BufError | Status::StreamEnd => break,
            }
        }

        if state.buffer.len() < state.pending_inner_size {
            return Ok(None);
        }

        let inner_bytes: Vec<u8> = state.buffer.drain(..state.pending_inner_size).collect();
        Ok(Some(WireRecord::decode(&inner_bytes)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{TextEventRecord, WireRecord};
    use flate2::write::DeflateEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(bytes: &[u8]) -> Vec<u8> {
        let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(bytes).unwrap();
        encoder.finish().unwrap()
    }

    #[test]
    fn single_chunk_satisfies_declared_size() {
        let inner = WireRecord::Text(TextEventRecord { node: "cam".into(), time_ns: 1, text: "hi".into() });
        let inner_bytes = inner.encode().unwrap();
        let deflated = deflate(&inner_bytes);

        let mut demux = Demultiplexer::new();
        let record = CompressedRecord { stream_id: 1, inner_size: inner_bytes.len() as u32, deflated };
        let decoded = demux.feed(&record).unwrap();
        assert_eq!(decoded, Some(inner));
    }

    #[test]
    fn partial_chunk_waits_for_more_data() {
        let inner = WireRecord::Text(TextEventRecord { node: "cam".into(), time_ns: 1, text: "a longer payload here".into() });
        let inner_bytes = inner.encode().unwrap();
        let deflated = deflate(&inner_bytes);
        let mid = deflated.len() / 2;

        let mut demux = Demultiplexer::new();
        let first = CompressedRecord { stream_id: 9, inner_size: inner_bytes.len() as u32, deflated: deflated[..mid].to_vec() };
        assert_eq!(demux.feed(&first).unwrap(), None);

        let second = CompressedRecord { stream_id: 9, inner_size: inner_bytes.len() as u32, deflated: deflated[mid..].to_vec() };
        assert_eq!(demux.feed(&second).unwrap(), Some(inner));
    }
}
