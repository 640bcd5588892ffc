//! Wall-clock timestamp helper for wire messages that carry `time_ns`.
//!
//! Nodes don't carry their own publish timestamp (the node graph is
//! reactor-confined and the original's steady-clock stamping happens at
//! the point a `ready` subscriber reads the frame, not inside the node
//! itself) — every streaming handler stamps `time_ns` at the moment its
//! `ready` slot fires, which is within one scheduling tick of the actual
//! publish.

use std::time::{SystemTime, UNIX_EPOCH};

pub fn now_ns() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_nanos() as u64).unwrap_or(0)
}
