//! Video decoder seam for MPEG1/4-encoded `Image` records.
//!
//! Decoding itself is a vendor/codec kernel exactly like the GenTL
//! transport modules `thalamus-genicam` loads at runtime — out of scope
//! per the purpose/scope Non-goals. This module defines the contract
//! (`VideoDecoder`) and a `NullVideoDecoder` that documents it without
//! linking a real MPEG implementation, plus the framerate-snapping helper
//! the original uses to pick a decoder's nominal frame interval.

use crate::error::{HydrateError, Result};
use crate::record::ImageFormatRecord;

/// Broadcast framerates (Hz) a decoder's declared frame interval snaps to,
/// closest match by absolute difference.
const BROADCAST_FRAMERATES_HZ: &[f64] = &[23.976, 24.0, 25.0, 29.97, 30.0, 50.0, 59.94, 60.0];

pub fn snap_to_broadcast_framerate(frame_interval_ns: u64) -> f64 {
    if frame_interval_ns == 0 {
        return BROADCAST_FRAMERATES_HZ[BROADCAST_FRAMERATES_HZ.len() - 1];
    }
    let observed_hz = 1_000_000_000.0 / frame_interval_ns as f64;
    *BROADCAST_FRAMERATES_HZ
        .iter()
        .min_by(|a, b| (**a - observed_hz).abs().partial_cmp(&(**b - observed_hz).abs()).unwrap())
        .unwrap()
}

/// Decodes one compressed video frame into a Gray8 luminance plane.
/// Implementations are created lazily per node on first frame, sized from
/// that frame's declared width/height.
pub trait VideoDecoder {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Decode `payload` (one MPEG1/4 access unit) into exactly
    /// `width * height` luma bytes.
    fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>>;
}

/// Documents the decode contract without linking a real codec: always
/// fails, naming the codec it would have needed, so a caller that reaches
/// this sees an explicit "no vendor decoder wired up" error rather than
/// garbage frames.
pub struct NullVideoDecoder {
    width: u32,
    height: u32,
    codec: ImageFormatRecord,
}

impl NullVideoDecoder {
    pub fn new(width: u32, height: u32, codec: ImageFormatRecord) -> Self {
        Self { width, height, codec }
    }
}

impl VideoDecoder for NullVideoDecoder {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn decode(&mut self, _payload: &[u8]) -> Result<Vec<u8>> {
        Err(HydrateError::UnsupportedCodec(format!("{:?} decode requires a vendor codec kernel", self.codec)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snaps_ntsc_interval_to_29_97() {
        let interval_ns = 33_366_700; // ~29.97fps NTSC cadence
        let snapped = snap_to_broadcast_framerate(interval_ns);
        assert_eq!(snapped, 29.97);
    }

    #[test]
    fn snaps_exact_25hz() {
        let interval_ns = 40_000_000; // exactly 25Hz
        assert_eq!(snap_to_broadcast_framerate(interval_ns), 25.0);
    }

    #[test]
    fn null_decoder_names_the_missing_codec() {
        let mut decoder = NullVideoDecoder::new(640, 480, ImageFormatRecord::Mpeg4);
        let err = decoder.decode(&[0u8; 16]).unwrap_err();
        assert!(err.to_string().contains("Mpeg4"));
    }
}
