//! JET false-color mapping for BGR frames.

use crate::frame::{Frame, FrameError, CHANNELS};
use std::sync::OnceLock;

static JET_LUT: OnceLock<[[u8; 3]; 256]> = OnceLock::new();

/// 256-entry JET palette in BGR order. Index 0 is dark blue, 255 dark red.
pub fn jet_lut() -> &'static [[u8; 3]; 256] {
    JET_LUT.get_or_init(|| {
        let mut lut = [[0u8; 3]; 256];
        for (v, entry) in lut.iter_mut().enumerate() {
            let x = v as f32 / 255.0;
            let r = jet_channel(x, 3.0);
            let g = jet_channel(x, 2.0);
            let b = jet_channel(x, 1.0);
            *entry = [b, g, r];
        }
        lut
    })
}

fn jet_channel(x: f32, center: f32) -> u8 {
    let v = (1.5 - (4.0 * x - center).abs()).clamp(0.0, 1.0);
    (v * 255.0).round() as u8
}

/// Luma of one BGR pixel with the fixed-point BT.601 weights (Q14).
pub fn luma(b: u8, g: u8, r: u8) -> u8 {
    let y = 4899 * r as u32 + 9617 * g as u32 + 1868 * b as u32 + 8192;
    (y >> 14) as u8
}

/// Map a BGR frame through the JET palette.
///
/// Each pixel is reduced to its luma and replaced by the palette entry,
/// so the output keeps the input dimensions and stays 3-channel BGR8.
pub fn apply_jet(frame: &Frame) -> Result<Frame, FrameError> {
    frame.validate()?;

    let lut = jet_lut();
    let mut data = Vec::with_capacity(frame.data.len());
    for px in frame.data.chunks_exact(CHANNELS) {
        let gray = luma(px[0], px[1], px[2]);
        data.extend_from_slice(&lut[gray as usize]);
    }

    Ok(Frame {
        data,
        width: frame.width,
        height: frame.height,
        timestamp: frame.timestamp,
        sequence: frame.sequence,
    })
}
