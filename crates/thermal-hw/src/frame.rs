//! Frame type and pixel handling — format conversion to BGR8 and the top-half crop.

use std::time::Instant;

/// Bytes per pixel of every frame handed out by this crate (BGR8).
pub const CHANNELS: usize = 3;

/// A captured 3-channel BGR frame.
#[derive(Clone)]
pub struct Frame {
    /// BGR pixel data, row-major, tightly packed (`width * height * 3` bytes).
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub timestamp: Instant,
    pub sequence: u32,
}

impl Frame {
    /// Wrap a BGR buffer, checking that its length matches the dimensions.
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Result<Self, FrameError> {
        let frame = Self {
            data,
            width,
            height,
            timestamp: Instant::now(),
            sequence: 0,
        };
        frame.validate()?;
        Ok(frame)
    }

    /// Row stride in bytes.
    pub fn step(&self) -> usize {
        self.width as usize * CHANNELS
    }

    /// Number of bytes a `width` x `height` BGR frame occupies.
    pub fn expected_len(width: u32, height: u32) -> usize {
        width as usize * height as usize * CHANNELS
    }

    /// Check that `data` holds exactly `width * height` BGR pixels.
    pub fn validate(&self) -> Result<(), FrameError> {
        let expected = Self::expected_len(self.width, self.height);
        if self.data.len() != expected {
            return Err(FrameError::InvalidLength {
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Keep rows `0..height/2` of the frame, all columns.
///
/// Assumes the dual-image layout of TC001-class sensors: the visual
/// rendering sits in the upper half and the raw thermal words in the lower
/// half. This is a fixed assumption about the device output, not detected
/// per frame.
pub fn crop_top_half(frame: &Frame) -> Result<Frame, FrameError> {
    frame.validate()?;

    let half = frame.height / 2;
    if half == 0 || frame.width == 0 {
        return Err(FrameError::TooSmall {
            width: frame.width,
            height: frame.height,
        });
    }

    let len = half as usize * frame.step();
    Ok(Frame {
        data: frame.data[..len].to_vec(),
        width: frame.width,
        height: half,
        timestamp: frame.timestamp,
        sequence: frame.sequence,
    })
}

/// Convert packed YUYV (4:2:2) to BGR8 using integer BT.601 (limited range).
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_bgr(yuyv: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    let expected = pixels * 2;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut bgr = Vec::with_capacity(pixels * CHANNELS);
    for quad in yuyv[..expected].chunks_exact(4) {
        let d = quad[1] as i32 - 128;
        let e = quad[3] as i32 - 128;
        for y in [quad[0], quad[2]] {
            let c = 298 * (y as i32 - 16);
            bgr.push(clamp_u8((c + 516 * d + 128) >> 8));
            bgr.push(clamp_u8((c - 100 * d - 208 * e + 128) >> 8));
            bgr.push(clamp_u8((c + 409 * e + 128) >> 8));
        }
    }
    // Odd pixel counts leave a trailing half-quad.
    bgr.resize(pixels * CHANNELS, 0);
    Ok(bgr)
}

/// Replicate 8-bit grayscale into three BGR channels.
pub fn grey_to_bgr(grey: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let pixels = width as usize * height as usize;
    if grey.len() < pixels {
        return Err(FrameError::InvalidLength {
            expected: pixels,
            actual: grey.len(),
        });
    }
    Ok(grey[..pixels].iter().flat_map(|&g| [g, g, g]).collect())
}

/// Swap packed RGB24 into BGR24.
pub fn rgb_to_bgr(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FrameError> {
    let expected = Frame::expected_len(width, height);
    if rgb.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: rgb.len(),
        });
    }
    Ok(rgb[..expected]
        .chunks_exact(CHANNELS)
        .flat_map(|px| [px[2], px[1], px[0]])
        .collect())
}

fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid buffer length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("frame too small to crop: {width}x{height}")]
    TooSmall { width: u32, height: u32 },
}
