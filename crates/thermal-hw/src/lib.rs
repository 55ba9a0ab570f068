//! thermal-hw — Hardware layer for TC001-class thermal cameras.
//!
//! Provides V4L2 capture normalized to BGR8, the top-half crop that
//! isolates the thermal image, and JET false-color mapping.

pub mod camera;
pub mod colormap;
pub mod frame;

pub use camera::{device_path, Camera, CameraError, DeviceInfo, FrameSource, PixelFormat};
pub use colormap::apply_jet;
pub use frame::{crop_top_half, Frame, FrameError};
