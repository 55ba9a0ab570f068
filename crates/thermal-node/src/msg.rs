//! `sensor_msgs/msg/Image` and its header types, laid out for CDR encoding.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thermal_hw::{Frame, FrameError};

/// Encoding string for 8-bit, 3-channel BGR data.
pub const ENCODING_BGR8: &str = "bgr8";

/// `builtin_interfaces/msg/Time`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Time {
    pub sec: i32,
    pub nanosec: u32,
}

impl Time {
    /// Convert a duration since the Unix epoch.
    pub fn from_unix(since_epoch: Duration) -> Self {
        Self {
            sec: i32::try_from(since_epoch.as_secs()).unwrap_or(i32::MAX),
            nanosec: since_epoch.subsec_nanos(),
        }
    }
}

/// `std_msgs/msg/Header`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub stamp: Time,
    pub frame_id: String,
}

/// `sensor_msgs/msg/Image`.
///
/// Field order matches the IDL, which is what CDR serializes against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Image {
    pub header: Header,
    pub height: u32,
    pub width: u32,
    pub encoding: String,
    pub is_bigendian: u8,
    /// Row length in bytes.
    pub step: u32,
    pub data: Vec<u8>,
}

impl Image {
    /// Wrap a BGR frame into a `bgr8` image message.
    pub fn from_frame(frame: Frame, stamp: Time, frame_id: &str) -> Result<Self, FrameError> {
        frame.validate()?;
        Ok(Self {
            header: Header {
                stamp,
                frame_id: frame_id.to_string(),
            },
            height: frame.height,
            width: frame.width,
            encoding: ENCODING_BGR8.to_string(),
            is_bigendian: 0,
            step: frame.step() as u32,
            data: frame.data,
        })
    }

    /// Serialize as little-endian CDR with the encapsulation header.
    pub fn encode_cdr(&self) -> Result<Vec<u8>, cdr::Error> {
        cdr::serialize::<_, _, cdr::CdrLe>(self, cdr::Infinite)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: u32, height: u32) -> Frame {
        Frame::new(vec![1u8; Frame::expected_len(width, height)], width, height).unwrap()
    }

    #[test]
    fn test_from_frame_fields() {
        let stamp = Time {
            sec: 1_700_000_000,
            nanosec: 5,
        };
        let image = Image::from_frame(frame(256, 192), stamp, "thermal_link").unwrap();
        assert_eq!(image.header.frame_id, "thermal_link");
        assert_eq!(image.header.stamp, stamp);
        assert_eq!(image.encoding, "bgr8");
        assert_eq!(image.width, 256);
        assert_eq!(image.height, 192);
        assert_eq!(image.step, 256 * 3);
        assert_eq!(image.data.len(), (image.step * image.height) as usize);
        assert_eq!(image.is_bigendian, 0);
    }

    #[test]
    fn test_from_frame_rejects_malformed() {
        let mut f = frame(2, 2);
        f.data.push(0);
        assert!(Image::from_frame(f, Time::default(), "x").is_err());
    }

    #[test]
    fn test_time_from_unix() {
        let t = Time::from_unix(Duration::new(12, 345));
        assert_eq!(t, Time { sec: 12, nanosec: 345 });
    }

    #[test]
    fn test_time_ordering() {
        let a = Time { sec: 1, nanosec: 999 };
        let b = Time { sec: 2, nanosec: 0 };
        assert!(a < b);
    }

    #[test]
    fn test_encode_cdr_layout() {
        let image = Image::from_frame(frame(1, 1), Time { sec: 7, nanosec: 9 }, "t").unwrap();
        let bytes = image.encode_cdr().unwrap();

        // CDR_LE encapsulation header, then stamp.sec / stamp.nanosec.
        assert_eq!(&bytes[..4], &[0x00, 0x01, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &9u32.to_le_bytes());

        let decoded: Image = cdr::deserialize(&bytes).unwrap();
        assert_eq!(decoded, image);
    }
}
