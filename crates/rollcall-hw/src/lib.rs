//! rollcall-hw — camera capture for the attendance loop.
//!
//! Streams V4L2 frames as 8-bit grayscale, flags dark frames and
//! optionally equalizes contrast with CLAHE.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream};
pub use frame::{Clahe, Frame, PixelFormat};
