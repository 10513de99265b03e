//! tally-hw — Hardware abstraction for the attendance kiosk webcam.
//!
//! Provides a V4L2-backed implementation of the core's `FrameSource`.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError};
