//! # Core Infrastructure Module
//!
//! Frame storage and frame metadata shared by the capture and processing layers.

pub mod frame;
pub mod frame_buffer;
pub mod pixel_format;

pub use frame::{FrameDescriptor, RawFrame, StreamInfo};
pub use frame_buffer::FrameBuffer;
pub use pixel_format::{DecoderPixelFormat, ImageLayout, map_pixel_format};
