//! Frame metadata exchanged between the decoder and the recognition engine.

use super::pixel_format::{DecoderPixelFormat, ImageLayout};

/// Stream properties reported once the decoder has started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamInfo {
    pub width: u32,
    pub height: u32,
    pub pixel_format: DecoderPixelFormat,
}

/// A decoded frame borrowed from the decoder until the next grab.
#[derive(Debug, Clone, Copy)]
pub struct RawFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub pixel_format: &'a DecoderPixelFormat,
    pub data: &'a [u8],
}

impl RawFrame<'_> {
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Frame description submitted to the recognition engine together with the
/// pixel payload. Built once per connection and reused for every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub layout: ImageLayout,
    /// Payload size in bytes of the frame last submitted
    pub memory_size: usize,
}

impl FrameDescriptor {
    pub fn from_stream(info: &StreamInfo) -> Self {
        let memory_size = info
            .pixel_format
            .bytes_per_pixel()
            .map(|bpp| info.width as usize * info.height as usize * bpp)
            .unwrap_or(0);
        Self {
            width: info.width,
            height: info.height,
            layout: info.pixel_format.layout(),
            memory_size,
        }
    }

    /// Same descriptor with the payload size of a specific frame.
    pub fn with_memory_size(self, memory_size: usize) -> Self {
        Self {
            memory_size,
            ..self
        }
    }
}
