//! # Decoder Boundary
//!
//! Traits implemented by video decoding backends. The library never decodes
//! video itself; a backend opens a locator and hands back a [`FrameGrabber`]
//! that yields raw frames until end-of-stream.
//!
//! Boundary methods return `anyhow::Result` so backends can surface their own
//! error types; [`VideoSource`](super::source::VideoSource) turns them into
//! typed [`ScanError`](crate::error::ScanError)s.

use std::io::Read;
use std::path::Path;

use anyhow::Result;

use crate::core::{RawFrame, StreamInfo};

/// Option key selecting the RTSP lower transport.
pub const RTSP_TRANSPORT_OPTION: &str = "rtsp_transport";

/// An opened, not yet started, decoder handle.
///
/// Lifecycle: `set_option`* → `start` → `grab_frame`* → `close`.
pub trait FrameGrabber: Send {
    /// Sets a decoder option. Only meaningful before [`start`](Self::start).
    fn set_option(&mut self, key: &str, value: &str) -> Result<()>;

    /// Starts decoding and reports the stream properties.
    fn start(&mut self) -> Result<StreamInfo>;

    /// Next decoded frame, or `None` at end-of-stream.
    ///
    /// Blocks until a frame is available. The frame borrows the grabber and is
    /// only valid until the next call.
    fn grab_frame(&mut self) -> Result<Option<RawFrame<'_>>>;

    /// Tears the decoder down. Must tolerate being called more than once.
    fn close(&mut self) -> Result<()>;
}

/// Opens decoder handles for the three kinds of locators.
pub trait DecoderBackend: Send + Sync {
    /// Opens a streaming URL handled natively by the decoder (RTSP).
    fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>>;

    /// Opens an already established byte stream. `locator` is informational.
    fn open_stream(
        &self,
        locator: &str,
        stream: Box<dyn Read + Send>,
    ) -> Result<Box<dyn FrameGrabber>>;

    fn open_file(&self, path: &Path) -> Result<Box<dyn FrameGrabber>>;

    /// Backend name used in log lines.
    fn name(&self) -> &str {
        "decoder"
    }
}
