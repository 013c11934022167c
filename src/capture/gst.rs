//! GStreamer decoder backend built on the `scan-gst` grabber.

use std::io::Read;
use std::path::Path;
use std::time::Duration;

use anyhow::Result;
use scan_gst::{GstGrabber, VideoFormat};

use super::decoder::{DecoderBackend, FrameGrabber};
use crate::core::{DecoderPixelFormat, RawFrame, StreamInfo};

fn to_video_format(format: &DecoderPixelFormat) -> VideoFormat {
    match format {
        DecoderPixelFormat::Gray8 => VideoFormat::Gray8,
        DecoderPixelFormat::Rgb24 => VideoFormat::Rgb,
        DecoderPixelFormat::Bgr24 => VideoFormat::Bgr,
        DecoderPixelFormat::Rgba => VideoFormat::Rgba,
        DecoderPixelFormat::Argb => VideoFormat::Argb,
        DecoderPixelFormat::Bgra => VideoFormat::Bgra,
        DecoderPixelFormat::I420 => VideoFormat::I420,
        DecoderPixelFormat::Nv12 => VideoFormat::Nv12,
        DecoderPixelFormat::Other(_) => VideoFormat::Bgr,
    }
}

fn from_video_format(format: VideoFormat) -> DecoderPixelFormat {
    match format {
        VideoFormat::Gray8 => DecoderPixelFormat::Gray8,
        VideoFormat::Rgb => DecoderPixelFormat::Rgb24,
        VideoFormat::Bgr => DecoderPixelFormat::Bgr24,
        VideoFormat::Rgba => DecoderPixelFormat::Rgba,
        VideoFormat::Argb => DecoderPixelFormat::Argb,
        VideoFormat::Bgra => DecoderPixelFormat::Bgra,
        VideoFormat::I420 => DecoderPixelFormat::I420,
        VideoFormat::Nv12 => DecoderPixelFormat::Nv12,
        other => DecoderPixelFormat::Other(other.to_str().to_string()),
    }
}

/// Decoder backend that builds one GStreamer pipeline per source.
#[derive(Debug, Clone)]
pub struct GstDecoderBackend {
    output_format: DecoderPixelFormat,
    frame_timeout: Duration,
}

impl Default for GstDecoderBackend {
    fn default() -> Self {
        Self {
            output_format: DecoderPixelFormat::Bgr24,
            frame_timeout: Duration::from_secs(10),
        }
    }
}

impl GstDecoderBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pixel format decoded frames are converted to.
    pub fn with_output_format(mut self, format: DecoderPixelFormat) -> Self {
        self.output_format = format;
        self
    }

    /// A source that produces no frame for this long is treated as ended.
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    fn wrap(&self, grabber: GstGrabber) -> Box<dyn FrameGrabber> {
        let grabber = grabber
            .with_output_format(to_video_format(&self.output_format))
            .with_frame_timeout(self.frame_timeout);
        Box::new(GstFrameGrabber {
            inner: grabber,
            format: self.output_format.clone(),
        })
    }
}

impl DecoderBackend for GstDecoderBackend {
    fn open_url(&self, url: &str) -> Result<Box<dyn FrameGrabber>> {
        Ok(self.wrap(GstGrabber::from_uri(url)))
    }

    fn open_stream(
        &self,
        _locator: &str,
        stream: Box<dyn Read + Send>,
    ) -> Result<Box<dyn FrameGrabber>> {
        Ok(self.wrap(GstGrabber::from_reader(stream)))
    }

    fn open_file(&self, path: &Path) -> Result<Box<dyn FrameGrabber>> {
        if !path.exists() {
            anyhow::bail!("no such file: {}", path.display());
        }
        Ok(self.wrap(GstGrabber::from_path(path)))
    }

    fn name(&self) -> &str {
        "gstreamer"
    }
}

struct GstFrameGrabber {
    inner: GstGrabber,
    format: DecoderPixelFormat,
}

impl FrameGrabber for GstFrameGrabber {
    fn set_option(&mut self, key: &str, value: &str) -> Result<()> {
        self.inner.set_option(key, value);
        Ok(())
    }

    fn start(&mut self) -> Result<StreamInfo> {
        let info = self.inner.start()?;
        self.format = from_video_format(info.format);
        Ok(StreamInfo {
            width: info.width,
            height: info.height,
            pixel_format: self.format.clone(),
        })
    }

    fn grab_frame(&mut self) -> Result<Option<RawFrame<'_>>> {
        let format = &self.format;
        Ok(self.inner.grab()?.map(|frame| RawFrame {
            width: frame.width,
            height: frame.height,
            pixel_format: format,
            data: frame.data,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.inner.close()
    }
}
