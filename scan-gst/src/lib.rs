// SPDX-License-Identifier: MIT
//! # GStreamer Frame Grabber
//!
//! This crate decodes a video source into raw frames using GStreamer, for
//! callers that want to inspect pixels rather than play them back.
//!
//! ## Architecture Overview
//!
//! Every grabber builds one pipeline when it is started:
//! ```text
//! uridecodebin (rtsp/http/file uri)  ─┐
//!                                      ├─▶ videoconvert ─▶ capsfilter ─▶ appsink
//! appsrc (byte reader) ─▶ decodebin  ─┘
//! ```
//!
//! - **uridecodebin**: used for uri and local file inputs. Source elements are
//!   configured through the option map in the `source-setup` signal.
//! - **appsrc + decodebin**: used when the caller already holds a byte stream
//!   (for example an HTTP response body). A feeder thread copies the stream
//!   into `appsrc` and signals end-of-stream when the reader is exhausted.
//! - **appsink**: frames are pulled synchronously by the caller, one at a time.
//!
//! ## Key Design Decisions
//!
//! ### Threading Model
//! - **Caller thread**: builds the pipeline, pulls samples, tears it down
//! - **Streaming threads**: owned by GStreamer
//! - **Feeder thread**: only for reader inputs; exits after its current read
//!   once the grabber is closed. It is detached, so a reader whose `read` can
//!   block forever keeps it alive: give network readers a read timeout
//!
//! ### Options
//! Options are recorded with [`GstGrabber::set_option`] before
//! [`GstGrabber::start`]. `rtsp_transport` maps to the `protocols` property of
//! `rtspsrc`; any other key is applied to the source element when it exposes
//! a property of the same name (underscores become dashes).
//!
//! ### Memory Management
//! - The last pulled buffer stays mapped until the next pull, so
//!   [`GstFrame::data`] borrows decoder memory without copying
//! - `appsrc` is bounded by `max-bytes` and blocks the feeder when full
//!
//! ## Usage
//!
//! ```rust,no_run
//! use scan_gst::GstGrabber;
//!
//! let mut grabber = GstGrabber::from_uri("rtsp://192.168.0.80/stream");
//! grabber.set_option("rtsp_transport", "tcp");
//! let info = grabber.start()?;
//! println!("{}x{} {:?}", info.width, info.height, info.format);
//! while let Some(frame) = grabber.grab()? {
//!     println!("{} bytes", frame.data.len());
//! }
//! grabber.close()?;
//! # Ok::<(), anyhow::Error>(())
//! ```

use anyhow::{anyhow, Context, Result};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use once_cell::sync::OnceCell;
use std::collections::HashMap;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

pub use gst_video::VideoFormat;

/// Option key selecting the RTSP lower transport.
pub const RTSP_TRANSPORT: &str = "rtsp_transport";

/// Bytes copied into `appsrc` per read.
const FEED_CHUNK: usize = 64 * 1024;

/// Upper bound on bytes queued inside `appsrc` before the feeder blocks.
const APPSRC_MAX_BYTES: u64 = 4 * 1024 * 1024;

/// Result of the one-time GStreamer initialisation, shared by all grabbers.
static GST_INIT: OnceCell<std::result::Result<(), String>> = OnceCell::new();

fn ensure_init() -> Result<()> {
    GST_INIT
        .get_or_init(|| gst::init().map_err(|err| err.to_string()))
        .clone()
        .map_err(|err| anyhow!("failed to initialise GStreamer: {err}"))
}

/// Stream geometry reported once the first frame has been decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GstStreamInfo {
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
}

/// One decoded frame, borrowed from the grabber until the next pull.
#[derive(Debug)]
pub struct GstFrame<'a> {
    pub width: u32,
    pub height: u32,
    pub format: VideoFormat,
    pub data: &'a [u8],
}

enum Input {
    Uri(String),
    File(PathBuf),
    Reader(Option<Box<dyn Read + Send>>),
}

/// Live pipeline state, present between `start` and `close`.
struct Running {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    feeder_stop: Option<Arc<AtomicBool>>,
}

/// Pull-based GStreamer decoder for a single source.
pub struct GstGrabber {
    input: Input,
    options: HashMap<String, String>,
    output_format: VideoFormat,
    frame_timeout: Duration,
    running: Option<Running>,
    pending: Option<gst::Sample>,
    current: Option<gst::MappedBuffer<gst::buffer::Readable>>,
}

impl GstGrabber {
    fn with_input(input: Input) -> Self {
        Self {
            input,
            options: HashMap::new(),
            output_format: VideoFormat::Bgr,
            frame_timeout: Duration::from_secs(10),
            running: None,
            pending: None,
            current: None,
        }
    }

    /// Decode a network or file uri (`rtsp://`, `http://`, `file://`, ...).
    pub fn from_uri(uri: impl Into<String>) -> Self {
        Self::with_input(Input::Uri(uri.into()))
    }

    /// Decode a local file.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        Self::with_input(Input::File(path.as_ref().to_path_buf()))
    }

    /// Decode an already-open byte stream.
    pub fn from_reader(reader: Box<dyn Read + Send>) -> Self {
        Self::with_input(Input::Reader(Some(reader)))
    }

    /// Raw layout frames are converted to before they reach the appsink.
    pub fn with_output_format(mut self, format: VideoFormat) -> Self {
        self.output_format = format;
        self
    }

    /// How long `grab` waits for a frame before treating the stream as ended.
    pub fn with_frame_timeout(mut self, timeout: Duration) -> Self {
        self.frame_timeout = timeout;
        self
    }

    /// Record a source option. Applied when the pipeline is built in `start`.
    pub fn set_option(&mut self, key: &str, value: &str) {
        self.options.insert(key.to_string(), value.to_string());
    }

    /// Build and start the pipeline, then wait for the first frame to learn
    /// the stream geometry. The first frame is returned again by `grab`.
    pub fn start(&mut self) -> Result<GstStreamInfo> {
        if self.running.is_some() {
            return Err(anyhow!("grabber already started"));
        }
        ensure_init()?;

        let pipeline = gst::Pipeline::new();
        let tail = gst::parse::bin_from_description(
            &format!(
                "videoconvert ! video/x-raw,format={} ! appsink name=sink sync=false max-buffers=2",
                self.output_format.to_str()
            ),
            true,
        )
        .context("failed to build conversion bin")?;
        let appsink = tail
            .by_name("sink")
            .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
            .ok_or_else(|| anyhow!("conversion bin has no appsink"))?;
        let tail_sink = tail
            .static_pad("sink")
            .ok_or_else(|| anyhow!("conversion bin has no sink pad"))?;
        pipeline.add(&tail)?;

        let head_uri = match &self.input {
            Input::Uri(uri) => Some(uri.clone()),
            Input::File(path) => Some(
                gst::glib::filename_to_uri(path.as_path(), None)
                    .with_context(|| format!("invalid file path {}", path.display()))?
                    .to_string(),
            ),
            Input::Reader(_) => None,
        };

        let feeder_stop = match head_uri {
            Some(uri) => {
                self.add_uri_head(&pipeline, &uri, &tail_sink)?;
                None
            }
            None => {
                let reader = match &mut self.input {
                    Input::Reader(reader) => reader.take(),
                    _ => None,
                }
                .ok_or_else(|| anyhow!("byte stream already consumed"))?;
                Some(add_reader_head(&pipeline, reader, &tail_sink)?)
            }
        };

        self.running = Some(Running {
            pipeline: pipeline.clone(),
            appsink: appsink.clone(),
            feeder_stop,
        });

        pipeline
            .set_state(gst::State::Playing)
            .map_err(|_| self.bus_error().unwrap_or_else(|| anyhow!("failed to set pipeline to Playing")))?;

        let first = appsink
            .try_pull_sample(gst::ClockTime::from_nseconds(self.frame_timeout.as_nanos() as u64))
            .ok_or_else(|| {
                self.bus_error().unwrap_or_else(|| {
                    if appsink.is_eos() {
                        anyhow!("stream ended before the first frame")
                    } else {
                        anyhow!("no frame within {:?}", self.frame_timeout)
                    }
                })
            })?;
        let info = sample_info(&first)?;
        debug!(width = info.width, height = info.height, format = ?info.format, "first frame decoded");
        self.pending = Some(first);
        Ok(info)
    }

    /// Pull the next frame. `Ok(None)` means end-of-stream; a stalled source
    /// (no frame within the frame timeout) is reported the same way.
    pub fn grab(&mut self) -> Result<Option<GstFrame<'_>>> {
        self.current = None;
        let appsink = match &self.running {
            Some(running) => running.appsink.clone(),
            None => return Err(anyhow!("grabber not started")),
        };

        let sample = match self.pending.take() {
            Some(sample) => sample,
            None => {
                let timeout = gst::ClockTime::from_nseconds(self.frame_timeout.as_nanos() as u64);
                match appsink.try_pull_sample(timeout) {
                    Some(sample) => sample,
                    None => {
                        if let Some(err) = self.bus_error() {
                            return Err(err);
                        }
                        if !appsink.is_eos() {
                            warn!(timeout = ?self.frame_timeout, "source stalled, treating as end of stream");
                        }
                        return Ok(None);
                    }
                }
            }
        };

        let info = sample_info(&sample)?;
        let buffer = sample
            .buffer_owned()
            .ok_or_else(|| anyhow!("sample without buffer"))?;
        let mapped = buffer
            .into_mapped_buffer_readable()
            .map_err(|_| anyhow!("failed to map frame buffer"))?;
        let mapped = self.current.insert(mapped);

        Ok(Some(GstFrame {
            width: info.width,
            height: info.height,
            format: info.format,
            data: mapped.as_slice(),
        }))
    }

    /// Stop the pipeline and release every GStreamer resource. Idempotent.
    pub fn close(&mut self) -> Result<()> {
        self.current = None;
        self.pending = None;
        let Some(running) = self.running.take() else {
            return Ok(());
        };
        if let Some(stop) = &running.feeder_stop {
            stop.store(true, Ordering::Relaxed);
        }
        running
            .pipeline
            .set_state(gst::State::Null)
            .map_err(|err| anyhow!("failed to stop pipeline: {err}"))?;
        Ok(())
    }

    fn add_uri_head(&self, pipeline: &gst::Pipeline, uri: &str, tail_sink: &gst::Pad) -> Result<()> {
        let decode = gst::ElementFactory::make("uridecodebin")
            .property("uri", uri)
            .build()
            .map_err(|_| anyhow!("missing GStreamer element: uridecodebin"))?;

        let options = self.options.clone();
        decode.connect("source-setup", false, move |args| {
            if let Some(Ok(source)) = args.get(1).map(|value| value.get::<gst::Element>()) {
                apply_source_options(&source, &options);
            }
            None
        });

        let sink = tail_sink.clone();
        decode.connect_pad_added(move |_, pad| link_video_pad(pad, &sink));
        pipeline.add(&decode)?;
        Ok(())
    }

    fn bus_error(&self) -> Option<anyhow::Error> {
        let bus = self.running.as_ref()?.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(anyhow!(
                "{} ({})",
                err.error(),
                err.debug().map(|d| d.to_string()).unwrap_or_else(|| "no debug info".into())
            )),
            _ => None,
        }
    }
}

impl Drop for GstGrabber {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "grabber teardown failed");
        }
    }
}

fn add_reader_head(
    pipeline: &gst::Pipeline,
    reader: Box<dyn Read + Send>,
    tail_sink: &gst::Pad,
) -> Result<Arc<AtomicBool>> {
    let appsrc = gst::ElementFactory::make("appsrc")
        .name("src")
        .build()
        .map_err(|_| anyhow!("missing GStreamer element: appsrc"))?
        .downcast::<gst_app::AppSrc>()
        .map_err(|_| anyhow!("appsrc is not an AppSrc"))?;
    appsrc.set_block(true);
    appsrc.set_max_bytes(APPSRC_MAX_BYTES);

    let decode = gst::ElementFactory::make("decodebin")
        .build()
        .map_err(|_| anyhow!("missing GStreamer element: decodebin"))?;
    let sink = tail_sink.clone();
    decode.connect_pad_added(move |_, pad| link_video_pad(pad, &sink));

    pipeline.add(&appsrc)?;
    pipeline.add(&decode)?;
    appsrc.link(&decode)?;

    let stop = Arc::new(AtomicBool::new(false));
    let feeder_stop = stop.clone();
    thread::Builder::new()
        .name("scan-gst-feeder".into())
        .spawn(move || feed(appsrc, reader, feeder_stop))
        .context("failed to spawn feeder thread")?;
    Ok(stop)
}

/// Copy the reader into `appsrc` until EOF, close, or a downstream refusal.
fn feed(appsrc: gst_app::AppSrc, mut reader: Box<dyn Read + Send>, stop: Arc<AtomicBool>) {
    let mut chunk = vec![0u8; FEED_CHUNK];
    while !stop.load(Ordering::Relaxed) {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if appsrc.push_buffer(gst::Buffer::from_slice(chunk[..n].to_vec())).is_err() {
                    return;
                }
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                warn!(error = %err, "byte stream read failed");
                break;
            }
        }
    }
    let _ = appsrc.end_of_stream();
}

fn link_video_pad(pad: &gst::Pad, sink: &gst::Pad) {
    if sink.is_linked() {
        return;
    }
    let caps = pad.current_caps().unwrap_or_else(|| pad.query_caps(None));
    let is_video = caps
        .structure(0)
        .map(|s| s.name().to_string().starts_with("video/"))
        .unwrap_or(false);
    if !is_video {
        return;
    }
    if let Err(err) = pad.link(sink) {
        warn!(error = ?err, "failed to link decoded video pad");
    }
}

fn apply_source_options(source: &gst::Element, options: &HashMap<String, String>) {
    for (key, value) in options {
        let property = if key == RTSP_TRANSPORT {
            "protocols".to_string()
        } else {
            key.replace('_', "-")
        };
        if source.find_property(&property).is_some() {
            source.set_property_from_str(&property, value);
            debug!(%property, %value, "source option applied");
        }
    }
}

fn sample_info(sample: &gst::Sample) -> Result<GstStreamInfo> {
    let caps = sample.caps().ok_or_else(|| anyhow!("sample without caps"))?;
    let info = gst_video::VideoInfo::from_caps(caps).context("sample caps are not raw video")?;
    Ok(GstStreamInfo {
        width: info.width(),
        height: info.height(),
        format: info.format(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_recorded_before_start() {
        let mut grabber = GstGrabber::from_uri("rtsp://127.0.0.1/none");
        grabber.set_option(RTSP_TRANSPORT, "tcp");
        assert_eq!(grabber.options.get(RTSP_TRANSPORT).map(String::as_str), Some("tcp"));
        assert!(grabber.running.is_none());
    }

    #[test]
    fn test_grab_before_start_fails() {
        let mut grabber = GstGrabber::from_path("/tmp/missing.mp4");
        assert!(grabber.grab().is_err());
        assert!(grabber.close().is_ok());
    }
}
