//! # Video Source
//!
//! Locator routing and the scoped decoder handle.
//!
//! | Locator prefix | Route | Decoder options |
//! |----------------|-------|-----------------|
//! | `rtsp:` | [`DecoderBackend::open_url`] | `rtsp_transport=tcp` before start |
//! | `http` (`http:`, `https:`) | [`ByteStreamOpener`] then [`DecoderBackend::open_stream`] | none |
//! | anything else | [`DecoderBackend::open_file`] | none |
//!
//! Prefixes are matched ignoring ASCII case. A [`VideoSource`] closes its
//! decoder exactly once, on [`close`](VideoSource::close) or on drop, and
//! close failures are logged rather than returned.

use std::path::Path;

use tracing::{debug, info, warn};

use super::decoder::{DecoderBackend, FrameGrabber, RTSP_TRANSPORT_OPTION};
use super::http::ByteStreamOpener;
use crate::core::{RawFrame, StreamInfo};
use crate::error::{ScanError, ScanResult};

/// How a locator is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    Rtsp,
    Http,
    File,
}

/// Transport policy applied to the decoder before it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportHint {
    /// Leave the decoder's default transport alone
    Default,
    /// Force a reliable (TCP) transport instead of datagrams
    Reliable,
}

/// Immutable description of one connection attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoSourceDescriptor {
    pub locator: String,
    pub kind: SourceKind,
    pub transport: TransportHint,
}

fn has_prefix(locator: &str, prefix: &str) -> bool {
    locator
        .get(..prefix.len())
        .is_some_and(|head| head.eq_ignore_ascii_case(prefix))
}

impl VideoSourceDescriptor {
    /// Routes a locator by its prefix. Never fails: unknown schemes are files.
    pub fn parse(locator: &str) -> Self {
        let (kind, transport) = if has_prefix(locator, "rtsp:") {
            (SourceKind::Rtsp, TransportHint::Reliable)
        } else if has_prefix(locator, "http") {
            (SourceKind::Http, TransportHint::Default)
        } else {
            (SourceKind::File, TransportHint::Default)
        };
        Self {
            locator: locator.to_string(),
            kind,
            transport,
        }
    }

    /// Decoder options implied by the transport hint.
    pub fn decoder_options(&self) -> Vec<(&'static str, &'static str)> {
        match self.transport {
            TransportHint::Reliable => vec![(RTSP_TRANSPORT_OPTION, "tcp")],
            TransportHint::Default => Vec::new(),
        }
    }
}

/// An opened and started decoder, closed on every exit path.
pub struct VideoSource {
    descriptor: VideoSourceDescriptor,
    grabber: Box<dyn FrameGrabber>,
    info: StreamInfo,
    closed: bool,
}

impl std::fmt::Debug for VideoSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSource")
            .field("descriptor", &self.descriptor)
            .field("info", &self.info)
            .field("closed", &self.closed)
            .finish()
    }
}

impl VideoSource {
    /// Opens the locator through the route its prefix selects, applies the
    /// transport options and starts decoding.
    ///
    /// Any failure here is a [`ScanError::Connection`]; a decoder that was
    /// opened but failed to start is closed before returning.
    pub fn open(
        descriptor: VideoSourceDescriptor,
        backend: &dyn DecoderBackend,
        streams: &dyn ByteStreamOpener,
    ) -> ScanResult<Self> {
        let locator = descriptor.locator.as_str();
        debug!(locator, kind = ?descriptor.kind, backend = backend.name(), "Opening video source");

        let opened = match descriptor.kind {
            SourceKind::Rtsp => backend.open_url(locator),
            SourceKind::Http => streams
                .open(locator)
                .and_then(|stream| backend.open_stream(locator, stream)),
            SourceKind::File => backend.open_file(Path::new(locator)),
        };
        let mut grabber = opened.map_err(|e| connection_error(&descriptor, "open", e))?;

        let started = descriptor
            .decoder_options()
            .into_iter()
            .try_for_each(|(key, value)| grabber.set_option(key, value))
            .and_then(|()| grabber.start());

        match started {
            Ok(info) => {
                info!(
                    locator,
                    width = info.width,
                    height = info.height,
                    format = %info.pixel_format,
                    "Video source started"
                );
                Ok(Self {
                    descriptor,
                    grabber,
                    info,
                    closed: false,
                })
            }
            Err(e) => {
                if let Err(close_err) = grabber.close() {
                    warn!(locator, error = %format!("{close_err:#}"), "Failed to close decoder after start failure");
                }
                Err(connection_error(&descriptor, "start", e))
            }
        }
    }

    pub fn descriptor(&self) -> &VideoSourceDescriptor {
        &self.descriptor
    }

    pub fn info(&self) -> &StreamInfo {
        &self.info
    }

    /// Next decoded frame, `None` at end-of-stream.
    pub fn grab_frame(&mut self) -> ScanResult<Option<RawFrame<'_>>> {
        if self.closed {
            return Err(ScanError::state(
                "closed",
                "grab_frame",
                "video source already released",
            ));
        }
        self.grabber
            .grab_frame()
            .map_err(|e| ScanError::decode(format!("{e:#}")).with_context(self.descriptor.locator.clone()))
    }

    /// Releases the decoder. Later calls do nothing.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.grabber.close() {
            Ok(()) => debug!(locator = %self.descriptor.locator, "Video source released"),
            Err(e) => {
                let error = ScanError::release("video source", format!("{e:#}"))
                    .with_context(self.descriptor.locator.clone());
                warn!(%error, "Ignoring decoder release failure");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

fn connection_error(
    descriptor: &VideoSourceDescriptor,
    operation: &str,
    cause: anyhow::Error,
) -> ScanError {
    let suggestion = match descriptor.kind {
        SourceKind::Rtsp => "check that the camera is reachable and serves RTSP over TCP",
        SourceKind::Http => "check that the URL answers with a video stream",
        SourceKind::File => "check that the file exists and contains video",
    };
    ScanError::connection(&descriptor.locator, format!("{cause:#}"))
        .with_operation(operation)
        .with_recovery_suggestion(suggestion)
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        self.close();
    }
}
