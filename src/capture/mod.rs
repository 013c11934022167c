// # Capture Module
//
// Decoder boundary, byte-stream opening and locator routing.

pub mod decoder;
#[cfg(feature = "gst")]
pub mod gst;
pub mod http;
pub mod source;

pub use decoder::{DecoderBackend, FrameGrabber, RTSP_TRANSPORT_OPTION};
pub use http::{ByteStreamOpener, HttpStreamOpener};
pub use source::{SourceKind, TransportHint, VideoSource, VideoSourceDescriptor};
