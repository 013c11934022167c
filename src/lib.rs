//! # Stream Scan Library
//!
//! Continuous barcode recognition on live or file-backed video streams.
//! A background worker decodes frames from an RTSP, HTTP or local source,
//! normalizes their pixel layout, feeds them to a recognition engine and
//! publishes newly recognized codes and lifecycle status to the caller.
//!
//! ## Architecture
//!
//! The library is organized into several key modules:
//! - `core`: Frame buffer reuse, pixel format mapping and frame metadata
//! - `capture`: Decoder boundary, locator routing and the scoped video source
//! - `processing`: Recognition engine boundary and periodic session clearing
//! - `session`: Reconnecting stream processor, controller and observable state
//! - `config`: Run settings and validation
//! - `error`: Error taxonomy with recovery classification
//!
//! Video decoding and barcode recognition are external collaborators reached
//! through the [`capture::DecoderBackend`] and [`processing::EngineProvider`]
//! traits. The `gst` feature provides a GStreamer decoder backend.
//!
//! ## Example
//!
//! ```rust,no_run
//! use stream_scan::session::{ProcessorController, ProcessorEvent};
//! # fn backend() -> std::sync::Arc<dyn stream_scan::capture::DecoderBackend> { unimplemented!() }
//!
//! # fn example() -> Result<(), stream_scan::ScanError> {
//! let controller = ProcessorController::builder()
//!     .locator("rtsp://192.168.0.80")
//!     .decoder_arc(backend())
//!     .build()?;
//!
//! let events = controller.state().subscribe();
//! controller.start()?;
//! for event in events.iter() {
//!     if let ProcessorEvent::RecognizedCode(code) = event {
//!         println!("{code}");
//!         break;
//!     }
//! }
//! controller.stop()?;
//! # Ok(())
//! # }
//! ```

pub mod capture;
pub mod config;
pub mod core;
pub mod error;
pub mod processing;
pub mod session;

/// Re-export error types for convenience
pub use error::{HasRecoverySuggestion, Recoverable, ScanError, ScanResult};

pub use config::ScanConfig;
pub use session::{ProcessorController, ProcessorEvent, ProcessorState, Status};
