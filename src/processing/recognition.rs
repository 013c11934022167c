//! # Recognition Boundary
//!
//! The barcode engine is an external collaborator. It is created once per run
//! through an [`EngineProvider`], receives frames through a
//! [`RecognitionSession`], and keeps its own duplicate-suppression state which
//! the session clears periodically.
//!
//! ## Clear cycle
//!
//! The session counts submitted frames. After each submission the counter is
//! incremented, and when `counter & mask == 0` the engine state is cleared.
//! With the default mask of `0xfff` that is after frames 4096, 8192, ...
//! A fresh session never clears before its first frame.

use std::fmt;
use std::time::Duration;

use anyhow::Result;
use tracing::debug;

use crate::core::FrameDescriptor;
use crate::error::{ScanError, ScanResult};

/// Barcode symbologies an engine can be asked to look for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Symbology {
    Qr,
    DataMatrix,
    Aztec,
    Pdf417,
    Ean13,
    Code128,
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Qr => "qr",
            Self::DataMatrix => "data-matrix",
            Self::Aztec => "aztec",
            Self::Pdf417 => "pdf417",
            Self::Ean13 => "ean13",
            Self::Code128 => "code128",
        };
        f.write_str(name)
    }
}

/// A code the engine reports as newly recognized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecognizedCode {
    pub payload: String,
    pub symbology: Option<Symbology>,
}

impl RecognizedCode {
    pub fn new(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            symbology: None,
        }
    }

    pub fn with_symbology(mut self, symbology: Symbology) -> Self {
        self.symbology = Some(symbology);
        self
    }
}

/// Settings handed to the engine provider when a run starts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineSettings {
    pub credential: String,
    pub symbologies: Vec<Symbology>,
    /// Window in which the engine suppresses repeated reports of one code
    pub duplicate_filter: Duration,
}

/// An external barcode recognition engine.
pub trait RecognitionEngine: Send {
    /// Starts a new frame sequence; called once per connection.
    fn begin_sequence(&mut self) -> Result<()> {
        Ok(())
    }

    /// Processes one frame and returns the codes newly recognized in it, in
    /// engine order. May be empty.
    fn process_frame(
        &mut self,
        descriptor: &FrameDescriptor,
        payload: &[u8],
    ) -> Result<Vec<RecognizedCode>>;

    /// Drops accumulated recognition state.
    fn clear(&mut self) -> Result<()>;
}

/// Creates engines for runs.
pub trait EngineProvider: Send + Sync {
    fn create(&self, settings: &EngineSettings) -> Result<Box<dyn RecognitionEngine>>;
}

/// Frame submission with periodic clearing of the engine state.
///
/// Borrows the engine for one connection attempt and clears it on drop, so
/// state from a finished stream never leaks into the next one.
pub struct RecognitionSession<'e> {
    engine: &'e mut dyn RecognitionEngine,
    cycle: u64,
    mask: u64,
    clears: u64,
}

impl<'e> RecognitionSession<'e> {
    /// Starts a new frame sequence on the engine.
    ///
    /// `clear_mask` must be one less than a power of two.
    pub fn begin(engine: &'e mut dyn RecognitionEngine, clear_mask: u32) -> ScanResult<Self> {
        engine
            .begin_sequence()
            .map_err(|e| ScanError::engine("begin_sequence", format!("{e:#}")))?;
        Ok(Self {
            engine,
            cycle: 0,
            mask: u64::from(clear_mask),
            clears: 0,
        })
    }

    /// Submits one frame and returns its newly recognized codes.
    pub fn submit(
        &mut self,
        descriptor: &FrameDescriptor,
        payload: &[u8],
    ) -> ScanResult<Vec<RecognizedCode>> {
        let codes = self
            .engine
            .process_frame(descriptor, payload)
            .map_err(|e| ScanError::engine("process_frame", format!("{e:#}")))?;

        self.cycle += 1;
        if self.cycle & self.mask == 0 {
            self.engine
                .clear()
                .map_err(|e| ScanError::engine("clear", format!("{e:#}")))?;
            self.clears += 1;
            debug!(frames = self.cycle, clears = self.clears, "Cleared recognition session");
        }
        Ok(codes)
    }

    /// Frames submitted so far.
    pub fn cycle(&self) -> u64 {
        self.cycle
    }

    pub fn clears(&self) -> u64 {
        self.clears
    }
}

impl Drop for RecognitionSession<'_> {
    fn drop(&mut self) {
        if self.cycle == 0 {
            return;
        }
        if let Err(e) = self.engine.clear() {
            debug!(error = %format!("{e:#}"), "Failed to clear engine at end of session");
        }
    }
}
