//! # Stream Processor
//!
//! The connect → stream → reconnect loop run on the worker thread.
//!
//! ```text
//! Idle ──▶ Connecting ──▶ Streaming ──▶ EndOfStream ──▶ Connecting (while running)
//!              │  ▲            │
//!              │  └─ back-off ─┤ connection error
//!              ▼               ▼
//!           Stopped ◀── stop request / decode or engine failure
//! ```
//!
//! Stopping is cooperative: the stop signal is polled once per frame, so a
//! stop waits for at most one blocking grab plus one engine submission.
//! Whatever way the loop ends, including a panic, the observable state ends up
//! with `running == false` and a terminal status.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, info, warn};

use super::state::{ProcessorState, Status, StopSignal};
use crate::capture::{ByteStreamOpener, DecoderBackend, VideoSource, VideoSourceDescriptor};
use crate::config::ScanConfig;
use crate::core::{FrameBuffer, FrameDescriptor};
use crate::error::{HasRecoverySuggestion, Recoverable, ScanError, ScanResult};
use crate::processing::{EngineProvider, RecognitionEngine, RecognitionSession};

/// Longest uninterrupted sleep during back-off.
const BACKOFF_SLICE: Duration = Duration::from_millis(50);

/// Why streaming from one source ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    EndOfStream,
    StopRequested,
}

/// Publishes the terminal state when the worker leaves `run`.
struct ExitGuard {
    state: Arc<ProcessorState>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            self.state.record_failure("stream processor panicked");
        }
        self.state.finish(Status::Stopped);
    }
}

pub struct StreamProcessor {
    config: ScanConfig,
    backend: Arc<dyn DecoderBackend>,
    streams: Arc<dyn ByteStreamOpener>,
    engines: Arc<dyn EngineProvider>,
    state: Arc<ProcessorState>,
    stop: StopSignal,
    buffer: FrameBuffer,
}

impl StreamProcessor {
    pub fn new(
        config: ScanConfig,
        backend: Arc<dyn DecoderBackend>,
        streams: Arc<dyn ByteStreamOpener>,
        engines: Arc<dyn EngineProvider>,
        state: Arc<ProcessorState>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            backend,
            streams,
            engines,
            state,
            stop,
            buffer: FrameBuffer::new(),
        }
    }

    /// Frame buffer reused across every connection of this processor.
    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    /// Runs until a stop is requested or a fatal error occurs.
    ///
    /// Fatal errors are recorded on the state (last error, `Failed` event)
    /// before being returned.
    pub fn run(&mut self) -> ScanResult<()> {
        let _guard = ExitGuard {
            state: Arc::clone(&self.state),
        };
        let result = self.run_loop();
        match &result {
            Ok(()) => info!(stats = ?self.state.stats(), "Stream processor stopped"),
            Err(e) => {
                error!(error = %e, category = e.category(), "Stream processor failed");
                self.state.record_failure(&e.to_string());
            }
        }
        result
    }

    fn run_loop(&mut self) -> ScanResult<()> {
        self.config.validate()?;
        let mut engine = self
            .engines
            .create(&self.config.engine_settings())
            .map_err(|e| ScanError::engine("create", format!("{e:#}")))?;
        let clear_mask = self.config.clear_mask();

        while !self.stop.is_requested() {
            self.state.record_connection_attempt();
            let descriptor = VideoSourceDescriptor::parse(&self.config.locator);
            let source =
                match VideoSource::open(descriptor, self.backend.as_ref(), self.streams.as_ref()) {
                    Ok(source) => source,
                    Err(e) if e.is_recoverable() => {
                        warn!(
                            error = %e,
                            suggestion = e.recovery_suggestion().unwrap_or("-"),
                            delay = ?self.config.reconnect_delay,
                            "Connection failed, retrying"
                        );
                        self.state.record_error(&e.to_string());
                        self.back_off();
                        continue;
                    }
                    Err(e) => return Err(e),
                };

            match self.stream(source, engine.as_mut(), clear_mask)? {
                StreamEnd::StopRequested => break,
                StreamEnd::EndOfStream => {
                    info!(locator = %self.config.locator, "End of stream");
                    self.state.advance(Status::Done);
                    self.back_off();
                }
            }
        }
        Ok(())
    }

    /// Pulls frames from one opened source until it ends or a stop is seen.
    ///
    /// The source is closed and the session cleared on every return path.
    fn stream(
        &mut self,
        mut source: VideoSource,
        engine: &mut dyn RecognitionEngine,
        clear_mask: u32,
    ) -> ScanResult<StreamEnd> {
        let descriptor = FrameDescriptor::from_stream(source.info());
        let mut session = RecognitionSession::begin(engine, clear_mask)?;
        self.state.advance(Status::Streaming);

        let end = loop {
            if self.stop.is_requested() {
                break StreamEnd::StopRequested;
            }
            let Some(frame) = source.grab_frame()? else {
                break StreamEnd::EndOfStream;
            };
            if frame.is_empty() {
                self.state.record_skipped();
                continue;
            }

            let payload = self.buffer.copy_from(frame.data);
            let clears = session.clears();
            let codes = session.submit(&descriptor.with_memory_size(payload.len()), payload)?;
            self.state.record_submitted();
            if session.clears() > clears {
                self.state.record_clear();
            }

            for code in &codes {
                info!(payload = %code.payload, symbology = ?code.symbology, "Recognized code");
            }
            if let Some(last) = codes.last() {
                self.state.publish_code(&last.payload);
            }
        };

        debug!(frames = session.cycle(), end = ?end, "Closing video source");
        drop(session);
        source.close();
        Ok(end)
    }

    /// Sleeps for the reconnect delay, waking early on a stop request.
    fn back_off(&self) {
        let deadline = Instant::now() + self.config.reconnect_delay;
        loop {
            if self.stop.is_requested() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            thread::sleep(BACKOFF_SLICE.min(deadline - now));
        }
    }
}
