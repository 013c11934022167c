//! # Processor Controller
//!
//! Lifecycle facade over one background [`StreamProcessor`]. The controller
//! owns the live settings, the worker thread and the observable
//! [`ProcessorState`]. All methods take `&self`, so a controller can be shared
//! behind an `Arc` between a UI or signal handler and the code that reads state.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use stream_scan::session::ProcessorController;
//! # fn backend() -> Arc<dyn stream_scan::capture::DecoderBackend> { unimplemented!() }
//!
//! let controller = ProcessorController::builder()
//!     .locator("rtsp://10.0.0.4/live")
//!     .decoder_arc(backend())
//!     .build()?;
//! controller.start()?;
//! // ...
//! controller.stop()?;
//! # Ok::<(), stream_scan::error::ScanError>(())
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{info, warn};

use super::processor::StreamProcessor;
use super::state::{ProcessorState, Status, StopSignal};
use crate::capture::{ByteStreamOpener, DecoderBackend, HttpStreamOpener};
use crate::config::ScanConfig;
use crate::error::{ScanError, ScanResult};
use crate::processing::{EngineProvider, ProbeEngineProvider};

const WORKER_NAME: &str = "stream-processor";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct Worker {
    stop: StopSignal,
    handle: JoinHandle<ScanResult<()>>,
}

impl Worker {
    fn is_alive(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Waits for the thread. A run that ended on an error has already
    /// published it, so only a panic is reported here.
    fn join(self) -> ScanResult<()> {
        match self.handle.join() {
            Ok(_) => Ok(()),
            Err(_) => Err(ScanError::worker("stream processor thread panicked")),
        }
    }
}

pub struct ProcessorController {
    defaults: ScanConfig,
    config: Mutex<ScanConfig>,
    backend: Arc<dyn DecoderBackend>,
    streams: Arc<dyn ByteStreamOpener>,
    engines: Arc<dyn EngineProvider>,
    state: Arc<ProcessorState>,
    worker: Mutex<Option<Worker>>,
}

impl ProcessorController {
    pub fn builder() -> ProcessorControllerBuilder {
        ProcessorControllerBuilder::new()
    }

    /// Starts a run with a snapshot of the current settings.
    ///
    /// Returns `Ok(false)` without doing anything when a run is already in
    /// progress. A worker that ended on its own is joined first.
    pub fn start(&self) -> ScanResult<bool> {
        let mut worker = lock(&self.worker);
        // A worker past its exit guard is no longer running even if the
        // thread has not returned yet
        if worker.as_ref().is_some_and(Worker::is_alive) && self.state.is_running() {
            return Ok(false);
        }
        if let Some(stale) = worker.take() {
            if let Err(e) = stale.join() {
                warn!(error = %e, "Previous stream processor ended abnormally");
            }
        }

        let config = lock(&self.config).clone();
        config.validate()?;

        self.state.begin_run();
        let stop = StopSignal::new();
        let mut processor = StreamProcessor::new(
            config,
            Arc::clone(&self.backend),
            Arc::clone(&self.streams),
            Arc::clone(&self.engines),
            Arc::clone(&self.state),
            stop.clone(),
        );
        let handle = thread::Builder::new()
            .name(WORKER_NAME.to_string())
            .spawn(move || processor.run())
            .map_err(|e| {
                self.state.finish(Status::Stopped);
                ScanError::worker(format!("failed to spawn {WORKER_NAME}: {e}"))
            })?;

        info!(locator = %lock(&self.config).locator, "Stream processor started");
        *worker = Some(Worker { stop, handle });
        Ok(true)
    }

    /// Stops the current run and waits for the worker to exit.
    ///
    /// Does nothing when no run is active. Waiting is bounded by one blocking
    /// frame grab plus one engine submission.
    pub fn stop(&self) -> ScanResult<()> {
        let mut worker = lock(&self.worker);
        let Some(current) = worker.take() else {
            return Ok(());
        };
        self.state.mark_stopping();
        current.stop.request();
        current.join()
    }

    /// Signals the current run to stop without waiting for it.
    pub fn request_stop(&self) {
        let worker = lock(&self.worker);
        if let Some(current) = worker.as_ref() {
            self.state.mark_stopping();
            current.stop.request();
        }
    }

    /// Stops a running processor, starts an idle one. Returns whether a run is
    /// active afterwards.
    pub fn toggle(&self) -> ScanResult<bool> {
        if self.is_running() {
            self.stop()?;
            Ok(false)
        } else {
            self.start()
        }
    }

    /// Restores the settings the controller was built with. An active run
    /// keeps the settings it started with.
    pub fn reset(&self) {
        *lock(&self.config) = self.defaults.clone();
    }

    pub fn set_locator(&self, locator: impl Into<String>) {
        lock(&self.config).locator = locator.into();
    }

    pub fn set_credential(&self, credential: impl Into<String>) {
        lock(&self.config).credential = credential.into();
    }

    /// Snapshot of the settings the next run will use.
    pub fn config(&self) -> ScanConfig {
        lock(&self.config).clone()
    }

    pub fn state(&self) -> Arc<ProcessorState> {
        Arc::clone(&self.state)
    }

    pub fn is_running(&self) -> bool {
        self.state.is_running()
    }

    pub fn status(&self) -> Status {
        self.state.status()
    }

    pub fn recognized_code(&self) -> Option<String> {
        self.state.recognized_code()
    }
}

impl Drop for ProcessorController {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!(error = %e, "Stream processor did not shut down cleanly");
        }
    }
}

/// Builder for [`ProcessorController`].
///
/// A decoder backend is required. Byte streams default to
/// [`HttpStreamOpener`], engines to [`ProbeEngineProvider`].
#[derive(Default)]
pub struct ProcessorControllerBuilder {
    config: ScanConfig,
    backend: Option<Arc<dyn DecoderBackend>>,
    streams: Option<Arc<dyn ByteStreamOpener>>,
    engines: Option<Arc<dyn EngineProvider>>,
}

impl ProcessorControllerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: ScanConfig) -> Self {
        self.config = config;
        self
    }

    pub fn locator(mut self, locator: impl Into<String>) -> Self {
        self.config.locator = locator.into();
        self
    }

    pub fn credential(mut self, credential: impl Into<String>) -> Self {
        self.config.credential = credential.into();
        self
    }

    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.config.reconnect_delay = delay;
        self
    }

    pub fn session_clear_cycle(mut self, cycle: u32) -> Self {
        self.config.session_clear_cycle = cycle;
        self
    }

    pub fn decoder<D: DecoderBackend + 'static>(self, backend: D) -> Self {
        self.decoder_arc(Arc::new(backend))
    }

    pub fn decoder_arc(mut self, backend: Arc<dyn DecoderBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn byte_streams<S: ByteStreamOpener + 'static>(mut self, streams: S) -> Self {
        self.streams = Some(Arc::new(streams));
        self
    }

    pub fn engine_provider<E: EngineProvider + 'static>(mut self, engines: E) -> Self {
        self.engines = Some(Arc::new(engines));
        self
    }

    pub fn engine_provider_arc(mut self, engines: Arc<dyn EngineProvider>) -> Self {
        self.engines = Some(engines);
        self
    }

    pub fn build(self) -> ScanResult<ProcessorController> {
        self.config.validate()?;
        let backend = self.backend.ok_or_else(|| {
            ScanError::config("decoder", "none", "a decoder backend is required")
                .with_recovery_suggestion("build with the `gst` feature or supply a backend")
        })?;
        let streams = self
            .streams
            .unwrap_or_else(|| Arc::new(HttpStreamOpener::new()));
        let engines = self
            .engines
            .unwrap_or_else(|| Arc::new(ProbeEngineProvider));

        Ok(ProcessorController {
            defaults: self.config.clone(),
            config: Mutex::new(self.config),
            backend,
            streams,
            engines,
            state: Arc::new(ProcessorState::new()),
            worker: Mutex::new(None),
        })
    }
}
