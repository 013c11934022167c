//! # Observable Processor State
//!
//! State written by the worker thread and read by callers. Scalar fields are
//! atomics, text fields sit behind short-lived mutexes, and every change that a
//! caller may want to react to is also sent as a [`ProcessorEvent`] to each
//! subscriber.
//!
//! Callers only read; all setters are crate-private.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossbeam_channel::{Receiver, Sender, unbounded};

/// Lifecycle status of the processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Status {
    Idle = 0,
    Starting = 1,
    Streaming = 2,
    Stopping = 3,
    /// The last stream ended; a reconnect follows while running
    Done = 4,
    Stopped = 5,
}

impl Status {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Starting,
            2 => Self::Streaming,
            3 => Self::Stopping,
            4 => Self::Done,
            5 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Starting => "starting",
            Self::Streaming => "streaming",
            Self::Stopping => "stopping",
            Self::Done => "done",
            Self::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Change notifications delivered to subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessorEvent {
    Status(Status),
    RecognizedCode(String),
    /// A run ended on a fatal error
    Failed(String),
}

/// Counters for the current run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    pub frames_submitted: u64,
    pub frames_skipped: u64,
    pub connection_attempts: u64,
    pub session_clears: u64,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug)]
pub struct ProcessorState {
    running: AtomicBool,
    status: AtomicU8,
    recognized_code: Mutex<Option<String>>,
    last_error: Mutex<Option<String>>,
    frames_submitted: AtomicU64,
    frames_skipped: AtomicU64,
    connection_attempts: AtomicU64,
    session_clears: AtomicU64,
    subscribers: Mutex<Vec<Sender<ProcessorEvent>>>,
}

impl Default for ProcessorState {
    fn default() -> Self {
        Self {
            running: AtomicBool::new(false),
            status: AtomicU8::new(Status::Idle as u8),
            recognized_code: Mutex::new(None),
            last_error: Mutex::new(None),
            frames_submitted: AtomicU64::new(0),
            frames_skipped: AtomicU64::new(0),
            connection_attempts: AtomicU64::new(0),
            session_clears: AtomicU64::new(0),
            subscribers: Mutex::new(Vec::new()),
        }
    }
}

impl ProcessorState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn status(&self) -> Status {
        Status::from_u8(self.status.load(Ordering::Acquire))
    }

    /// Last code newly recognized during the current run.
    pub fn recognized_code(&self) -> Option<String> {
        lock(&self.recognized_code).clone()
    }

    /// Error that ended the last run, or the latest connection failure.
    pub fn last_error(&self) -> Option<String> {
        lock(&self.last_error).clone()
    }

    pub fn stats(&self) -> ProcessorStats {
        ProcessorStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            frames_skipped: self.frames_skipped.load(Ordering::Relaxed),
            connection_attempts: self.connection_attempts.load(Ordering::Relaxed),
            session_clears: self.session_clears.load(Ordering::Relaxed),
        }
    }

    /// Receives every event published after this call.
    pub fn subscribe(&self) -> Receiver<ProcessorEvent> {
        let (tx, rx) = unbounded();
        lock(&self.subscribers).push(tx);
        rx
    }

    fn publish(&self, event: ProcessorEvent) {
        lock(&self.subscribers).retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Marks a new run: running, status Starting, counters and results cleared.
    pub(crate) fn begin_run(&self) {
        *lock(&self.recognized_code) = None;
        *lock(&self.last_error) = None;
        self.frames_submitted.store(0, Ordering::Relaxed);
        self.frames_skipped.store(0, Ordering::Relaxed);
        self.connection_attempts.store(0, Ordering::Relaxed);
        self.session_clears.store(0, Ordering::Relaxed);
        self.running.store(true, Ordering::Release);
        self.set_status(Status::Starting);
    }

    fn set_status(&self, status: Status) {
        let previous = self.status.swap(status as u8, Ordering::AcqRel);
        if previous != status as u8 {
            self.publish(ProcessorEvent::Status(status));
        }
    }

    /// Moves to `target` unless the current status is one of `blocked`.
    ///
    /// The compare-exchange loop keeps a concurrent transition by the other
    /// thread from being overwritten.
    fn transition(&self, target: Status, blocked: &[Status]) -> bool {
        let mut current = self.status.load(Ordering::Acquire);
        loop {
            if current == target as u8 || blocked.contains(&Status::from_u8(current)) {
                return false;
            }
            match self.status.compare_exchange_weak(
                current,
                target as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => {
                    self.publish(ProcessorEvent::Status(target));
                    return true;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Worker progress (Streaming, Done). Never leaves Stopping or Stopped.
    pub(crate) fn advance(&self, status: Status) -> bool {
        self.transition(status, &[Status::Stopping, Status::Stopped])
    }

    /// Moves to Stopping unless the run has already reached Idle or Stopped.
    pub(crate) fn mark_stopping(&self) -> bool {
        self.transition(Status::Stopping, &[Status::Idle, Status::Stopped])
    }

    /// Publishes the terminal status, then clears the running flag.
    pub(crate) fn finish(&self, status: Status) {
        self.set_status(status);
        self.running.store(false, Ordering::Release);
    }

    pub(crate) fn publish_code(&self, code: &str) {
        *lock(&self.recognized_code) = Some(code.to_string());
        self.publish(ProcessorEvent::RecognizedCode(code.to_string()));
    }

    pub(crate) fn record_error(&self, error: &str) {
        *lock(&self.last_error) = Some(error.to_string());
    }

    pub(crate) fn record_failure(&self, error: &str) {
        self.record_error(error);
        self.publish(ProcessorEvent::Failed(error.to_string()));
    }

    pub(crate) fn record_submitted(&self) {
        self.frames_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_skipped(&self) {
        self.frames_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connection_attempt(&self) {
        self.connection_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_clear(&self) {
        self.session_clears.fetch_add(1, Ordering::Relaxed);
    }
}

/// Cooperative stop flag shared between the controller and one worker.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state() {
        let state = ProcessorState::new();
        assert!(!state.is_running());
        assert_eq!(state.status(), Status::Idle);
        assert_eq!(state.recognized_code(), None);
        assert_eq!(state.stats(), ProcessorStats::default());
    }

    #[test]
    fn test_run_lifecycle_events() {
        let state = ProcessorState::new();
        let events = state.subscribe();

        state.begin_run();
        assert!(state.is_running());
        assert!(state.advance(Status::Streaming));
        state.publish_code("https://example.org");
        // Same status twice publishes once
        assert!(!state.advance(Status::Streaming));
        state.finish(Status::Stopped);

        assert!(!state.is_running());
        assert_eq!(state.recognized_code().as_deref(), Some("https://example.org"));
        let received: Vec<_> = events.try_iter().collect();
        assert_eq!(
            received,
            vec![
                ProcessorEvent::Status(Status::Starting),
                ProcessorEvent::Status(Status::Streaming),
                ProcessorEvent::RecognizedCode("https://example.org".into()),
                ProcessorEvent::Status(Status::Stopped),
            ]
        );
    }

    #[test]
    fn test_mark_stopping_never_overrides_terminal() {
        let state = ProcessorState::new();
        assert!(!state.mark_stopping());
        assert_eq!(state.status(), Status::Idle);

        state.advance(Status::Streaming);
        assert!(state.mark_stopping());
        assert!(!state.mark_stopping());
        assert_eq!(state.status(), Status::Stopping);

        state.finish(Status::Stopped);
        assert!(!state.mark_stopping());
        assert_eq!(state.status(), Status::Stopped);
    }

    #[test]
    fn test_worker_progress_never_leaves_stopping() {
        let state = ProcessorState::new();
        state.begin_run();
        let events = state.subscribe();
        assert!(state.mark_stopping());

        // An open or end-of-stream that completes after stop was requested
        assert!(!state.advance(Status::Streaming));
        assert!(!state.advance(Status::Done));
        assert_eq!(state.status(), Status::Stopping);

        state.finish(Status::Stopped);
        assert!(!state.advance(Status::Streaming));
        assert_eq!(state.status(), Status::Stopped);
        assert_eq!(
            events.try_iter().collect::<Vec<_>>(),
            vec![
                ProcessorEvent::Status(Status::Stopping),
                ProcessorEvent::Status(Status::Stopped),
            ]
        );
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let state = ProcessorState::new();
        drop(state.subscribe());
        let live = state.subscribe();
        state.set_status(Status::Starting);
        assert_eq!(live.try_recv(), Ok(ProcessorEvent::Status(Status::Starting)));
        assert_eq!(lock(&state.subscribers).len(), 1);
    }

    #[test]
    fn test_begin_run_resets_results() {
        let state = ProcessorState::new();
        state.publish_code("old");
        state.record_failure("engine crashed");
        state.record_submitted();
        state.begin_run();
        assert_eq!(state.recognized_code(), None);
        assert_eq!(state.last_error(), None);
        assert_eq!(state.stats().frames_submitted, 0);
    }

    #[test]
    fn test_stop_signal_shared() {
        let signal = StopSignal::new();
        let clone = signal.clone();
        assert!(!clone.is_requested());
        signal.request();
        assert!(clone.is_requested());
    }
}
