//! # Error Handling
//!
//! Error taxonomy for the streaming and recognition loop. Every error carries an
//! [`ErrorContext`] with a timestamp, optional operation/context text and a
//! recovery suggestion, so the stream processor can decide between
//! reconnecting and terminating a run without string matching.
//!
//! ## Error Classification
//!
//! - `Recoverable`: the run can continue after the failure (reconnect)
//! - everything else ends the run and publishes a terminal status
//!
//! ## Usage
//!
//! ```rust
//! use stream_scan::error::{Recoverable, ScanError};
//!
//! let error = ScanError::connection("rtsp://10.0.0.4/live", "connection refused")
//!     .with_recovery_suggestion("check that the camera is reachable");
//! assert!(error.is_recoverable());
//!
//! let fatal = ScanError::engine("process_frame", "license expired");
//! assert!(!fatal.is_recoverable());
//! ```

use std::time::SystemTime;

use thiserror::Error;

/// Metadata about when and where an error occurred
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub timestamp: SystemTime,
    /// The operation being performed when the error occurred
    pub operation: Option<String>,
    pub context: Option<String>,
    pub recovery_suggestion: Option<String>,
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self {
            timestamp: SystemTime::now(),
            operation: None,
            context: None,
            recovery_suggestion: None,
        }
    }
}

impl ErrorContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Base error type for the stream scanner
#[derive(Debug, Error)]
pub enum ScanError {
    /// Configuration validation errors
    #[error("configuration error in '{field}': {reason} (value: {value})")]
    Config {
        field: String,
        value: String,
        reason: String,
        context: ErrorContext,
    },
    /// The video source could not be opened or started
    #[error("failed to open video source {locator}: {reason}")]
    Connection {
        locator: String,
        reason: String,
        context: ErrorContext,
    },
    /// The decoder failed while streaming
    #[error("decoding failed: {reason}")]
    Decode { reason: String, context: ErrorContext },
    /// The recognition engine failed
    #[error("recognition engine failed during {operation}: {reason}")]
    Engine {
        operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// Releasing a resource failed. Logged, never escalated.
    #[error("failed to release {resource}: {reason}")]
    Release {
        resource: String,
        reason: String,
        context: ErrorContext,
    },
    /// Invalid lifecycle transitions
    #[error("invalid transition from '{current_state}' when attempting '{attempted_operation}': {reason}")]
    State {
        current_state: String,
        attempted_operation: String,
        reason: String,
        context: ErrorContext,
    },
    /// The worker thread could not be spawned or did not exit cleanly
    #[error("worker failure: {reason}")]
    Worker { reason: String, context: ErrorContext },
}

impl ScanError {
    pub fn config(
        field: impl Into<String>,
        value: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Config {
            field: field.into(),
            value: value.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn connection(locator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Connection {
            locator: locator.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn decode(reason: impl Into<String>) -> Self {
        Self::Decode {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn engine(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Engine {
            operation: operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn release(resource: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Release {
            resource: resource.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn state(
        current_state: impl Into<String>,
        attempted_operation: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::State {
            current_state: current_state.into(),
            attempted_operation: attempted_operation.into(),
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    pub fn worker(reason: impl Into<String>) -> Self {
        Self::Worker {
            reason: reason.into(),
            context: ErrorContext::new(),
        }
    }

    /// Add context to the error
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context_mut().context = Some(context.into());
        self
    }

    /// Add operation context
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.context_mut().operation = Some(operation.into());
        self
    }

    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.context_mut().recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Get the error context
    pub fn context(&self) -> &ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::Connection { context, .. }
            | Self::Decode { context, .. }
            | Self::Engine { context, .. }
            | Self::Release { context, .. }
            | Self::State { context, .. }
            | Self::Worker { context, .. } => context,
        }
    }

    fn context_mut(&mut self) -> &mut ErrorContext {
        match self {
            Self::Config { context, .. }
            | Self::Connection { context, .. }
            | Self::Decode { context, .. }
            | Self::Engine { context, .. }
            | Self::Release { context, .. }
            | Self::State { context, .. }
            | Self::Worker { context, .. } => context,
        }
    }

    /// Get the error category as a string
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config { .. } => "config",
            Self::Connection { .. } => "connection",
            Self::Decode { .. } => "decode",
            Self::Engine { .. } => "engine",
            Self::Release { .. } => "release",
            Self::State { .. } => "state",
            Self::Worker { .. } => "worker",
        }
    }
}

/// Result type alias using our custom error type
pub type ScanResult<T> = Result<T, ScanError>;

/// Trait for errors the current run can continue after
pub trait Recoverable {
    fn is_recoverable(&self) -> bool;
}

impl Recoverable for ScanError {
    fn is_recoverable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Release { .. })
    }
}

pub trait HasRecoverySuggestion {
    fn recovery_suggestion(&self) -> Option<&str>;
}

impl HasRecoverySuggestion for ScanError {
    fn recovery_suggestion(&self) -> Option<&str> {
        self.context().recovery_suggestion.as_deref()
    }
}
