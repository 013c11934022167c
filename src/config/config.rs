//! # Configuration Module
//!
//! Settings for a scanning run. A [`ScanConfig`] is snapshotted by the controller
//! when a run starts, so edits made while streaming only affect the next run.
//!
//! ## Configuration Parameters
//!
//! | Parameter | Type | Default | Description |
//! |-----------|------|---------|-------------|
//! | `locator` | `String` | `rtsp://192.168.0.80` | Stream URL or local file path |
//! | `credential` | `String` | empty | Recognition engine license key |
//! | `reconnect_delay` | `Duration` | 1s | Pause between connection attempts |
//! | `session_clear_cycle` | `u32` | 4096 | Frames between session clears (power of two) |
//! | `duplicate_filter` | `Duration` | 5000ms | Engine-side duplicate suppression window |
//! | `symbologies` | `Vec<Symbology>` | `[Qr]` | Symbologies enabled on the engine |
//!
//! ## Examples
//!
//! ```rust
//! use stream_scan::config::ScanConfig;
//!
//! let config = ScanConfig::default().with_locator("rtsp://10.0.0.4/live");
//! assert!(config.validate().is_ok());
//! assert_eq!(config.clear_mask(), 0xfff);
//! ```

use std::time::Duration;

use crate::error::{ScanError, ScanResult};
use crate::processing::recognition::{EngineSettings, Symbology};

pub const DEFAULT_LOCATOR: &str = "rtsp://192.168.0.80";
pub const DEFAULT_CLEAR_CYCLE: u32 = 4096;
pub const DEFAULT_DUPLICATE_FILTER: Duration = Duration::from_millis(5000);
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Configuration for one scanning run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanConfig {
    /// Source locator: `rtsp://...`, `http(s)://...`, or a local path.
    pub locator: String,

    /// Credential handed to the recognition engine provider.
    pub credential: String,

    /// Pause between connection attempts. Slept in short slices so a stop
    /// request is still observed promptly. Zero is allowed.
    pub reconnect_delay: Duration,

    /// Number of submitted frames between two clears of the engine session.
    ///
    /// Must be a non-zero power of two; the session tests `counter & (cycle - 1)`.
    pub session_clear_cycle: u32,

    pub duplicate_filter: Duration,

    pub symbologies: Vec<Symbology>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            locator: DEFAULT_LOCATOR.to_string(),
            credential: String::new(),
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            session_clear_cycle: DEFAULT_CLEAR_CYCLE,
            duplicate_filter: DEFAULT_DUPLICATE_FILTER,
            symbologies: vec![Symbology::Qr],
        }
    }
}

impl ScanConfig {
    pub fn with_locator(mut self, locator: impl Into<String>) -> Self {
        self.locator = locator.into();
        self
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = credential.into();
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    pub fn with_session_clear_cycle(mut self, cycle: u32) -> Self {
        self.session_clear_cycle = cycle;
        self
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> ScanResult<()> {
        if self.locator.trim().is_empty() {
            return Err(ScanError::config(
                "locator",
                &self.locator,
                "must not be empty",
            ));
        }
        if !self.session_clear_cycle.is_power_of_two() {
            return Err(ScanError::config(
                "session_clear_cycle",
                self.session_clear_cycle.to_string(),
                "must be a non-zero power of two",
            )
            .with_recovery_suggestion("use 4096 or another power of two"));
        }
        if self.symbologies.is_empty() {
            return Err(ScanError::config(
                "symbologies",
                "[]",
                "at least one symbology must be enabled",
            ));
        }
        Ok(())
    }

    /// Mask applied to the session cycle counter.
    pub fn clear_mask(&self) -> u32 {
        self.session_clear_cycle.saturating_sub(1)
    }

    /// Settings handed to the engine provider when a run starts.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            credential: self.credential.clone(),
            symbologies: self.symbologies.clone(),
            duplicate_filter: self.duplicate_filter,
        }
    }
}
