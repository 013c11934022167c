//! # Configuration Module
//!
//! Run settings and their defaults.

pub mod config;

pub use config::{
    DEFAULT_CLEAR_CYCLE, DEFAULT_DUPLICATE_FILTER, DEFAULT_LOCATOR, DEFAULT_RECONNECT_DELAY,
    ScanConfig,
};
