//! # Processing Module
//!
//! Recognition engine boundary and the per-connection recognition session.

pub mod probe;
pub mod recognition;

pub use probe::{ProbeEngine, ProbeEngineProvider};
pub use recognition::{
    EngineProvider, EngineSettings, RecognitionEngine, RecognitionSession, RecognizedCode,
    Symbology,
};
