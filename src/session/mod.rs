//! # Session Management
//!
//! Background processing lifecycle: the reconnecting [`StreamProcessor`], the
//! [`ProcessorController`] facade that runs it on a worker thread, and the
//! [`ProcessorState`] callers observe.

pub mod controller;
pub mod processor;
pub mod state;

pub use controller::{ProcessorController, ProcessorControllerBuilder};
pub use processor::StreamProcessor;
pub use state::{ProcessorEvent, ProcessorState, ProcessorStats, Status, StopSignal};
