//! The offline analysis run: framing, level diagnostics, result collection
//! and the controller tying them to a buffer and a detector.

pub mod accumulator;
pub mod controller;
pub mod diagnostics;
pub mod framer;

pub use accumulator::{AppendOutcome, ResultAccumulator, RunResult, DEFAULT_MAX_ONSETS};
pub use controller::{AnalysisController, AnalysisEvent, RunState, DEFAULT_WINDOW_SIZE};
pub use diagnostics::LevelDiagnostics;
pub use framer::{Framer, Overlap};
