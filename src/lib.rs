//! Onset detection over named in-memory audio buffers.
//!
//! A host keeps sample buffers in a [`BufferStore`], binds an
//! [`AnalysisController`] to one of them by name and triggers runs. Each run
//! locks the buffer, walks its first channel hop by hop through an onset
//! detector and publishes the onset times (ms) followed by a done event.
//!
//! ```no_run
//! use std::sync::Arc;
//! use bufonset::{AnalysisController, BufferData, BufferRegistry, ParameterStore};
//!
//! let registry = Arc::new(BufferRegistry::new());
//! registry.insert("drumloop", BufferData::new(vec![0.0; 44100], 1, 44100));
//!
//! let controller = AnalysisController::new(registry, Arc::new(ParameterStore::new()));
//! controller.bind("drumloop");
//! let result = controller.run()?;
//! println!("{} onsets", result.onsets.len());
//! # Ok::<(), bufonset::AnalysisError>(())
//! ```

pub mod analysis;
pub mod buffer;
pub mod error;
pub mod onset;
pub mod params;
pub mod scheduler;

pub use analysis::{AnalysisController, AnalysisEvent, RunResult, RunState};
pub use buffer::{BufferData, BufferHandle, BufferRegistry, BufferStore};
pub use error::AnalysisError;
pub use onset::{OnsetDetector, OnsetMethod};
pub use params::{DetectionParameters, ParameterStore};
pub use scheduler::Scheduler;
