//! Onset detection over a stream of fixed-size hops.
//!
//! [`OnsetDetector`] is what a run drives: it owns one [`OnsetAlgorithm`]
//! instance, configured once, fed hop by hop, and discarded afterwards.
//! The built-in algorithm is [`SpectralOnset`]; hosts and tests can plug in
//! their own through an [`AlgorithmFactory`].

pub mod descriptor;
pub mod peakpick;
pub mod pvoc;
pub mod spectral;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{AnalysisError, Result};

pub use spectral::SpectralOnset;

/// Onset detection functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnsetMethod {
    /// Complex-domain prediction error
    Complex,
    /// Spectral energy
    Energy,
    /// High-frequency content
    Hfc,
    /// Spectral difference
    SpecDiff,
    /// Phase deviation
    Phase,
    /// Kullback-Leibler distance
    Kl,
    /// Modified Kullback-Leibler distance
    Mkl,
}

impl OnsetMethod {
    pub const NAMES: [&'static str; 7] = ["complex", "energy", "hfc", "specdiff", "phase", "kl", "mkl"];

    pub fn name(self) -> &'static str {
        match self {
            OnsetMethod::Complex => "complex",
            OnsetMethod::Energy => "energy",
            OnsetMethod::Hfc => "hfc",
            OnsetMethod::SpecDiff => "specdiff",
            OnsetMethod::Phase => "phase",
            OnsetMethod::Kl => "kl",
            OnsetMethod::Mkl => "mkl",
        }
    }
}

impl Default for OnsetMethod {
    fn default() -> Self {
        OnsetMethod::Hfc
    }
}

impl fmt::Display for OnsetMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OnsetMethod {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "complex" => Ok(OnsetMethod::Complex),
            "energy" => Ok(OnsetMethod::Energy),
            "hfc" => Ok(OnsetMethod::Hfc),
            "specdiff" => Ok(OnsetMethod::SpecDiff),
            "phase" => Ok(OnsetMethod::Phase),
            "kl" => Ok(OnsetMethod::Kl),
            "mkl" => Ok(OnsetMethod::Mkl),
            other => Err(AnalysisError::UnsupportedMethod {
                method: other.to_string(),
            }),
        }
    }
}

/// Framing and rate an algorithm instance is built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DetectorSetup {
    pub window_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

/// A stateful onset detection algorithm consuming one hop per call.
pub trait OnsetAlgorithm: Send {
    fn set_threshold(&mut self, threshold: f32);
    fn set_silence_db(&mut self, silence_db: f32);
    fn set_min_ioi_ms(&mut self, min_ioi_ms: f64);

    /// Consume exactly one hop; `true` when an onset was accepted.
    fn process(&mut self, hop: &[f32]) -> bool;

    /// Time of the most recently accepted onset, in ms from the first hop,
    /// with the algorithm's reporting delay removed.
    fn last_onset_ms(&self) -> f64;
}

/// Builds a fresh algorithm instance for each run.
pub trait AlgorithmFactory: Send + Sync {
    fn create(&self, method: OnsetMethod, setup: &DetectorSetup) -> Box<dyn OnsetAlgorithm>;
}

/// Factory for the built-in [`SpectralOnset`] algorithm.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralFactory;

impl AlgorithmFactory for SpectralFactory {
    fn create(&self, method: OnsetMethod, setup: &DetectorSetup) -> Box<dyn OnsetAlgorithm> {
        Box::new(SpectralOnset::new(method, setup))
    }
}

/// Single-use onset detector for one pass over one buffer.
pub struct OnsetDetector {
    method: OnsetMethod,
    setup: DetectorSetup,
    algorithm: Box<dyn OnsetAlgorithm>,
}

impl OnsetDetector {
    /// Build the algorithm state for `method`.
    pub fn initialize(
        factory: &dyn AlgorithmFactory,
        method: &str,
        setup: DetectorSetup,
    ) -> Result<Self> {
        let method: OnsetMethod = method.parse()?;
        if setup.hop_size == 0 || setup.window_size < setup.hop_size {
            return Err(AnalysisError::InvalidSetup(format!(
                "window {} / hop {}",
                setup.window_size, setup.hop_size
            )));
        }
        if setup.sample_rate == 0 {
            return Err(AnalysisError::InvalidSetup("sample rate is zero".into()));
        }

        log::debug!(
            "Onset detector: method={}, window={}, hop={}, sr={}",
            method,
            setup.window_size,
            setup.hop_size,
            setup.sample_rate
        );
        Ok(Self {
            method,
            setup,
            algorithm: factory.create(method, &setup),
        })
    }

    /// Apply sensitivity parameters; call before the first hop.
    pub fn configure(&mut self, threshold: f32, silence_db: f32, min_ioi_ms: f64) {
        self.algorithm.set_threshold(threshold);
        self.algorithm.set_silence_db(silence_db);
        self.algorithm.set_min_ioi_ms(min_ioi_ms);
    }

    /// Feed one hop. Returns the onset time in ms when this hop produced an
    /// accepted onset.
    pub fn process_hop(&mut self, hop: &[f32]) -> Option<f64> {
        debug_assert_eq!(hop.len(), self.setup.hop_size);
        if self.algorithm.process(hop) {
            Some(self.algorithm.last_onset_ms())
        } else {
            None
        }
    }

    pub fn method(&self) -> OnsetMethod {
        self.method
    }

    pub fn setup(&self) -> DetectorSetup {
        self.setup
    }
}
