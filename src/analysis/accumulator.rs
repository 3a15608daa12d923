use serde::Serialize;

use super::diagnostics::LevelDiagnostics;

/// Upper bound on onsets collected per run.
pub const DEFAULT_MAX_ONSETS: usize = 4096;

/// Result of [`ResultAccumulator::append`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Stored,
    /// The accumulator is full; the caller must stop appending.
    CapacityExceeded,
}

/// Finalized output of one analysis run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunResult {
    /// Onset times in milliseconds from buffer start, in detection order.
    pub onsets: Vec<f64>,
    pub diagnostics: LevelDiagnostics,
    /// Set when the run stopped early because capacity was reached.
    pub truncated: bool,
    pub hops_processed: usize,
}

/// Capacity-bounded, ordered collection of onset times for a single run.
#[derive(Debug)]
pub struct ResultAccumulator {
    onsets: Vec<f64>,
    capacity: usize,
    diagnostics: LevelDiagnostics,
    truncated: bool,
    hops_processed: usize,
}

impl ResultAccumulator {
    pub fn new(capacity: usize, diagnostics: LevelDiagnostics) -> Self {
        Self {
            onsets: Vec::with_capacity(capacity.min(DEFAULT_MAX_ONSETS)),
            capacity,
            diagnostics,
            truncated: false,
            hops_processed: 0,
        }
    }

    /// Store an onset. Reports `CapacityExceeded` once the stored count
    /// reaches capacity; later appends are refused.
    pub fn append(&mut self, onset_time_ms: f64) -> AppendOutcome {
        if self.onsets.len() >= self.capacity {
            self.truncated = true;
            return AppendOutcome::CapacityExceeded;
        }
        self.onsets.push(onset_time_ms);
        if self.onsets.len() >= self.capacity {
            self.truncated = true;
            return AppendOutcome::CapacityExceeded;
        }
        AppendOutcome::Stored
    }

    pub fn record_hop(&mut self) {
        self.hops_processed += 1;
    }

    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    pub fn finalize(self) -> RunResult {
        RunResult {
            onsets: self.onsets,
            diagnostics: self.diagnostics,
            truncated: self.truncated,
            hops_processed: self.hops_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keeps_arrival_order() {
        let mut acc = ResultAccumulator::new(8, LevelDiagnostics::default());
        for t in [1.0, 5.5, 9.25] {
            assert_eq!(acc.append(t), AppendOutcome::Stored);
        }
        let result = acc.finalize();
        assert_eq!(result.onsets, vec![1.0, 5.5, 9.25]);
        assert!(!result.truncated);
    }

    #[test]
    fn signals_when_capacity_is_reached() {
        let mut acc = ResultAccumulator::new(3, LevelDiagnostics::default());
        assert_eq!(acc.append(1.0), AppendOutcome::Stored);
        assert_eq!(acc.append(2.0), AppendOutcome::Stored);
        assert_eq!(acc.append(3.0), AppendOutcome::CapacityExceeded);
        assert_eq!(acc.append(4.0), AppendOutcome::CapacityExceeded);
        assert_eq!(acc.len(), 3);

        let result = acc.finalize();
        assert_eq!(result.onsets, vec![1.0, 2.0, 3.0]);
        assert!(result.truncated);
    }

    #[test]
    fn empty_run_finalizes_with_diagnostics() {
        let diagnostics = LevelDiagnostics { rms: 0.2, peak: 0.9 };
        let mut acc = ResultAccumulator::new(DEFAULT_MAX_ONSETS, diagnostics);
        acc.record_hop();
        assert!(acc.is_empty());
        let result = acc.finalize();
        assert!(result.onsets.is_empty());
        assert_eq!(result.diagnostics, diagnostics);
        assert_eq!(result.hops_processed, 1);
    }
}
