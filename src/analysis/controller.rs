use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use serde::Serialize;

use super::accumulator::{AppendOutcome, ResultAccumulator, RunResult, DEFAULT_MAX_ONSETS};
use super::diagnostics::measure_first_channel;
use super::framer::Framer;
use crate::buffer::{BufferHandle, BufferStore};
use crate::error::{AnalysisError, Result};
use crate::onset::{AlgorithmFactory, DetectorSetup, OnsetDetector, SpectralFactory};
use crate::params::ParameterStore;
use crate::scheduler::Scheduler;

pub const DEFAULT_WINDOW_SIZE: usize = 512;

/// What a run publishes to subscribers, in order: one of `Onsets`,
/// `NoOnsets` or `Failed`, then `Done`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum AnalysisEvent {
    Onsets(Vec<f64>),
    NoOnsets,
    Failed(String),
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    /// Accepted by `trigger`, waiting for the scheduler.
    Queued,
    Acquiring,
    Analyzing,
    Finalizing,
}

/// Runs onset analysis over a bound buffer on demand.
///
/// One run at a time: a trigger that arrives while a run is queued or in
/// flight is rejected with [`AnalysisError::Busy`]. Parameter changes made
/// during a run apply to the next one.
pub struct AnalysisController {
    buffer: Mutex<BufferHandle>,
    params: Arc<ParameterStore>,
    factory: Box<dyn AlgorithmFactory>,
    window_size: usize,
    max_onsets: usize,
    state: Mutex<RunState>,
    outlets: Mutex<Vec<Sender<AnalysisEvent>>>,
}

impl AnalysisController {
    pub fn new(store: Arc<dyn BufferStore>, params: Arc<ParameterStore>) -> Self {
        Self {
            buffer: Mutex::new(BufferHandle::new(store)),
            params,
            factory: Box::new(SpectralFactory),
            window_size: DEFAULT_WINDOW_SIZE,
            max_onsets: DEFAULT_MAX_ONSETS,
            state: Mutex::new(RunState::Idle),
            outlets: Mutex::new(Vec::new()),
        }
    }

    pub fn with_factory(mut self, factory: impl AlgorithmFactory + 'static) -> Self {
        self.factory = Box::new(factory);
        self
    }

    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    pub fn with_max_onsets(mut self, max_onsets: usize) -> Self {
        self.max_onsets = max_onsets.max(1);
        self
    }

    pub fn params(&self) -> &Arc<ParameterStore> {
        &self.params
    }

    pub fn bind(&self, name: &str) {
        self.buffer.lock().bind(name);
    }

    pub fn bound_name(&self) -> Option<String> {
        self.buffer.lock().name().map(str::to_string)
    }

    pub fn state(&self) -> RunState {
        *self.state.lock()
    }

    /// Receive the events of every subsequent run.
    pub fn subscribe(&self) -> Receiver<AnalysisEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.outlets.lock().push(tx);
        rx
    }

    /// Queue one run on `scheduler` and return immediately.
    pub fn trigger(self: &Arc<Self>, scheduler: &Scheduler) -> Result<()> {
        self.enter(RunState::Idle, RunState::Queued)?;
        let controller = Arc::clone(self);
        let submitted = scheduler.submit(move || {
            // Outcome already published and logged.
            let _ = controller.execute(RunState::Queued);
        });
        if submitted.is_err() {
            self.set_state(RunState::Idle);
        }
        submitted
    }

    /// Run one analysis synchronously and publish its events.
    pub fn run(&self) -> Result<RunResult> {
        self.execute(RunState::Idle)
    }

    fn enter(&self, expected: RunState, next: RunState) -> Result<()> {
        let mut state = self.state.lock();
        if *state != expected {
            log::warn!("analysis already running, trigger ignored");
            return Err(AnalysisError::Busy);
        }
        *state = next;
        Ok(())
    }

    fn execute(&self, from: RunState) -> Result<RunResult> {
        self.enter(from, RunState::Acquiring)?;
        let outcome = {
            let _idle = ResetToIdle(&self.state);
            let outcome = self.analyze();
            self.report(&outcome);
            outcome
        };
        // Idle again before `Done` goes out, so a subscriber may re-trigger on it.
        self.publish(AnalysisEvent::Done);
        outcome
    }

    fn report(&self, outcome: &Result<RunResult>) {
        match outcome {
            Ok(result) if result.onsets.is_empty() => {
                log::info!("no onsets found!");
                self.publish(AnalysisEvent::NoOnsets);
            }
            Ok(result) => {
                log::info!("{} onsets found", result.onsets.len());
                self.publish(AnalysisEvent::Onsets(result.onsets.clone()));
            }
            Err(err) => {
                log::error!("{}", err);
                self.publish(AnalysisEvent::Failed(err.to_string()));
            }
        }
    }

    /// Unbind the buffer and drop all subscribers.
    pub fn teardown(&self) {
        self.buffer.lock().unbind();
        self.outlets.lock().clear();
    }

    fn analyze(&self) -> Result<RunResult> {
        let params = self.params.snapshot();
        let buffer = self.buffer.lock().acquire()?;
        self.set_state(RunState::Analyzing);

        let diagnostics = measure_first_channel(buffer.samples(), buffer.channel_count());
        log::info!(
            "{}: rms: {:.6} -- max: {:.6}",
            buffer.source().unwrap_or(buffer.name()),
            diagnostics.rms,
            diagnostics.peak
        );

        let framer = Framer::new(self.window_size, params.overlap);
        let setup = DetectorSetup {
            window_size: framer.window_size(),
            hop_size: framer.hop_size(),
            sample_rate: buffer.sample_rate(),
        };
        let mut detector = OnsetDetector::initialize(self.factory.as_ref(), &params.method, setup)?;
        detector.configure(params.threshold, params.silence_db, params.min_interval_ms);

        let mut results = ResultAccumulator::new(self.max_onsets, diagnostics);
        let hops = framer.frame_count(buffer.frame_count());
        let mut hop = Vec::with_capacity(framer.hop_size());
        log::debug!(
            "analysing {} hops of {} samples ({} method)",
            hops,
            framer.hop_size(),
            detector.method()
        );

        for n in 0..hops {
            framer.fill_hop(buffer.samples(), buffer.channel_count(), n, &mut hop);
            results.record_hop();
            if let Some(onset_ms) = detector.process_hop(&hop) {
                if results.append(onset_ms) == AppendOutcome::CapacityExceeded {
                    log::warn!("number of onsets maxed out! ({})", self.max_onsets);
                    break;
                }
            }
        }

        self.set_state(RunState::Finalizing);
        buffer.release();
        Ok(results.finalize())
    }

    fn set_state(&self, state: RunState) {
        *self.state.lock() = state;
    }

    fn publish(&self, event: AnalysisEvent) {
        self.outlets
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

struct ResetToIdle<'a>(&'a Mutex<RunState>);

impl Drop for ResetToIdle<'_> {
    fn drop(&mut self) {
        *self.0.lock() = RunState::Idle;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{BufferData, BufferRegistry};
    use crate::onset::{OnsetAlgorithm, OnsetMethod};
    use crate::params::DetectionParameters;

    /// Reports an onset on every hop, 1 ms apart.
    struct EveryHop {
        hops: u64,
    }

    impl OnsetAlgorithm for EveryHop {
        fn set_threshold(&mut self, _: f32) {}
        fn set_silence_db(&mut self, _: f32) {}
        fn set_min_ioi_ms(&mut self, _: f64) {}

        fn process(&mut self, _hop: &[f32]) -> bool {
            self.hops += 1;
            true
        }

        fn last_onset_ms(&self) -> f64 {
            self.hops as f64
        }
    }

    struct EveryHopFactory;

    impl AlgorithmFactory for EveryHopFactory {
        fn create(&self, _: OnsetMethod, _: &DetectorSetup) -> Box<dyn OnsetAlgorithm> {
            Box::new(EveryHop { hops: 0 })
        }
    }

    fn controller_with(name: &str, frames: usize) -> (Arc<BufferRegistry>, AnalysisController) {
        let registry = Arc::new(BufferRegistry::new());
        registry.insert(name, BufferData::new(vec![0.0; frames], 1, 44100));
        let controller =
            AnalysisController::new(registry.clone(), Arc::new(ParameterStore::new()));
        controller.bind(name);
        (registry, controller)
    }

    fn drain(rx: &Receiver<AnalysisEvent>) -> Vec<AnalysisEvent> {
        rx.try_iter().collect()
    }

    #[test]
    fn silent_buffer_reports_no_onsets_then_done() {
        let (registry, controller) = controller_with("quiet", 44100);
        let rx = controller.subscribe();
        let result = controller.run().unwrap();

        assert!(result.onsets.is_empty());
        assert_eq!(result.hops_processed, 339);
        assert_eq!(drain(&rx), vec![AnalysisEvent::NoOnsets, AnalysisEvent::Done]);
        assert_eq!(registry.active_locks("quiet"), 0);
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[test]
    fn short_buffer_runs_no_hops() {
        let (_registry, controller) = controller_with("tiny", 300);
        let controller = controller.with_factory(EveryHopFactory);
        let rx = controller.subscribe();
        let result = controller.run().unwrap();
        assert_eq!(result.hops_processed, 0);
        assert!(result.onsets.is_empty());
        assert_eq!(drain(&rx), vec![AnalysisEvent::NoOnsets, AnalysisEvent::Done]);
    }

    #[test]
    fn capacity_overflow_truncates_and_releases() {
        let (registry, controller) = controller_with("busy", 44100 * 20);
        let controller = controller.with_factory(EveryHopFactory);
        let rx = controller.subscribe();

        let result = controller.run().unwrap();
        assert_eq!(result.onsets.len(), DEFAULT_MAX_ONSETS);
        assert!(result.truncated);
        assert_eq!(result.hops_processed, DEFAULT_MAX_ONSETS);
        assert_eq!(registry.active_locks("busy"), 0);

        let events = drain(&rx);
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], AnalysisEvent::Onsets(list) if list.len() == DEFAULT_MAX_ONSETS));
        assert_eq!(events[1], AnalysisEvent::Done);
    }

    #[test]
    fn custom_capacity_is_honoured() {
        let (_registry, controller) = controller_with("busy", 44100);
        let controller = controller
            .with_factory(EveryHopFactory)
            .with_max_onsets(10);
        let result = controller.run().unwrap();
        assert_eq!(result.onsets, (1..=10).map(|i| i as f64).collect::<Vec<_>>());
    }

    #[test]
    fn unknown_buffer_fails_without_onsets() {
        let (_registry, controller) = controller_with("drums", 4096);
        controller.bind("nope");
        let rx = controller.subscribe();

        let err = controller.run().unwrap_err();
        assert_eq!(err, AnalysisError::BufferNotFound { name: "nope".into() });
        let events = drain(&rx);
        assert_eq!(
            events,
            vec![
                AnalysisEvent::Failed("nope is no valid buffer".into()),
                AnalysisEvent::Done
            ]
        );
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[test]
    fn bad_method_fails_after_lock_and_releases() {
        let (registry, controller) = controller_with("drums", 4096);
        controller.params().set_method("bogus");
        let err = controller.run().unwrap_err();
        assert!(matches!(err, AnalysisError::UnsupportedMethod { .. }));
        assert_eq!(registry.active_locks("drums"), 0);
    }

    #[test]
    fn parameters_are_read_per_run() {
        let (_registry, controller) = controller_with("drums", 44100);
        let controller = controller.with_factory(EveryHopFactory).with_max_onsets(100_000);
        assert_eq!(controller.run().unwrap().hops_processed, 339);

        controller.params().apply(DetectionParameters {
            overlap: crate::analysis::framer::Overlap::Eight,
            ..DetectionParameters::default()
        });
        assert_eq!(controller.run().unwrap().hops_processed, (44100 - 512) / 64);
    }

    #[test]
    fn teardown_unbinds_and_drops_subscribers() {
        let (_registry, controller) = controller_with("drums", 4096);
        let rx = controller.subscribe();
        controller.teardown();
        assert_eq!(controller.bound_name(), None);
        assert_eq!(controller.run().unwrap_err(), AnalysisError::NoBufferBound);
        assert!(drain(&rx).is_empty());
    }

    #[test]
    fn trigger_runs_on_scheduler() {
        let (_registry, controller) = controller_with("drums", 44100);
        let controller = Arc::new(controller);
        let rx = controller.subscribe();
        let scheduler = Scheduler::new("test-analysis").unwrap();

        controller.trigger(&scheduler).unwrap();
        assert_eq!(rx.recv().unwrap(), AnalysisEvent::NoOnsets);
        assert_eq!(rx.recv().unwrap(), AnalysisEvent::Done);
        scheduler.shutdown();
    }

    #[test]
    fn trigger_while_queued_is_busy() {
        let (_registry, controller) = controller_with("drums", 8192);
        let controller = Arc::new(controller);
        let rx = controller.subscribe();
        let scheduler = Scheduler::new("test-analysis").unwrap();

        // Hold the worker so the first trigger stays queued.
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        scheduler.submit(move || {
            let _ = gate_rx.recv();
        })
        .unwrap();

        controller.trigger(&scheduler).unwrap();
        assert_eq!(controller.state(), RunState::Queued);
        assert_eq!(controller.trigger(&scheduler), Err(AnalysisError::Busy));
        assert_eq!(controller.run().unwrap_err(), AnalysisError::Busy);

        gate_tx.send(()).unwrap();
        assert_eq!(rx.recv().unwrap(), AnalysisEvent::NoOnsets);
        assert_eq!(rx.recv().unwrap(), AnalysisEvent::Done);
        scheduler.shutdown();
        assert!(rx.try_recv().is_err());
        assert_eq!(controller.state(), RunState::Idle);
    }

    #[test]
    fn retrigger_on_done_is_accepted() {
        let (_registry, controller) = controller_with("drums", 8192);
        let controller = Arc::new(controller);
        let rx = controller.subscribe();
        let scheduler = Scheduler::new("test-analysis").unwrap();

        for _ in 0..3 {
            controller.trigger(&scheduler).unwrap();
            while rx.recv().unwrap() != AnalysisEvent::Done {}
        }
        scheduler.shutdown();
    }
}
