use super::descriptor::SpectralDescriptor;
use super::peakpick::PeakPicker;
use super::pvoc::PhaseVocoder;
use super::{DetectorSetup, OnsetAlgorithm, OnsetMethod};

/// Reporting delay of the detection chain, in hops.
const DELAY_HOPS: f64 = 4.3;

/// Phase-vocoder based onset detector: spectral descriptor, adaptive peak
/// picking, a silence gate and minimum inter-onset suppression.
pub struct SpectralOnset {
    hop_size: usize,
    sample_rate: u32,
    pvoc: PhaseVocoder,
    descriptor: SpectralDescriptor,
    picker: PeakPicker,
    silence_db: f32,
    min_ioi: u64,
    delay: u64,
    /// Samples consumed before the current hop.
    total: u64,
    /// Position of the last accepted onset, reporting delay still included.
    last_onset: Option<u64>,
    last_strength: f32,
}

impl SpectralOnset {
    pub fn new(method: OnsetMethod, setup: &DetectorSetup) -> Self {
        let mut onset = Self {
            hop_size: setup.hop_size,
            sample_rate: setup.sample_rate.max(1),
            pvoc: PhaseVocoder::new(setup.window_size, setup.hop_size),
            descriptor: SpectralDescriptor::new(method, setup.window_size / 2 + 1),
            picker: PeakPicker::new(0.3),
            silence_db: -70.0,
            min_ioi: 0,
            delay: (DELAY_HOPS * setup.hop_size as f64) as u64,
            total: 0,
            last_onset: None,
            last_strength: 0.0,
        };
        onset.set_min_ioi_ms(20.0);
        onset
    }

    pub fn method(&self) -> OnsetMethod {
        self.descriptor.method()
    }

    /// Onset-strength value of the most recent hop.
    pub fn last_strength(&self) -> f32 {
        self.last_strength
    }

    pub fn delay_samples(&self) -> u64 {
        self.delay
    }

    fn accept(&mut self, candidate: u64) -> bool {
        match self.last_onset {
            Some(last) if candidate <= last + self.min_ioi => false,
            _ => {
                self.last_onset = Some(candidate);
                true
            }
        }
    }

    /// Onset at the start of the buffer, before the peak picker has warmed up.
    /// Recorded one delay ahead so no second start onset can follow it.
    fn accept_start(&mut self) -> bool {
        let clear = match self.last_onset {
            None => true,
            Some(last) => self.total == 0 || last + self.min_ioi < self.total,
        };
        if clear {
            self.last_onset = Some(self.total + self.delay);
        }
        clear
    }
}

impl OnsetAlgorithm for SpectralOnset {
    fn set_threshold(&mut self, threshold: f32) {
        self.picker.set_threshold(threshold);
    }

    fn set_silence_db(&mut self, silence_db: f32) {
        self.silence_db = silence_db;
    }

    fn set_min_ioi_ms(&mut self, min_ioi_ms: f64) {
        self.min_ioi = (min_ioi_ms.max(0.0) * self.sample_rate as f64 / 1000.0).round() as u64;
    }

    fn process(&mut self, hop: &[f32]) -> bool {
        let strength = {
            let spectrum = self.pvoc.process(hop);
            self.descriptor.compute(spectrum)
        };
        self.last_strength = strength;
        let peak = self.picker.process(strength);

        let detected = if peak > 0.0 {
            if is_silent(hop, self.silence_db) {
                false
            } else {
                let candidate = self.total + (peak as f64 * self.hop_size as f64).round() as u64;
                self.accept(candidate)
            }
        } else if self.total <= self.delay && !is_silent(hop, self.silence_db) {
            self.accept_start()
        } else {
            false
        };

        self.total += self.hop_size as u64;
        detected
    }

    fn last_onset_ms(&self) -> f64 {
        self.last_onset
            .map_or(0.0, |pos| pos.saturating_sub(self.delay) as f64 / self.sample_rate as f64 * 1000.0)
    }
}

/// Level of a block in dB relative to full scale power.
pub fn level_db(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return f32::NEG_INFINITY;
    }
    let energy: f32 = samples.iter().map(|s| s * s).sum();
    10.0 * (energy / samples.len() as f32).log10()
}

fn is_silent(samples: &[f32], silence_db: f32) -> bool {
    level_db(samples) < silence_db
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> DetectorSetup {
        DetectorSetup {
            window_size: 512,
            hop_size: 128,
            sample_rate: 44100,
        }
    }

    #[test]
    fn delay_is_fraction_of_hops() {
        let onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        assert_eq!(onset.delay_samples(), 550);
        assert_eq!(onset.method(), OnsetMethod::Hfc);
    }

    #[test]
    fn level_of_full_scale_square_is_zero_db() {
        assert!(level_db(&[1.0, -1.0, 1.0, -1.0]).abs() < 1e-6);
        assert!((level_db(&[0.1; 64]) + 20.0).abs() < 1e-4);
        assert_eq!(level_db(&[0.0; 8]), f32::NEG_INFINITY);
    }

    #[test]
    fn digital_silence_has_no_onsets() {
        let mut onset = SpectralOnset::new(OnsetMethod::Energy, &setup());
        let hop = [0.0f32; 128];
        assert!((0..200).all(|_| !onset.process(&hop)));
    }

    #[test]
    fn sound_at_buffer_start_is_reported_at_zero() {
        let mut onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        let hop: Vec<f32> = (0..128).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }).collect();
        assert!(onset.process(&hop));
        assert_eq!(onset.last_onset_ms(), 0.0);
    }

    #[test]
    fn min_ioi_is_rounded_to_samples() {
        let mut onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        onset.set_min_ioi_ms(14.3);
        assert_eq!(onset.min_ioi, 631);
        onset.set_min_ioi_ms(-5.0);
        assert_eq!(onset.min_ioi, 0);
    }

    #[test]
    fn suppression_rejects_close_candidates() {
        let mut onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        onset.set_min_ioi_ms(10.0); // 441 samples
        assert!(onset.accept(1000));
        assert!(!onset.accept(1441));
        assert!(onset.accept(1442));
        assert!((onset.last_onset_ms() - (1442.0 - 550.0) / 44.1).abs() < 1e-9);
    }

    #[test]
    fn steady_tone_from_start_reports_one_onset() {
        let mut onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        onset.set_threshold(1.0);
        onset.set_silence_db(-70.0);
        onset.set_min_ioi_ms(8.0);
        let tone: Vec<f32> = (0..128 * 20)
            .map(|i| 0.3 * (2.0 * std::f32::consts::PI * 440.0 * i as f32 / 44100.0).sin())
            .collect();

        let onsets: Vec<f64> = tone
            .chunks_exact(128)
            .filter_map(|hop| onset.process(hop).then(|| onset.last_onset_ms()))
            .collect();
        assert_eq!(onsets, vec![0.0]);
    }

    #[test]
    fn start_onset_blocks_the_start_region() {
        let mut onset = SpectralOnset::new(OnsetMethod::Hfc, &setup());
        onset.set_min_ioi_ms(8.0); // 353 samples, shorter than the delay
        assert!(onset.accept_start());
        onset.total = 512;
        assert!(!onset.accept_start());
        assert!(!onset.accept(550 + 353));
        assert!(onset.accept(550 + 354));
    }
}
