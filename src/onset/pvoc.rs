use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

/// Magnitude and phase of the `window_size / 2 + 1` non-negative bins.
#[derive(Debug, Clone)]
pub struct Spectrum {
    pub norm: Vec<f32>,
    pub phase: Vec<f32>,
}

impl Spectrum {
    pub fn zeros(bins: usize) -> Self {
        Self {
            norm: vec![0.0; bins],
            phase: vec![0.0; bins],
        }
    }

    pub fn bins(&self) -> usize {
        self.norm.len()
    }
}

/// Sliding-window STFT: every call shifts one hop of new samples into a
/// `window_size` history and transforms the Hann-weighted, half-rotated window.
pub struct PhaseVocoder {
    hop_size: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    history: Vec<f32>,
    scratch: Vec<Complex<f32>>,
    spectrum: Spectrum,
}

impl PhaseVocoder {
    pub fn new(window_size: usize, hop_size: usize) -> Self {
        let mut planner = FftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window_size);

        Self {
            hop_size,
            fft,
            window: hann_window(window_size),
            history: vec![0.0; window_size],
            scratch: vec![Complex::new(0.0, 0.0); window_size],
            spectrum: Spectrum::zeros(window_size / 2 + 1),
        }
    }

    /// Push one hop and return the spectrum of the updated window.
    /// Short hops are zero-padded, long hops truncated.
    pub fn process(&mut self, hop: &[f32]) -> &Spectrum {
        let size = self.history.len();
        let hop_size = self.hop_size.min(size);
        let taken = hop.len().min(hop_size);

        self.history.copy_within(hop_size.., 0);
        let tail = &mut self.history[size - hop_size..];
        tail[..taken].copy_from_slice(&hop[..taken]);
        tail[taken..].fill(0.0);

        // Rotate by half a window so the frame centre sits at index 0.
        let half = size / 2;
        for (i, slot) in self.scratch.iter_mut().enumerate() {
            let src = (i + half) % size;
            *slot = Complex::new(self.history[src] * self.window[src], 0.0);
        }
        self.fft.process(&mut self.scratch);

        for (k, bin) in self.scratch[..self.spectrum.bins()].iter().enumerate() {
            self.spectrum.norm[k] = bin.norm();
            self.spectrum.phase[k] = bin.arg();
        }
        &self.spectrum
    }
}

/// Periodic Hann window.
fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / size as f32).cos()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silence_has_empty_spectrum() {
        let mut pv = PhaseVocoder::new(64, 16);
        let spectrum = pv.process(&[0.0; 16]);
        assert_eq!(spectrum.bins(), 33);
        assert!(spectrum.norm.iter().all(|&m| m == 0.0));
    }

    #[test]
    fn sinusoid_peaks_at_its_bin() {
        let size = 256;
        let mut pv = PhaseVocoder::new(size, size / 4);
        let bin = 8;
        let signal: Vec<f32> = (0..size)
            .map(|i| (2.0 * std::f32::consts::PI * bin as f32 * i as f32 / size as f32).sin())
            .collect();

        let mut last = None;
        for hop in signal.chunks(size / 4) {
            last = Some(pv.process(hop).norm.clone());
        }
        let norm = last.unwrap();
        let loudest = norm
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(k, _)| k)
            .unwrap();
        assert_eq!(loudest, bin);
    }

    #[test]
    fn hann_window_is_periodic() {
        let w = hann_window(8);
        assert_eq!(w[0], 0.0);
        assert!((w[4] - 1.0).abs() < 1e-6);
        assert!((w[1] - w[7]).abs() < 1e-6);
    }
}
