use std::f32::consts::PI;

use super::pvoc::Spectrum;
use super::OnsetMethod;

/// Magnitude below which a bin is ignored by the phase and specdiff methods.
const BIN_FLOOR: f32 = 0.1;
/// Regulariser of the Kullback-Leibler ratios.
const KL_EPSILON: f32 = 0.1;
const HISTOGRAM_BINS: usize = 20;

/// Reduces one spectral frame to a single onset-strength value.
///
/// Stateful: most methods compare against the previous one or two frames.
pub struct SpectralDescriptor {
    method: OnsetMethod,
    old_norm: Vec<f32>,
    theta1: Vec<f32>,
    theta2: Vec<f32>,
    deviation: Vec<f32>,
    histogram: Vec<f32>,
}

impl SpectralDescriptor {
    pub fn new(method: OnsetMethod, bins: usize) -> Self {
        Self {
            method,
            old_norm: vec![0.0; bins],
            theta1: vec![0.0; bins],
            theta2: vec![0.0; bins],
            deviation: vec![0.0; bins],
            histogram: vec![0.0; HISTOGRAM_BINS],
        }
    }

    pub fn method(&self) -> OnsetMethod {
        self.method
    }

    pub fn compute(&mut self, spectrum: &Spectrum) -> f32 {
        let value = match self.method {
            OnsetMethod::Energy => energy(spectrum),
            OnsetMethod::Hfc => hfc(spectrum),
            OnsetMethod::Complex => self.complex_domain(spectrum),
            OnsetMethod::Phase => self.phase_deviation(spectrum),
            OnsetMethod::SpecDiff => self.spectral_difference(spectrum),
            OnsetMethod::Kl => self.kullback_leibler(spectrum),
            OnsetMethod::Mkl => self.modified_kullback_leibler(spectrum),
        };
        if value.is_finite() {
            value
        } else {
            0.0
        }
    }

    fn complex_domain(&mut self, spectrum: &Spectrum) -> f32 {
        let mut sum = 0.0;
        for k in 0..spectrum.bins() {
            let predicted = 2.0 * self.theta1[k] - self.theta2[k];
            let old = self.old_norm[k];
            let cur = spectrum.norm[k];
            sum += (old * old + cur * cur - 2.0 * old * cur * (predicted - spectrum.phase[k]).cos())
                .abs()
                .sqrt();

            self.theta2[k] = self.theta1[k];
            self.theta1[k] = spectrum.phase[k];
            self.old_norm[k] = cur;
        }
        sum
    }

    fn phase_deviation(&mut self, spectrum: &Spectrum) -> f32 {
        for k in 0..spectrum.bins() {
            let dev = unwrap_2pi(spectrum.phase[k] - 2.0 * self.theta1[k] + self.theta2[k]);
            self.deviation[k] = if spectrum.norm[k] > BIN_FLOOR {
                dev.abs()
            } else {
                0.0
            };
            self.theta2[k] = self.theta1[k];
            self.theta1[k] = spectrum.phase[k];
        }
        histogram_mean(&self.deviation, &mut self.histogram)
    }

    fn spectral_difference(&mut self, spectrum: &Spectrum) -> f32 {
        for k in 0..spectrum.bins() {
            let cur = spectrum.norm[k];
            let old = self.old_norm[k];
            self.deviation[k] = if cur > BIN_FLOOR {
                (cur * cur - old * old).abs().sqrt()
            } else {
                0.0
            };
            self.old_norm[k] = cur;
        }
        histogram_mean(&self.deviation, &mut self.histogram)
    }

    fn kullback_leibler(&mut self, spectrum: &Spectrum) -> f32 {
        let mut sum = 0.0;
        for (cur, old) in spectrum.norm.iter().zip(self.old_norm.iter_mut()) {
            sum += cur * (1.0 + cur / (*old + KL_EPSILON)).ln();
            *old = *cur;
        }
        sum
    }

    fn modified_kullback_leibler(&mut self, spectrum: &Spectrum) -> f32 {
        let mut sum = 0.0;
        for (cur, old) in spectrum.norm.iter().zip(self.old_norm.iter_mut()) {
            sum += (1.0 + cur / (*old + KL_EPSILON)).ln();
            *old = *cur;
        }
        sum
    }
}

fn energy(spectrum: &Spectrum) -> f32 {
    spectrum.norm.iter().map(|m| m * m).sum()
}

fn hfc(spectrum: &Spectrum) -> f32 {
    spectrum
        .norm
        .iter()
        .enumerate()
        .map(|(k, m)| (k + 1) as f32 * m)
        .sum()
}

/// Wrap a phase into [-pi, pi).
fn unwrap_2pi(phase: f32) -> f32 {
    let two_pi = 2.0 * PI;
    phase - two_pi * ((phase + PI) / two_pi).floor()
}

/// Weighted mean of a dynamic histogram over the non-zero values: bins span
/// [min, max] of those values and each count is weighted by its bin centre.
fn histogram_mean(values: &[f32], histogram: &mut [f32]) -> f32 {
    let nbins = histogram.len();
    let mut low = f32::MAX;
    let mut high = f32::MIN;
    let mut any = false;
    for &v in values.iter().filter(|v| **v != 0.0) {
        low = low.min(v);
        high = high.max(v);
        any = true;
    }
    if !any || nbins == 0 {
        return 0.0;
    }

    histogram.fill(0.0);
    let span = high - low;
    if span <= 0.0 {
        let count = values.iter().filter(|v| **v != 0.0).count();
        return count as f32 * low / nbins as f32;
    }

    let step = span / nbins as f32;
    for &v in values.iter().filter(|v| **v != 0.0) {
        let idx = (((v - low) / span) * nbins as f32).floor() as usize;
        histogram[idx.min(nbins - 1)] += 1.0;
    }

    histogram
        .iter()
        .enumerate()
        .map(|(i, count)| count * (low + (i as f32 + 0.5) * step))
        .sum::<f32>()
        / nbins as f32
}
