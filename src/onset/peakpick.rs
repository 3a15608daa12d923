/// Past values kept behind the value under test.
const WIN_POST: usize = 5;
/// Future values kept ahead of it.
const WIN_PRE: usize = 1;
const HISTORY: usize = WIN_POST + WIN_PRE + 1;

// Second-order low-pass applied forward and backward over the history.
const B: [f32; 3] = [0.1600, 0.3200, 0.1600];
const A: [f32; 3] = [1.0, -0.5949, 0.2348];

/// Adaptive-threshold peak picker over an onset-strength sequence.
///
/// Each new value is smoothed together with its recent history, a moving
/// median plus `threshold` times the mean is subtracted, and a peak is
/// reported when the thresholded sequence has a positive local maximum.
#[derive(Debug, Clone)]
pub struct PeakPicker {
    threshold: f32,
    keep: [f32; HISTORY],
    peek: [f32; 3],
}

impl PeakPicker {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            keep: [0.0; HISTORY],
            peek: [0.0; 3],
        }
    }

    pub fn set_threshold(&mut self, threshold: f32) {
        self.threshold = threshold;
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Feed one onset-strength value. Returns 0 when there is no peak,
    /// otherwise the interpolated peak position in hops (around 1.0,
    /// counted back from the newest value's predecessor).
    pub fn process(&mut self, value: f32) -> f32 {
        self.keep.copy_within(1.., 0);
        self.keep[HISTORY - 1] = value;

        let mut smoothed = self.keep;
        filtfilt(&mut smoothed);

        let mean = smoothed.iter().sum::<f32>() / HISTORY as f32;
        let median = median(&smoothed);

        self.peek.copy_within(1.., 0);
        self.peek[2] = smoothed[WIN_POST] - median - mean * self.threshold;

        if is_peak(&self.peek) {
            quadratic_peak_pos(&self.peek)
        } else {
            0.0
        }
    }
}

fn is_peak(x: &[f32; 3]) -> bool {
    x[1] > x[0] && x[1] > x[2] && x[1] > 0.0
}

/// Vertex of the parabola through the three points, relative to index 0.
fn quadratic_peak_pos(x: &[f32; 3]) -> f32 {
    let denom = x[0] - 2.0 * x[1] + x[2];
    if denom == 0.0 {
        return 1.0;
    }
    1.0 + 0.5 * (x[0] - x[2]) / denom
}

fn median(values: &[f32; HISTORY]) -> f32 {
    let mut sorted = *values;
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted[HISTORY / 2]
}

/// Zero-phase filtering: run the biquad forward, then over the reversed output.
fn filtfilt(data: &mut [f32]) {
    biquad(data);
    data.reverse();
    biquad(data);
    data.reverse();
}

fn biquad(data: &mut [f32]) {
    let (mut x1, mut x2, mut y1, mut y2) = (0.0f32, 0.0f32, 0.0f32, 0.0f32);
    for sample in data.iter_mut() {
        let x0 = *sample;
        let y0 = B[0] * x0 + B[1] * x1 + B[2] * x2 - A[1] * y1 - A[2] * y2;
        x2 = x1;
        x1 = x0;
        y2 = y1;
        y1 = y0;
        *sample = y0;
    }
}
