use serde::Serialize;

/// Whole-buffer level summary logged with every run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LevelDiagnostics {
    pub rms: f32,
    pub peak: f32,
}

/// RMS and peak magnitude of channel 0, the channel the onset analysis reads.
pub fn measure_first_channel(samples: &[f32], channel_count: usize) -> LevelDiagnostics {
    let channels = channel_count.max(1);
    let mut sum_sq = 0.0f64;
    let mut peak = 0.0f32;
    let mut count = 0usize;

    for &s in samples.iter().step_by(channels) {
        sum_sq += (s as f64) * (s as f64);
        peak = peak.max(s.abs());
        count += 1;
    }

    if count == 0 {
        return LevelDiagnostics::default();
    }

    LevelDiagnostics {
        rms: (sum_sq / count as f64).sqrt() as f32,
        peak,
    }
}
