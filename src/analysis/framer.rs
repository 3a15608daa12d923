use serde::{Deserialize, Serialize};

/// Ratio of window size to hop size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Overlap {
    Two,
    Four,
    Eight,
}

impl Overlap {
    pub fn from_factor(factor: i64) -> Option<Self> {
        match factor {
            2 => Some(Overlap::Two),
            4 => Some(Overlap::Four),
            8 => Some(Overlap::Eight),
            _ => None,
        }
    }

    pub fn factor(self) -> usize {
        match self {
            Overlap::Two => 2,
            Overlap::Four => 4,
            Overlap::Eight => 8,
        }
    }
}

impl Default for Overlap {
    fn default() -> Self {
        Overlap::Four
    }
}

impl TryFrom<u32> for Overlap {
    type Error = String;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Overlap::from_factor(value as i64)
            .ok_or_else(|| format!("overlap must be either 2, 4, or 8 (got {})", value))
    }
}

impl From<Overlap> for u32 {
    fn from(overlap: Overlap) -> u32 {
        overlap.factor() as u32
    }
}

/// Cuts the first channel of an interleaved buffer into consecutive hops.
///
/// Only channel 0 is read; the other channels of a multi-channel buffer are
/// ignored by the onset analysis.
#[derive(Debug, Clone, Copy)]
pub struct Framer {
    window_size: usize,
    hop_size: usize,
}

impl Framer {
    pub fn new(window_size: usize, overlap: Overlap) -> Self {
        Self {
            window_size,
            hop_size: window_size / overlap.factor(),
        }
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_size(&self) -> usize {
        self.hop_size
    }

    /// Number of hops analysed for a buffer of `total_frames` frames.
    /// Zero when the buffer is shorter than one window.
    pub fn frame_count(&self, total_frames: usize) -> usize {
        if self.hop_size == 0 {
            return 0;
        }
        total_frames.saturating_sub(self.window_size) / self.hop_size
    }

    /// Copy hop `index` of channel 0 into `out` (resized to `hop_size`).
    pub fn fill_hop(&self, samples: &[f32], channel_count: usize, index: usize, out: &mut Vec<f32>) {
        let channels = channel_count.max(1);
        let offset = index * self.hop_size;
        out.clear();
        out.extend(
            (0..self.hop_size).map(|i| samples.get((offset + i) * channels).copied().unwrap_or(0.0)),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_size_is_window_over_overlap() {
        for (overlap, hop) in [(Overlap::Two, 256), (Overlap::Four, 128), (Overlap::Eight, 64)] {
            assert_eq!(Framer::new(512, overlap).hop_size(), hop);
        }
        assert_eq!(Framer::new(1024, Overlap::Eight).hop_size(), 128);
    }

    #[test]
    fn frame_count_matches_integer_division() {
        let framer = Framer::new(512, Overlap::Four);
        assert_eq!(framer.frame_count(44100), 339);
        assert_eq!(framer.frame_count(512), 0);
        assert_eq!(framer.frame_count(640), 1);
        assert_eq!(framer.frame_count(767), 1);
        assert_eq!(framer.frame_count(768), 2);
    }

    #[test]
    fn short_buffer_yields_no_hops() {
        let framer = Framer::new(512, Overlap::Two);
        assert_eq!(framer.frame_count(0), 0);
        assert_eq!(framer.frame_count(511), 0);
    }

    #[test]
    fn fill_hop_reads_first_channel_only() {
        // Stereo: left = frame index, right = -1.
        let samples: Vec<f32> = (0..32).flat_map(|i| [i as f32, -1.0]).collect();
        let framer = Framer::new(16, Overlap::Four);
        let mut hop = Vec::new();

        framer.fill_hop(&samples, 2, 0, &mut hop);
        assert_eq!(hop, vec![0.0, 1.0, 2.0, 3.0]);

        framer.fill_hop(&samples, 2, 3, &mut hop);
        assert_eq!(hop, vec![12.0, 13.0, 14.0, 15.0]);
    }

    #[test]
    fn overlap_factor_parsing() {
        assert_eq!(Overlap::from_factor(8), Some(Overlap::Eight));
        assert_eq!(Overlap::from_factor(3), None);
        assert_eq!(Overlap::default().factor(), 4);
        assert!(Overlap::try_from(16u32).is_err());
    }
}
