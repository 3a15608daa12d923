use clap::Parser;
use std::path::PathBuf;

use crate::config::OutputFormat;

#[derive(Parser, Debug)]
#[command(name = "bufonset", about = "Onset detection over audio files loaded as named buffers")]
pub struct Cli {
    /// Input audio files (WAV, MP3, FLAC, OGG); each becomes a buffer named by its file stem
    pub inputs: Vec<PathBuf>,

    /// Detection method: complex, energy, hfc, specdiff, phase, kl, mkl
    #[arg(short, long, default_value = "hfc")]
    pub mode: String,

    /// Detection threshold (0-10)
    #[arg(short, long, default_value_t = 1.0)]
    pub thresh: f32,

    /// Silence threshold in dB (-90 to -20)
    #[arg(short, long, default_value_t = -70.0, allow_negative_numbers = true)]
    pub silence: f32,

    /// Minimum interval between onsets in ms (at least 8)
    #[arg(long, default_value_t = 14.3)]
    pub mininterval: f64,

    /// Window overlap factor: 2, 4 or 8
    #[arg(long, default_value_t = 4)]
    pub overlap: i64,

    /// Analysis window size in samples
    #[arg(long, default_value_t = 512)]
    pub window: usize,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Config file (defaults to ./bufonset.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Write the effective detection settings to this file and continue
    #[arg(long)]
    pub save_params: Option<PathBuf>,

    /// Print buffer information instead of analysing
    #[arg(long)]
    pub info: bool,
}
