use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use bufonset::analysis::{DEFAULT_MAX_ONSETS, DEFAULT_WINDOW_SIZE};
use bufonset::DetectionParameters;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub detection: DetectionParameters,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnalysisConfig {
    #[serde(default = "default_window_size")]
    pub window_size: usize,
    #[serde(default = "default_max_onsets")]
    pub max_onsets: usize,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: default_window_size(),
            max_onsets: default_max_onsets(),
        }
    }
}

fn default_window_size() -> usize { DEFAULT_WINDOW_SIZE }
fn default_max_onsets() -> usize { DEFAULT_MAX_ONSETS }

pub fn load_config(path: &Path) -> Option<Config> {
    let content = std::fs::read_to_string(path).ok()?;
    match toml::from_str(&content) {
        Ok(config) => Some(config),
        Err(err) => {
            log::warn!("Invalid config {}: {}", path.display(), err);
            None
        }
    }
}

pub fn save_config(path: &Path, config: &Config) -> Result<()> {
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write config: {}", path.display()))
}

/// Explicit path, else `./bufonset.toml`, else the per-user config file.
pub fn find_config(explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit.or_else(|| {
        let local = PathBuf::from("bufonset.toml");
        if local.exists() {
            return Some(local);
        }
        if let Some(home) = dirs::home_dir() {
            let xdg = home.join(".config").join("bufonset").join("config.toml");
            if xdg.exists() {
                return Some(xdg);
            }
        }
        if let Some(config_dir) = dirs::config_dir() {
            let platform = config_dir.join("bufonset").join("config.toml");
            if platform.exists() {
                return Some(platform);
            }
        }
        None
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bufonset::analysis::Overlap;

    #[test]
    fn empty_file_gives_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.analysis.window_size, 512);
        assert_eq!(config.analysis.max_onsets, 4096);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.detection, DetectionParameters::default());
    }

    #[test]
    fn sections_are_parsed() {
        let config: Config = toml::from_str(
            r#"
            [detection]
            method = "complex"
            threshold = 0.4
            overlap = 2

            [analysis]
            window_size = 1024

            [output]
            format = "json"
            "#,
        )
        .unwrap();
        assert_eq!(config.detection.method, "complex");
        assert_eq!(config.detection.threshold, 0.4);
        assert_eq!(config.detection.overlap, Overlap::Two);
        assert_eq!(config.detection.silence_db, -70.0);
        assert_eq!(config.analysis.window_size, 1024);
        assert_eq!(config.output.format, OutputFormat::Json);
    }

    #[test]
    fn saved_config_loads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bufonset.toml");
        let mut config = Config::default();
        config.detection.method = "kl".into();
        config.detection.min_interval_ms = 30.0;
        save_config(&path, &config).unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.detection, config.detection);
    }

    #[test]
    fn invalid_overlap_keeps_the_rest_of_the_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("odd.toml");
        std::fs::write(
            &path,
            "[detection]\nmethod = \"mkl\"\nthreshold = 0.4\noverlap = 3\n",
        )
        .unwrap();

        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.detection.method, "mkl");
        assert_eq!(loaded.detection.threshold, 0.4);
        assert_eq!(loaded.detection.overlap, Overlap::Four);
    }

    #[test]
    fn malformed_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[detection]\nthreshold = \"loud\"\n").unwrap();
        assert!(load_config(&path).is_none());
    }

    #[test]
    fn explicit_path_wins() {
        let path = PathBuf::from("/some/where.toml");
        assert_eq!(find_config(Some(path.clone())), Some(path));
    }
}
