mod audio;
mod cli;
mod config;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use audio::decode;
use bufonset::buffer::BufferInfo;
use bufonset::{AnalysisController, AnalysisEvent, BufferRegistry, ParameterStore, Scheduler};
use cli::Cli;
use config::{Config, OutputFormat};

#[derive(Debug, Serialize)]
struct BufferReport {
    buffer: String,
    onsets: Vec<f64>,
    error: Option<String>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut cli = Cli::parse();
    let mut cfg = Config::default();

    if let Some(ref path) = config::find_config(cli.config.clone()) {
        if let Some(loaded) = config::load_config(path) {
            log::info!("Loaded config from {}", path.display());
            // Merge: config values apply only when CLI is at its default
            if cli.mode == "hfc" { cli.mode = loaded.detection.method.clone(); }
            if cli.thresh == 1.0 { cli.thresh = loaded.detection.threshold; }
            if cli.silence == -70.0 { cli.silence = loaded.detection.silence_db; }
            if cli.mininterval == 14.3 { cli.mininterval = loaded.detection.min_interval_ms; }
            if cli.overlap == 4 { cli.overlap = loaded.detection.overlap.factor() as i64; }
            if cli.window == 512 { cli.window = loaded.analysis.window_size; }
            if cli.format == OutputFormat::Text { cli.format = loaded.output.format; }
            cfg = loaded;
        } else {
            log::warn!("Failed to load config from {}", path.display());
        }
    }

    log::info!("bufonset {}", env!("CARGO_PKG_VERSION"));

    // Every value goes through the store's setters so it is clamped once, here.
    let params = Arc::new(ParameterStore::new());
    params.set_method(&cli.mode);
    params.set_threshold(cli.thresh);
    params.set_silence_db(cli.silence);
    params.set_min_interval_ms(cli.mininterval);
    params.set_overlap(cli.overlap);

    if let Some(ref path) = cli.save_params {
        cfg.detection = params.snapshot();
        cfg.analysis.window_size = cli.window;
        cfg.output.format = cli.format;
        config::save_config(path, &cfg)?;
        log::info!("Saved parameters to {}", path.display());
    }

    if cli.inputs.is_empty() {
        if cli.save_params.is_some() {
            return Ok(());
        }
        anyhow::bail!("At least one input audio file is required");
    }

    // 1. Decode all inputs into the registry
    let registry = Arc::new(BufferRegistry::new());
    let names = load_buffers(&registry, &cli.inputs)?;

    if cli.info {
        let infos: Vec<BufferInfo> = names.iter().filter_map(|n| registry.info(n)).collect();
        match cli.format {
            OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&infos)?),
            OutputFormat::Text => {
                for info in &infos {
                    println!(
                        "{}: {} frames, {} channels, {} Hz ({})",
                        info.name,
                        info.frame_count,
                        info.channel_count,
                        info.sample_rate,
                        info.source.as_deref().unwrap_or("-")
                    );
                }
            }
        }
        return Ok(());
    }

    // 2. Analyse each buffer in turn on the deferred queue
    let controller = Arc::new(
        AnalysisController::new(registry.clone(), params.clone())
            .with_window_size(cli.window)
            .with_max_onsets(cfg.analysis.max_onsets),
    );
    let events = controller.subscribe();
    let scheduler = Scheduler::new("bufonset-analysis").context("Failed to start analysis queue")?;

    let pb = if names.len() > 1 {
        let pb = ProgressBar::new(names.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} buffers")?
                .progress_chars("=>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut reports = Vec::with_capacity(names.len());
    for name in &names {
        controller.bind(name);
        controller.trigger(&scheduler)?;

        let mut report = BufferReport {
            buffer: name.clone(),
            onsets: Vec::new(),
            error: None,
        };
        loop {
            match events.recv().context("Analysis queue stopped unexpectedly")? {
                AnalysisEvent::Onsets(onsets) => report.onsets = onsets,
                AnalysisEvent::NoOnsets => {}
                AnalysisEvent::Failed(err) => report.error = Some(err),
                AnalysisEvent::Done => break,
            }
        }
        if let Some(ref pb) = pb {
            pb.inc(1);
        }
        reports.push(report);
    }

    if let Some(pb) = pb {
        pb.finish_with_message("Analysis complete");
    }
    scheduler.shutdown();
    controller.teardown();

    // 3. Print
    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&reports)?),
        OutputFormat::Text => {
            for report in &reports {
                if let Some(ref err) = report.error {
                    println!("{}: error: {}", report.buffer, err);
                } else if report.onsets.is_empty() {
                    println!("{}: no onsets found", report.buffer);
                } else {
                    let times: Vec<String> = report.onsets.iter().map(|t| format!("{:.3}", t)).collect();
                    println!("{}: {}", report.buffer, times.join(" "));
                }
            }
        }
    }

    Ok(())
}

/// Decode `inputs` in parallel and store each under its file stem.
/// Returns the buffer names in input order, skipping files that failed.
fn load_buffers(registry: &BufferRegistry, inputs: &[PathBuf]) -> Result<Vec<String>> {
    log::info!("Decoding {} file(s)...", inputs.len());
    let decoded: Vec<_> = inputs
        .par_iter()
        .map(|path| (path, decode::decode_audio(path)))
        .collect();

    let mut names = Vec::with_capacity(decoded.len());
    for (path, result) in decoded {
        match result {
            Ok(data) => {
                let name = decode::buffer_name(path);
                if registry.info(&name).is_some() {
                    log::warn!("Buffer '{}' loaded twice, keeping {}", name, path.display());
                } else {
                    names.push(name.clone());
                }
                registry.insert(&name, data);
            }
            Err(err) => log::error!("{}: {:#}", path.display(), err),
        }
    }

    if names.is_empty() {
        anyhow::bail!("No input could be decoded");
    }
    Ok(names)
}
