use anyhow::{Context, Result};
use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use bufonset::BufferData;

/// First decodable track of an opened file.
struct OpenTrack {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    channels: usize,
    sample_rate: u32,
}

fn open_track(path: &Path) -> Result<OpenTrack> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let format = symphonia::default::get_probe()
        .format(
            &hint,
            MediaSourceStream::new(Box::new(file), Default::default()),
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("Unrecognised audio format: {}", path.display()))?
        .format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .context("No audio tracks found")?;
    let decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .context("Failed to create audio decoder")?;

    Ok(OpenTrack {
        track_id: track.id,
        channels: track.codec_params.channels.map_or(0, |c| c.count()),
        sample_rate: track.codec_params.sample_rate.context("Unknown sample rate")?,
        format,
        decoder,
    })
}

/// Decode an audio file into an interleaved buffer, keeping all channels.
/// The buffer's source is the file name.
pub fn decode_audio(path: &Path) -> Result<BufferData> {
    let mut track = open_track(path)?;
    let mut samples: Vec<f32> = Vec::new();

    loop {
        let packet = match track.format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(ref e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track.track_id {
            continue;
        }

        let decoded = match track.decoder.decode(&packet) {
            Ok(decoded) => decoded,
            // Corrupt packet: skip it, keep the rest of the stream.
            Err(SymphoniaError::DecodeError(err)) => {
                log::debug!("{}: skipping packet: {}", path.display(), err);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        if track.channels == 0 {
            track.channels = spec.channels.count();
        }
        let mut buf = SampleBuffer::<f32>::new(decoded.frames() as u64, spec);
        buf.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buf.samples());
    }

    let channels = track.channels.max(1);
    let frames = samples.len() / channels;
    log::info!(
        "{}: {} frames x {} channels at {} Hz ({:.2}s)",
        path.display(),
        frames,
        channels,
        track.sample_rate,
        frames as f64 / track.sample_rate as f64
    );

    let source = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    Ok(BufferData::new(samples, channels, track.sample_rate).with_source(source))
}

/// Buffer name for a decoded file: its stem, e.g. `drumloop` for `drumloop.wav`.
pub fn buffer_name(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
