use std::path::Path;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::DecoderOptions;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use super::features;
use super::resample::resample_channel;
use crate::error::{Result, VizError};

/// Mono waveform at a fixed sample rate.
///
/// Remembers the decoded length and rate, so duration and frame count stay those
/// of the source file after resampling.
#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    source_len: usize,
    source_rate: u32,
}

impl AudioData {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            source_len: samples.len(),
            source_rate: sample_rate,
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f32 {
        if self.source_rate == 0 {
            return 0.0;
        }
        (self.source_len as f64 / self.source_rate as f64) as f32
    }

    /// ceil(duration * fps) of the decoded audio.
    pub fn total_frames(&self, fps: u32) -> usize {
        features::total_frames(self.source_len, self.source_rate, fps)
    }

    /// Resample to `rate` unless the waveform is already there.
    pub fn resampled(self, rate: u32) -> Result<AudioData> {
        if self.sample_rate == rate {
            return Ok(self);
        }
        log::info!("Resampling {}Hz -> {}Hz...", self.sample_rate, rate);
        let samples = resample_channel(&self.samples, self.sample_rate, rate)?;
        Ok(AudioData {
            samples,
            sample_rate: rate,
            ..self
        })
    }
}

pub fn decode_audio(path: &Path) -> Result<AudioData> {
    let file = std::fs::File::open(path).map_err(|e| {
        VizError::input(format!("failed to open audio file {}: {}", path.display(), e))
    })?;

    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| {
            VizError::input(format!("unsupported audio format {}: {}", path.display(), e))
        })?;

    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != symphonia::core::codecs::CODEC_TYPE_NULL)
        .ok_or_else(|| VizError::input(format!("no audio tracks in {}", path.display())))?;

    let track_id = track.id;
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| VizError::input(format!("unknown sample rate in {}", path.display())))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| VizError::input(format!("failed to create audio decoder: {}", e)))?;

    let mut all_samples: Vec<f32> = Vec::new();

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(symphonia::core::errors::Error::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(e) => return Err(VizError::input(format!("failed to read audio packet: {}", e))),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(symphonia::core::errors::Error::DecodeError(err)) => {
                log::warn!("Skipping undecodable packet: {}", err);
                continue;
            }
            Err(e) => return Err(VizError::input(format!("failed to decode audio: {}", e))),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let num_frames = decoded.frames();

        let mut sample_buf = SampleBuffer::<f32>::new(num_frames as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);

        downmix_into(&mut all_samples, sample_buf.samples(), channels);
    }

    if all_samples.is_empty() {
        return Err(VizError::input(format!(
            "audio has no length: {}",
            path.display()
        )));
    }

    log::info!(
        "Decoded audio: {} samples, {}Hz, {:.1}s",
        all_samples.len(),
        sample_rate,
        all_samples.len() as f32 / sample_rate as f32
    );

    Ok(AudioData::new(all_samples, sample_rate))
}

/// Append interleaved samples to `out` as the per-frame channel mean.
fn downmix_into(out: &mut Vec<f32>, interleaved: &[f32], channels: usize) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    out.extend(
        interleaved
            .chunks(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
    );
}
