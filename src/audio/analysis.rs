use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};

use super::decode::AudioData;
use super::features::{GlobalAnalysis, RawFeatures, SmoothedLevels};
use super::smoothing::Smoother;
use crate::config::{AnalysisMode, Config};
use crate::error::{Result, Stage, VizError};

/// Width of the moving average across neighbouring spectrum bands.
const BAND_BLUR_TAPS: usize = 9;

/// Two-pass analysis: per-frame extraction, then smoothing and normalization.
pub fn analyze(audio: &AudioData, config: &Config) -> Result<(GlobalAnalysis, SmoothedLevels)> {
    let fps = config.output.fps;
    let extractor = Extractor::new(config, audio.sample_rate)?;

    let frames = audio.total_frames(fps);
    log::info!("Pass 1: Per-frame band analysis ({} frames, {:?} mode)...", frames, extractor.mode);
    let raw = extractor.extract(&audio.samples, frames)?;

    if raw.is_empty() {
        return Err(VizError::input("audio has no length, nothing to render"));
    }

    let peak_energy = raw.energy.iter().copied().fold(0.0f32, f32::max);
    let mean_energy = raw.energy.iter().sum::<f32>() / raw.len() as f32;
    let global = GlobalAnalysis {
        sample_rate: audio.sample_rate,
        total_samples: audio.samples.len(),
        duration: audio.duration(),
        total_frames: raw.len(),
        peak_energy,
        mean_energy,
    };
    log::info!(
        "Global: {} samples @ {} Hz, peak_energy={:.4}, mean_energy={:.4}, duration={:.2}s",
        global.total_samples, global.sample_rate, global.peak_energy, global.mean_energy, global.duration
    );

    let smoother = Smoother::new(&config.audio, fps);
    log::info!(
        "Pass 2: Smoothing & normalization (alpha={:.3}, max_step={:.3})...",
        smoother.alpha(),
        smoother.max_step()
    );
    let level = smoother.smooth(&raw.energy);
    let bands = raw.bands.as_deref().map(|b| smoother.smooth_bands(b));

    Ok((global, SmoothedLevels { level, bands }))
}

/// Turns a waveform into one raw feature value per output frame.
#[derive(Clone, Debug)]
pub struct Extractor {
    sample_rate: u32,
    fps: u32,
    window_sec: f32,
    low_hz: f32,
    high_hz: f32,
    mode: AnalysisMode,
    spokes: usize,
}

impl Extractor {
    pub fn new(config: &Config, sample_rate: u32) -> Result<Self> {
        let audio = &config.audio;
        let nyquist = sample_rate as f32 / 2.0;
        if sample_rate == 0 {
            return Err(VizError::config("sample rate must be positive"));
        }
        if !(audio.low_hz >= 0.0 && audio.high_hz <= nyquist && audio.low_hz < audio.high_hz) {
            return Err(VizError::config(format!(
                "frequency band [{}, {}] Hz outside [0, {}] Hz",
                audio.low_hz, audio.high_hz, nyquist
            )));
        }
        Ok(Self {
            sample_rate,
            fps: config.output.fps,
            window_sec: audio.window_sec,
            low_hz: audio.low_hz,
            high_hz: audio.high_hz,
            mode: audio.mode,
            spokes: config.ring.spokes,
        })
    }

    /// Sample range of the analysis window centered on `frame_idx`, clamped to the waveform.
    ///
    /// A center past the end (the last frame after resampling shortened the buffer)
    /// is pinned to the end, leaving a half window.
    pub fn window_bounds(&self, frame_idx: usize, num_samples: usize) -> (usize, usize) {
        let window_len = ((self.sample_rate as f32 * self.window_sec).round() as usize).max(1);
        let half = window_len / 2;
        let center = ((frame_idx as u64 * self.sample_rate as u64 / self.fps as u64) as usize)
            .min(num_samples);
        let start = center.saturating_sub(half).min(num_samples);
        let end = (center + (window_len - half)).min(num_samples);
        (start, end)
    }

    /// One raw value per frame for `frames` frames.
    pub fn extract(&self, samples: &[f32], frames: usize) -> Result<RawFeatures> {
        if frames == 0 || samples.is_empty() {
            return Ok(RawFeatures::default());
        }

        let edges = match self.mode {
            AnalysisMode::Energy => None,
            AnalysisMode::Spectrum => Some(band_edges(
                self.sample_rate,
                self.low_hz,
                self.high_hz,
                self.spokes,
            )),
        };

        let per_frame: Vec<(f32, Option<Vec<f32>>)> = (0..frames)
            .into_par_iter()
            .map_init(FftPlanner::<f32>::new, |planner, frame_idx| {
                let (start, end) = self.window_bounds(frame_idx, samples.len());
                let slice = &samples[start..end];
                match edges.as_deref() {
                    None => (
                        band_energy(planner, slice, self.sample_rate, self.low_hz, self.high_hz),
                        None,
                    ),
                    Some(edges) => {
                        let spectrum = Spectrum::compute(planner, slice, self.sample_rate);
                        (
                            spectrum.band_energy(self.low_hz, self.high_hz),
                            Some(spectrum.band_levels(edges)),
                        )
                    }
                }
            })
            .collect();

        if let Some(frame) = per_frame.iter().position(|(e, _)| !e.is_finite()) {
            return Err(VizError::render(
                Stage::Extraction,
                frame,
                "band energy is not a finite number",
            ));
        }

        let mut energy = Vec::with_capacity(frames);
        let mut bands = edges.as_ref().map(|_| Vec::with_capacity(frames));
        for (e, b) in per_frame {
            energy.push(e);
            if let (Some(all), Some(levels)) = (bands.as_mut(), b) {
                all.push(levels);
            }
        }

        Ok(RawFeatures { energy, bands })
    }
}

/// Band-limited RMS of `slice` between `low_hz` and `high_hz`.
///
/// Normalized by the window power, so a full-scale sine in band reads 1/sqrt(2)
/// for any slice length. Slices shorter than two samples read 0.
pub fn band_energy(
    planner: &mut FftPlanner<f32>,
    slice: &[f32],
    sample_rate: u32,
    low_hz: f32,
    high_hz: f32,
) -> f32 {
    Spectrum::compute(planner, slice, sample_rate).band_energy(low_hz, high_hz)
}

/// One-sided magnitude spectrum of a Hann-windowed slice.
struct Spectrum {
    magnitudes: Vec<f32>,
    freq_resolution: f32,
    /// N * sum(w^2), scales |X|^2 back to signal power.
    power_norm: f32,
}

impl Spectrum {
    fn compute(planner: &mut FftPlanner<f32>, slice: &[f32], sample_rate: u32) -> Self {
        let n = slice.len();
        if n < 2 {
            return Self {
                magnitudes: Vec::new(),
                freq_resolution: 0.0,
                power_norm: 0.0,
            };
        }

        let hann = hann_window(n);
        let mut buffer: Vec<Complex<f32>> = slice
            .iter()
            .zip(hann.iter())
            .map(|(&s, &w)| Complex::new(s * w, 0.0))
            .collect();

        let fft = planner.plan_fft_forward(n);
        fft.process(&mut buffer);

        let half = n / 2 + 1;
        let magnitudes = buffer[..half].iter().map(|c| c.norm()).collect();
        let window_power: f32 = hann.iter().map(|w| w * w).sum();

        Self {
            magnitudes,
            freq_resolution: sample_rate as f32 / n as f32,
            power_norm: n as f32 * window_power,
        }
    }

    fn band_energy(&self, low_hz: f32, high_hz: f32) -> f32 {
        if self.power_norm <= 1e-12 {
            return 0.0;
        }
        let power: f32 = self
            .magnitudes
            .iter()
            .enumerate()
            .filter(|(k, _)| {
                let f = *k as f32 * self.freq_resolution;
                f >= low_hz && f <= high_hz
            })
            .map(|(_, &m)| m * m)
            .sum();
        (2.0 * power / self.power_norm).sqrt()
    }

    /// Log-compressed magnitude per band, blurred across neighbours and scaled to the frame's peak.
    fn band_levels(&self, edges: &[f32]) -> Vec<f32> {
        let bands = edges.len() - 1;
        let mut out = vec![0.0f32; bands];
        let (lo, hi) = (edges[0], edges[bands]);

        for (k, &mag) in self.magnitudes.iter().enumerate() {
            let f = k as f32 * self.freq_resolution;
            if f < lo || f > hi {
                continue;
            }
            let idx = edges.partition_point(|&e| e <= f).saturating_sub(1).min(bands - 1);
            out[idx] += mag;
        }

        for v in out.iter_mut() {
            *v = v.ln_1p();
        }

        if bands >= BAND_BLUR_TAPS {
            out = blur_edge_padded(&out, BAND_BLUR_TAPS);
        }

        let peak = out.iter().copied().fold(0.0f32, f32::max);
        if peak > 1e-8 {
            for v in out.iter_mut() {
                *v /= peak;
            }
        }
        out
    }
}

/// Geometrically spaced band edges, `bands + 1` values, kept strictly inside (1 Hz, nyquist).
pub fn band_edges(sample_rate: u32, low_hz: f32, high_hz: f32, bands: usize) -> Vec<f32> {
    let nyquist = sample_rate as f32 / 2.0;
    let hi = high_hz.min(nyquist - 1.0);
    let lo = low_hz.min(hi - 1.0).max(1.0);
    let hi = if hi <= lo { lo + 1.0 } else { hi };

    let bands = bands.max(1);
    let ratio = (hi / lo).ln();
    (0..=bands)
        .map(|i| lo * (ratio * i as f32 / bands as f32).exp())
        .collect()
}

/// Centered moving average of width `taps`, repeating the edge values.
fn blur_edge_padded(values: &[f32], taps: usize) -> Vec<f32> {
    let pad = taps / 2;
    let last = values.len() - 1;
    (0..values.len())
        .map(|i| {
            let sum: f32 = (0..taps)
                .map(|t| {
                    let j = (i + t).saturating_sub(pad).min(last);
                    values[j]
                })
                .sum();
            sum / taps as f32
        })
        .collect()
}

fn hann_window(size: usize) -> Vec<f32> {
    (0..size)
        .map(|i| {
            0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (size - 1) as f32).cos())
        })
        .collect()
}
