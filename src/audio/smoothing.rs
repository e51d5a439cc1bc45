use crate::config::AudioConfig;

/// Peaks below this are treated as silence.
pub const SILENCE_FLOOR: f32 = 1e-8;

/// Bidirectional EMA, peak normalization, then a per-frame slew limit.
///
/// The EMA time constant is `window_sec * smoothing`, so a wider analysis
/// window also yields a calmer envelope. The slew limit bounds the change of
/// the normalized level between neighbouring frames to `max_step`.
#[derive(Clone, Copy, Debug)]
pub struct Smoother {
    alpha: f32,
    max_step: f32,
}

impl Smoother {
    pub fn new(audio: &AudioConfig, fps: u32) -> Self {
        let tau = audio.window_sec * audio.smoothing;
        let dt = 1.0 / fps.max(1) as f32;
        let alpha = if tau > 0.0 { 1.0 - (-dt / tau).exp() } else { 1.0 };
        Self {
            alpha,
            max_step: audio.max_step,
        }
    }

    /// EMA coefficient per frame (1.0 = no smoothing).
    pub fn alpha(&self) -> f32 {
        self.alpha
    }

    /// Upper bound on |y[i] - y[i-1]| of the output.
    pub fn max_step(&self) -> f32 {
        self.max_step
    }

    /// Smooth a raw, unnormalized sequence into levels in [0, 1].
    pub fn smooth(&self, raw: &[f32]) -> Vec<f32> {
        let envelope = bidirectional_ema(raw, self.alpha);
        let normalized = normalize_peak(&envelope);
        limit_slew(&normalized, self.max_step)
    }

    /// Smooth each band track over time. Input levels are already in [0, 1] per frame.
    pub fn smooth_bands(&self, frames: &[Vec<f32>]) -> Vec<Vec<f32>> {
        let Some(first) = frames.first() else {
            return Vec::new();
        };
        let num_bands = first.len();
        let mut out = vec![vec![0.0f32; num_bands]; frames.len()];

        for band in 0..num_bands {
            let track: Vec<f32> = frames
                .iter()
                .map(|f| f.get(band).copied().unwrap_or(0.0).clamp(0.0, 1.0))
                .collect();
            let smoothed = limit_slew(&bidirectional_ema(&track, self.alpha), self.max_step);
            for (frame, value) in out.iter_mut().zip(smoothed) {
                frame[band] = value;
            }
        }
        out
    }
}

/// Average of a forward and a backward exponential moving average.
fn bidirectional_ema(raw: &[f32], alpha: f32) -> Vec<f32> {
    let n = raw.len();
    if n == 0 {
        return Vec::new();
    }

    let mut forward = vec![0.0f32; n];
    forward[0] = raw[0];
    for i in 1..n {
        forward[i] = alpha * raw[i] + (1.0 - alpha) * forward[i - 1];
    }

    let mut backward = vec![0.0f32; n];
    backward[n - 1] = raw[n - 1];
    for i in (0..n - 1).rev() {
        backward[i] = alpha * raw[i] + (1.0 - alpha) * backward[i + 1];
    }

    forward
        .iter()
        .zip(backward.iter())
        .map(|(f, b)| (f + b) * 0.5)
        .collect()
}

/// Scale so the peak is 1.0. Silent or all-zero input maps to a flat zero.
fn normalize_peak(values: &[f32]) -> Vec<f32> {
    let peak = values.iter().copied().fold(0.0f32, f32::max);
    if peak < SILENCE_FLOOR {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v / peak).clamp(0.0, 1.0)).collect()
}

fn limit_slew(values: &[f32], max_step: f32) -> Vec<f32> {
    let mut out = Vec::with_capacity(values.len());
    let mut prev: Option<f32> = None;
    for &v in values {
        let next = match prev {
            None => v,
            Some(p) => p + (v - p).clamp(-max_step, max_step),
        };
        out.push(next);
        prev = Some(next);
    }
    out
}
