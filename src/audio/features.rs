/// Per-frame analysis output (extraction pass), one entry per frame index.
#[derive(Clone, Debug, Default)]
pub struct RawFeatures {
    /// Band-limited RMS per frame. Not normalized.
    pub energy: Vec<f32>,
    /// Per-spoke band levels (0.0-1.0 within each frame). Spectrum mode only.
    pub bands: Option<Vec<Vec<f32>>>,
}

impl RawFeatures {
    pub fn len(&self) -> usize {
        self.energy.len()
    }

    pub fn is_empty(&self) -> bool {
        self.energy.is_empty()
    }
}

/// Smoothed and normalized per-frame levels, ready for ring geometry.
#[derive(Clone, Debug, Default)]
pub struct SmoothedLevels {
    /// Global level per frame (0.0-1.0)
    pub level: Vec<f32>,
    /// Per-spoke levels per frame (0.0-1.0), when analysing in spectrum mode
    pub bands: Option<Vec<Vec<f32>>>,
}

impl SmoothedLevels {
    pub fn len(&self) -> usize {
        self.level.len()
    }
}

/// Summary of the whole track, logged once before rendering.
#[derive(Clone, Debug)]
pub struct GlobalAnalysis {
    pub sample_rate: u32,
    pub total_samples: usize,
    pub duration: f32,
    pub total_frames: usize,
    pub peak_energy: f32,
    pub mean_energy: f32,
}

/// Number of output frames: ceil(samples / sample_rate * fps), computed exactly.
pub fn total_frames(num_samples: usize, sample_rate: u32, fps: u32) -> usize {
    if sample_rate == 0 {
        return 0;
    }
    let num = num_samples as u64 * fps as u64;
    let den = sample_rate as u64;
    ((num + den - 1) / den) as usize
}
