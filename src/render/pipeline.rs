use anyhow::{Context, Result};
use indicatif::ProgressBar;
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::background::Background;
use super::frame::FrameSynth;
use crate::config::RenderConfig;
use crate::encode::FrameSink;
use crate::error::VizError;

/// Upper bound on the automatic batch size. A 4K frame is about 33 MB once composited.
const MAX_AUTO_BATCH: usize = 16;

/// Frames per batch: the configured value, or 2 x threads capped at `MAX_AUTO_BATCH`.
fn batch_size(threads: usize, configured: usize) -> usize {
    if configured > 0 {
        configured
    } else {
        (threads.max(1) * 2).min(MAX_AUTO_BATCH)
    }
}

/// Shared flag checked once per frame index.
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Renders every frame in parallel batches and hands them to `sink` in index order.
///
/// Each batch holds `render.batch` frames (by default `2 * workers`, capped), which
/// bounds memory regardless of track length. A failing frame cancels the rest of its batch and aborts the
/// render; frames before it have already been written.
pub fn render_all(
    synth: &FrameSynth,
    background: &Background,
    sink: &mut dyn FrameSink,
    render: &RenderConfig,
    cancel: &CancelToken,
    pb: &ProgressBar,
) -> Result<()> {
    if background.dimensions() != synth.dimensions() {
        return Err(VizError::config(format!(
            "background is {:?} but frames are {:?}",
            background.dimensions(),
            synth.dimensions()
        ))
        .into());
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(render.workers)
        .build()
        .context("Failed to build render thread pool")?;
    let batch_size = batch_size(pool.current_num_threads(), render.batch);
    let total_frames = synth.total_frames();

    log::info!(
        "Rendering {} frames on {} workers (batch of {})",
        total_frames,
        pool.current_num_threads(),
        batch_size
    );

    let mut start = 0;
    while start < total_frames {
        let end = (start + batch_size).min(total_frames);

        let batch: Vec<Result<Vec<u8>, VizError>> = pool.install(|| {
            (start..end)
                .into_par_iter()
                .map(|frame_idx| {
                    if cancel.is_cancelled() {
                        return Err(VizError::Cancelled);
                    }
                    let frame = synth.render(frame_idx).inspect_err(|_| cancel.cancel())?;
                    Ok(background.composite(&frame))
                })
                .collect()
        });

        // Frames skipped after a sibling failed report Cancelled; keep the real failure.
        let mut failure: Option<VizError> = None;
        for (offset, frame) in batch.into_iter().enumerate() {
            match frame {
                Ok(pixels) if failure.is_none() => {
                    sink.write_frame(&pixels)?;
                    pb.set_position((start + offset) as u64 + 1);
                }
                Ok(_) => {}
                Err(VizError::Cancelled) => {
                    failure.get_or_insert(VizError::Cancelled);
                }
                Err(err) => {
                    if matches!(failure, None | Some(VizError::Cancelled)) {
                        failure = Some(err);
                    }
                }
            }
        }
        if let Some(err) = failure {
            return Err(err.into());
        }

        start = end;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::analysis;
    use crate::audio::decode::AudioData;
    use crate::audio::features::SmoothedLevels;
    use crate::config::Config;
    use crate::error::Stage;
    use crate::render::ring::Levels;
    use std::f32::consts::PI;

    const SR: u32 = 44100;

    fn scenario_config() -> Config {
        let mut cfg = Config::default();
        cfg.output.width = 128;
        cfg.output.height = 96;
        cfg.output.fps = 60;
        cfg.ring.center_x = Some(64.0);
        cfg.ring.center_y = Some(48.0);
        cfg.ring.base_radius = 16.0;
        cfg.ring.bar_min = 4.0;
        cfg.ring.bar_max_extra = 20.0;
        cfg.ring.spokes = 8;
        cfg.audio.window_sec = 0.1;
        cfg.audio.sample_rate = SR;
        cfg
    }

    fn sine(freq: f32, seconds: f32) -> AudioData {
        let n = (SR as f32 * seconds) as usize;
        AudioData::new(
            (0..n)
                .map(|i| (2.0 * PI * freq * i as f32 / SR as f32).sin())
                .collect(),
            SR,
        )
    }

    fn workers_config(workers: usize) -> RenderConfig {
        RenderConfig { workers, batch: 0 }
    }

    fn render_to_vec(cfg: &Config, audio: &AudioData, workers: usize) -> Vec<Vec<u8>> {
        let (_, levels) = analysis::analyze(audio, cfg).unwrap();
        let synth = FrameSynth::from_config(levels, cfg);
        let background = Background::solid(cfg.output.width, cfg.output.height, [10, 10, 40]);
        let mut frames: Vec<Vec<u8>> = Vec::new();
        render_all(
            &synth,
            &background,
            &mut frames,
            &workers_config(workers),
            &CancelToken::new(),
            &ProgressBar::hidden(),
        )
        .unwrap();
        frames
    }

    #[test]
    fn silent_second_renders_sixty_minimal_frames() {
        let cfg = scenario_config();
        let audio = AudioData::new(vec![0.0; SR as usize], SR);
        let (global, levels) = analysis::analyze(&audio, &cfg).unwrap();
        assert_eq!(global.total_frames, 60);
        assert_eq!(levels.len(), 60);
        assert!(levels.level.iter().all(|&v| v == 0.0));

        let synth = FrameSynth::from_config(levels, &cfg);
        for idx in 0..60 {
            let segs = synth.segments(idx).unwrap();
            assert_eq!(segs.len(), 8);
            for (k, seg) in segs.iter().enumerate() {
                assert!((seg.length() - 4.0).abs() < 1e-4);
                let angle = (seg.outer.y - seg.inner.y)
                    .atan2(seg.outer.x - seg.inner.x)
                    .to_degrees()
                    .rem_euclid(360.0);
                let expected = k as f32 * 45.0;
                let diff = (angle - expected).abs();
                assert!(diff < 1e-2 || (360.0 - diff) < 1e-2, "spoke {} at {}°", k, angle);
            }
        }

        let frames = render_to_vec(&cfg, &audio, 2);
        assert_eq!(frames.len(), 60);
        assert!(frames.iter().all(|f| f.len() == 128 * 96 * 4));
    }

    #[test]
    fn steady_sine_converges_to_full_level() {
        let cfg = scenario_config();
        let (_, levels) = analysis::analyze(&sine(1000.0, 1.0), &cfg).unwrap();
        assert_eq!(levels.len(), 60);
        for (i, &v) in levels.level.iter().enumerate().skip(6) {
            assert!(v > 0.97 && v <= 1.0, "frame {} level {}", i, v);
        }
    }

    #[test]
    fn rendering_twice_is_byte_identical() {
        let mut cfg = scenario_config();
        cfg.glow.enabled = true;
        cfg.glow.steps = 3;
        let mut audio = sine(220.0, 0.5);
        for s in audio.samples.iter_mut().skip(SR as usize / 4) {
            *s *= 0.2;
        }
        let first = render_to_vec(&cfg, &audio, 3);
        let second = render_to_vec(&cfg, &audio, 1);
        assert_eq!(first.len(), 30);
        assert_eq!(first, second);
    }

    #[test]
    fn spectrum_mode_renders_per_spoke_lengths() {
        let mut cfg = scenario_config();
        cfg.audio.mode = crate::config::AnalysisMode::Spectrum;
        let (_, levels) = analysis::analyze(&sine(440.0, 0.5), &cfg).unwrap();
        let bands = levels.bands.as_ref().expect("spectrum levels");
        assert_eq!(bands.len(), 30);
        assert!(bands.iter().all(|b| b.len() == 8));

        let synth = FrameSynth::from_config(levels.clone(), &cfg);
        let lengths: Vec<f32> = synth.segments(15).unwrap().iter().map(|s| s.length()).collect();
        let spread = lengths.iter().copied().fold(0.0f32, f32::max)
            - lengths.iter().copied().fold(f32::MAX, f32::min);
        assert!(spread > 1.0, "lengths {:?}", lengths);
    }

    #[test]
    fn cancelled_render_stops_without_writing() {
        let cfg = scenario_config();
        let levels = SmoothedLevels {
            level: vec![0.5; 20],
            bands: None,
        };
        let synth = FrameSynth::from_config(levels, &cfg);
        let background = Background::solid(128, 96, [0, 0, 0]);
        let cancel = CancelToken::new();
        cancel.cancel();

        let mut frames: Vec<Vec<u8>> = Vec::new();
        let err = render_all(&synth, &background, &mut frames, &workers_config(2), &cancel, &ProgressBar::hidden())
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<VizError>(), Some(VizError::Cancelled)));
        assert!(frames.is_empty());
    }

    #[test]
    fn first_bad_frame_aborts_the_render() {
        let cfg = scenario_config();
        let mut level = vec![0.5; 12];
        level[7] = f32::NAN;
        level[9] = f32::INFINITY;
        let synth = FrameSynth::from_config(SmoothedLevels { level, bands: None }, &cfg);
        let background = Background::solid(128, 96, [0, 0, 0]);

        let mut frames: Vec<Vec<u8>> = Vec::new();
        let err = render_all(&synth, &background, &mut frames, &workers_config(4), &CancelToken::new(), &ProgressBar::hidden())
            .unwrap_err();
        match err.downcast_ref::<VizError>() {
            Some(VizError::Render { frame, stage, .. }) => {
                assert_eq!(*frame, 7);
                assert_eq!(*stage, Stage::Smoothing);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert!(frames.len() <= 7);
    }

    #[test]
    fn mismatched_background_is_rejected() {
        let cfg = scenario_config();
        let synth = FrameSynth::from_config(SmoothedLevels { level: vec![0.0], bands: None }, &cfg);
        let background = Background::solid(64, 64, [0, 0, 0]);
        let mut frames: Vec<Vec<u8>> = Vec::new();
        assert!(render_all(&synth, &background, &mut frames, &workers_config(1), &CancelToken::new(), &ProgressBar::hidden()).is_err());
    }

    #[test]
    fn uniform_level_reaches_every_spoke() {
        let cfg = scenario_config();
        let synth = FrameSynth::from_config(SmoothedLevels { level: vec![1.0], bands: None }, &cfg);
        let segs = synth.segments(0).unwrap();
        let expected = crate::render::ring::RingGeometry::from_config(&cfg).segments(Levels::Uniform(1.0));
        assert_eq!(segs, expected);
    }

    #[test]
    fn batch_size_is_capped_unless_configured() {
        assert_eq!(batch_size(1, 0), 2);
        assert_eq!(batch_size(4, 0), 8);
        assert_eq!(batch_size(64, 0), MAX_AUTO_BATCH);
        assert_eq!(batch_size(64, 3), 3);
    }

    #[test]
    fn small_batches_keep_frame_order() {
        let cfg = scenario_config();
        let audio = sine(220.0, 0.5);
        let (_, levels) = analysis::analyze(&audio, &cfg).unwrap();
        let synth = FrameSynth::from_config(levels, &cfg);
        let background = Background::solid(128, 96, [10, 10, 40]);

        let mut frames: Vec<Vec<u8>> = Vec::new();
        let render = RenderConfig { workers: 3, batch: 1 };
        render_all(&synth, &background, &mut frames, &render, &CancelToken::new(), &ProgressBar::hidden())
            .unwrap();
        assert_eq!(frames, render_to_vec(&cfg, &audio, 2));
    }
}
