use anyhow::Context;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{Result, VizError};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub ring: RingConfig,
    #[serde(default)]
    pub glow: GlowConfig,
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub encode: EncodeConfig,
    #[serde(default)]
    pub render: RenderConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_height")]
    pub height: u32,
    #[serde(default = "default_fps")]
    pub fps: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RingConfig {
    /// Ring center in pixels. Defaults to (width / 2, height / 2.5).
    #[serde(default)]
    pub center_x: Option<f32>,
    #[serde(default)]
    pub center_y: Option<f32>,
    #[serde(default = "default_base_radius")]
    pub base_radius: f32,
    #[serde(default = "default_spokes")]
    pub spokes: usize,
    #[serde(default = "default_bar_thickness")]
    pub bar_thickness: f32,
    #[serde(default = "default_bar_min")]
    pub bar_min: f32,
    #[serde(default = "default_bar_max_extra")]
    pub bar_max_extra: f32,
    /// Exponent applied to the level before mapping to length. 1.0 is linear.
    #[serde(default = "default_response")]
    pub response: f32,
    #[serde(default = "default_true")]
    pub base_ring: bool,
    #[serde(default = "default_base_ring_width")]
    pub base_ring_width: f32,
    #[serde(default = "default_ring_alpha")]
    pub ring_alpha: u8,
    #[serde(default = "default_color")]
    pub color: [u8; 3],
}

#[derive(Debug, Clone, Deserialize)]
pub struct GlowConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub steps: u32,
    #[serde(default = "default_glow_alpha")]
    pub alpha: u8,
    #[serde(default = "default_glow_expand")]
    pub expand: f32,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisMode {
    /// One band energy per frame drives every spoke.
    #[default]
    Energy,
    /// One log-spaced band per spoke.
    Spectrum,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    #[serde(default = "default_window_sec")]
    pub window_sec: f32,
    #[serde(default = "default_low_hz")]
    pub low_hz: f32,
    #[serde(default = "default_high_hz")]
    pub high_hz: f32,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Multiplier on `window_sec` giving the smoothing time constant. 0 disables it.
    #[serde(default = "default_smoothing")]
    pub smoothing: f32,
    /// Largest allowed change of the normalized level between two frames. Below 1.0.
    #[serde(default = "default_max_step")]
    pub max_step: f32,
    #[serde(default)]
    pub mode: AnalysisMode,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EncodeConfig {
    #[serde(default = "default_codec")]
    pub codec: String,
    #[serde(default = "default_pix_fmt")]
    pub pix_fmt: String,
    /// Video bitrate (e.g. 12M). When unset, `crf` is used instead.
    #[serde(default = "default_bitrate")]
    pub bitrate: Option<String>,
    #[serde(default = "default_crf")]
    pub crf: u32,
    #[serde(default = "default_preset")]
    pub preset: String,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,
    #[serde(default = "default_threads")]
    pub threads: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderConfig {
    /// Frame synthesis workers. 0 uses rayon's default.
    #[serde(default)]
    pub workers: usize,
    /// Frames rendered and held in memory per batch. 0 picks 2 x workers, capped.
    #[serde(default)]
    pub batch: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps: default_fps(),
        }
    }
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            center_x: None,
            center_y: None,
            base_radius: default_base_radius(),
            spokes: default_spokes(),
            bar_thickness: default_bar_thickness(),
            bar_min: default_bar_min(),
            bar_max_extra: default_bar_max_extra(),
            response: default_response(),
            base_ring: true,
            base_ring_width: default_base_ring_width(),
            ring_alpha: default_ring_alpha(),
            color: default_color(),
        }
    }
}

impl Default for GlowConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            steps: 0,
            alpha: default_glow_alpha(),
            expand: default_glow_expand(),
        }
    }
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            window_sec: default_window_sec(),
            low_hz: default_low_hz(),
            high_hz: default_high_hz(),
            sample_rate: default_sample_rate(),
            smoothing: default_smoothing(),
            max_step: default_max_step(),
            mode: AnalysisMode::default(),
        }
    }
}

impl Default for EncodeConfig {
    fn default() -> Self {
        Self {
            codec: default_codec(),
            pix_fmt: default_pix_fmt(),
            bitrate: default_bitrate(),
            crf: default_crf(),
            preset: default_preset(),
            audio_codec: default_audio_codec(),
            audio_bitrate: default_audio_bitrate(),
            threads: default_threads(),
        }
    }
}

fn default_width() -> u32 { 3840 }
fn default_height() -> u32 { 2160 }
fn default_fps() -> u32 { 60 }
fn default_base_radius() -> f32 { 220.0 }
fn default_spokes() -> usize { 360 }
fn default_bar_thickness() -> f32 { 2.0 }
fn default_bar_min() -> f32 { 4.0 }
fn default_bar_max_extra() -> f32 { 70.0 }
fn default_response() -> f32 { 1.0 }
fn default_true() -> bool { true }
fn default_base_ring_width() -> f32 { 1.0 }
fn default_ring_alpha() -> u8 { 160 }
fn default_color() -> [u8; 3] { [255, 255, 255] }
fn default_glow_alpha() -> u8 { 80 }
fn default_glow_expand() -> f32 { 2.0 }
fn default_window_sec() -> f32 { 0.10 }
fn default_low_hz() -> f32 { 30.0 }
fn default_high_hz() -> f32 { 12000.0 }
fn default_sample_rate() -> u32 { 44100 }
fn default_smoothing() -> f32 { 1.0 }
fn default_max_step() -> f32 { 0.25 }
fn default_codec() -> String { "libx264".into() }
fn default_pix_fmt() -> String { "yuv420p".into() }
fn default_bitrate() -> Option<String> { Some("12M".into()) }
fn default_crf() -> u32 { 18 }
fn default_preset() -> String { "medium".into() }
fn default_audio_codec() -> String { "aac".into() }
fn default_audio_bitrate() -> String { "192k".into() }
fn default_threads() -> u32 { 4 }

impl Config {
    /// Ring center, falling back to (width / 2, height / 2.5).
    pub fn center(&self) -> (f32, f32) {
        let cx = self
            .ring
            .center_x
            .unwrap_or((self.output.width / 2) as f32);
        let cy = self
            .ring
            .center_y
            .unwrap_or(self.output.height as f32 / 2.5);
        (cx, cy)
    }

    /// Check every knob the core consumes. Runs once, before any audio is analyzed.
    pub fn validate(&self) -> Result<()> {
        let out = &self.output;
        if out.width == 0 || out.height == 0 {
            return Err(VizError::config(format!(
                "resolution must be positive, got {}x{}",
                out.width, out.height
            )));
        }
        if out.fps == 0 {
            return Err(VizError::config("fps must be positive"));
        }

        let ring = &self.ring;
        if ring.spokes == 0 {
            return Err(VizError::config("spokes must be at least 1"));
        }
        for (name, value) in [
            ("base_radius", ring.base_radius),
            ("bar_min", ring.bar_min),
            ("bar_max_extra", ring.bar_max_extra),
            ("base_ring_width", ring.base_ring_width),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(VizError::config(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if !ring.bar_thickness.is_finite() || ring.bar_thickness <= 0.0 {
            return Err(VizError::config(format!(
                "bar_thickness must be positive, got {}",
                ring.bar_thickness
            )));
        }
        if !ring.response.is_finite() || ring.response <= 0.0 {
            return Err(VizError::config(format!(
                "response must be positive, got {}",
                ring.response
            )));
        }

        let outer = ring.base_radius + ring.bar_min + ring.bar_max_extra;
        let half = out.width.min(out.height) as f32 / 2.0;
        if outer > half {
            return Err(VizError::config(format!(
                "ring reaches {:.1}px (base_radius + bar_min + bar_max_extra) but only {:.1}px fit in {}x{}",
                outer, half, out.width, out.height
            )));
        }

        let (cx, cy) = self.center();
        if !(0.0..=out.width as f32).contains(&cx) || !(0.0..=out.height as f32).contains(&cy) {
            return Err(VizError::config(format!(
                "ring center ({:.1}, {:.1}) lies outside the {}x{} canvas",
                cx, cy, out.width, out.height
            )));
        }

        if self.glow.enabled && (!self.glow.expand.is_finite() || self.glow.expand < 0.0) {
            return Err(VizError::config(format!(
                "glow expand must be non-negative, got {}",
                self.glow.expand
            )));
        }

        let audio = &self.audio;
        if audio.sample_rate == 0 {
            return Err(VizError::config("analysis sample_rate must be positive"));
        }
        if !audio.window_sec.is_finite() || audio.window_sec <= 0.0 {
            return Err(VizError::config(format!(
                "window_sec must be positive, got {}",
                audio.window_sec
            )));
        }
        let nyquist = audio.sample_rate as f32 / 2.0;
        if !(audio.low_hz >= 0.0 && audio.high_hz <= nyquist && audio.low_hz < audio.high_hz) {
            return Err(VizError::config(format!(
                "frequency band [{}, {}] Hz must lie within [0, {}] Hz with low < high",
                audio.low_hz, audio.high_hz, nyquist
            )));
        }
        if !audio.smoothing.is_finite() || audio.smoothing < 0.0 {
            return Err(VizError::config(format!(
                "smoothing must be non-negative, got {}",
                audio.smoothing
            )));
        }
        if !(audio.max_step > 0.0 && audio.max_step < 1.0) {
            return Err(VizError::config(format!(
                "max_step must be in (0, 1), got {}",
                audio.max_step
            )));
        }

        if self.encode.bitrate.is_none() && self.encode.crf > 51 {
            return Err(VizError::config(format!(
                "crf must be in 0..=51, got {}",
                self.encode.crf
            )));
        }

        Ok(())
    }
}

/// Explicit path wins, then `ringviz.toml` in the working directory, then the user config dirs.
pub fn find_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from("ringviz.toml");
    if local.exists() {
        return Some(local);
    }
    if let Some(home) = dirs::home_dir() {
        let xdg = home.join(".config").join("ringviz").join("config.toml");
        if xdg.exists() {
            return Some(xdg);
        }
    }
    if let Some(config_dir) = dirs::config_dir() {
        let platform = config_dir.join("ringviz").join("config.toml");
        if platform.exists() {
            return Some(platform);
        }
    }
    None
}

pub fn load_config(path: &Path) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config: {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.output.width, 3840);
        assert_eq!(cfg.ring.spokes, 360);
        assert_eq!(cfg.audio.mode, AnalysisMode::Energy);
        assert_eq!(cfg.encode.bitrate.as_deref(), Some("12M"));
    }

    #[test]
    fn default_center_sits_above_middle() {
        let cfg = Config::default();
        assert_eq!(cfg.center(), (1920.0, 864.0));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [output]
            width = 1280
            height = 720

            [ring]
            spokes = 64
            color = [255, 200, 0]

            [audio]
            mode = "spectrum"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.output.width, 1280);
        assert_eq!(cfg.output.fps, 60);
        assert_eq!(cfg.ring.spokes, 64);
        assert_eq!(cfg.ring.color, [255, 200, 0]);
        assert_eq!(cfg.ring.base_radius, 220.0);
        assert_eq!(cfg.audio.mode, AnalysisMode::Spectrum);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn rejects_zero_resolution() {
        let mut cfg = Config::default();
        cfg.output.width = 0;
        assert!(matches!(cfg.validate(), Err(VizError::Configuration(_))));
    }

    #[test]
    fn rejects_ring_larger_than_canvas() {
        let mut cfg = Config::default();
        cfg.output.width = 400;
        cfg.output.height = 400;
        cfg.ring.center_x = Some(200.0);
        cfg.ring.center_y = Some(200.0);
        // 220 + 4 + 70 > 200
        assert!(matches!(cfg.validate(), Err(VizError::Configuration(_))));
    }

    #[test]
    fn rejects_band_above_nyquist() {
        let mut cfg = Config::default();
        cfg.audio.sample_rate = 16000;
        cfg.audio.high_hz = 12000.0;
        assert!(matches!(cfg.validate(), Err(VizError::Configuration(_))));
    }

    #[test]
    fn rejects_inverted_band() {
        let mut cfg = Config::default();
        cfg.audio.low_hz = 5000.0;
        cfg.audio.high_hz = 100.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_max_step_out_of_range() {
        let mut cfg = Config::default();
        cfg.audio.max_step = 0.0;
        assert!(cfg.validate().is_err());
        cfg.audio.max_step = 1.0;
        assert!(cfg.validate().is_err());
        cfg.audio.max_step = 1.5;
        assert!(cfg.validate().is_err());
        cfg.audio.max_step = 0.99;
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn explicit_config_path_wins() {
        let path = Path::new("/tmp/custom.toml");
        assert_eq!(find_config_path(Some(path)), Some(path.to_path_buf()));
    }
}
