use clap::Parser;
use std::path::PathBuf;

use crate::config::{AnalysisMode, Config};

#[derive(Parser, Debug)]
#[command(
    name = "ringviz",
    about = "Render a radial audio-reactive ring over a background image"
)]
pub struct Cli {
    /// Input audio file (WAV, MP3, FLAC, OGG, AAC)
    pub audio: PathBuf,

    /// Background image (PNG, JPEG, ...)
    pub background: PathBuf,

    /// Background placement: cover (crop to fill) or contain (letterbox)
    #[arg(default_value = "cover")]
    pub mode: String,

    /// Output video file
    #[arg(short, long, default_value = "ring_on_bg_spokes.mp4")]
    pub output: PathBuf,

    /// TOML config file (defaults to ./ringviz.toml or the user config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Video width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Video height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Number of spokes around the ring
    #[arg(long)]
    pub spokes: Option<usize>,

    /// Analysis mode: one energy for all spokes, or one band per spoke
    #[arg(long, value_enum)]
    pub analysis: Option<AnalysisMode>,

    /// Enable glow with this many passes
    #[arg(long)]
    pub glow: Option<u32>,

    /// Video bitrate (e.g. 12M). Overrides --crf.
    #[arg(short, long)]
    pub bitrate: Option<String>,

    /// Constant quality (0-51, lower = better). Used when no bitrate is set.
    #[arg(long)]
    pub crf: Option<u32>,

    /// FFmpeg video codec
    #[arg(long)]
    pub codec: Option<String>,

    /// FFmpeg pixel format
    #[arg(long)]
    pub pix_fmt: Option<String>,

    /// FFmpeg encoder threads
    #[arg(long)]
    pub threads: Option<u32>,

    /// Frame synthesis workers (0 = one per core)
    #[arg(long)]
    pub workers: Option<usize>,
}

impl Cli {
    /// Apply flags on top of file/default configuration.
    pub fn apply(&self, config: &mut Config) {
        if let Some(width) = self.width {
            config.output.width = width;
        }
        if let Some(height) = self.height {
            config.output.height = height;
        }
        if let Some(fps) = self.fps {
            config.output.fps = fps;
        }
        if let Some(spokes) = self.spokes {
            config.ring.spokes = spokes;
        }
        if let Some(mode) = self.analysis {
            config.audio.mode = mode;
        }
        if let Some(steps) = self.glow {
            config.glow.enabled = steps > 0;
            config.glow.steps = steps;
        }
        if let Some(crf) = self.crf {
            config.encode.crf = crf;
            config.encode.bitrate = None;
        }
        if let Some(ref bitrate) = self.bitrate {
            config.encode.bitrate = Some(bitrate.clone());
        }
        if let Some(ref codec) = self.codec {
            config.encode.codec = codec.clone();
        }
        if let Some(ref pix_fmt) = self.pix_fmt {
            config.encode.pix_fmt = pix_fmt.clone();
        }
        if let Some(threads) = self.threads {
            config.encode.threads = threads;
        }
        if let Some(workers) = self.workers {
            config.render.workers = workers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positional_arguments() {
        let cli = Cli::try_parse_from(["ringviz", "song.mp3", "bg.jpg"]).unwrap();
        assert_eq!(cli.audio, PathBuf::from("song.mp3"));
        assert_eq!(cli.background, PathBuf::from("bg.jpg"));
        assert_eq!(cli.mode, "cover");
        assert_eq!(cli.output, PathBuf::from("ring_on_bg_spokes.mp4"));

        let cli = Cli::try_parse_from(["ringviz", "song.mp3", "bg.jpg", "contain"]).unwrap();
        assert_eq!(cli.mode, "contain");
    }

    #[test]
    fn missing_background_is_an_error() {
        assert!(Cli::try_parse_from(["ringviz", "song.mp3"]).is_err());
    }

    #[test]
    fn flags_override_config() {
        let cli = Cli::try_parse_from([
            "ringviz", "a.wav", "b.png", "--width", "1920", "--height", "1080", "--spokes", "90",
            "--analysis", "spectrum", "--glow", "3", "--crf", "20",
        ])
        .unwrap();
        let mut cfg = Config::default();
        cli.apply(&mut cfg);
        assert_eq!(cfg.output.width, 1920);
        assert_eq!(cfg.output.height, 1080);
        assert_eq!(cfg.output.fps, 60);
        assert_eq!(cfg.ring.spokes, 90);
        assert_eq!(cfg.audio.mode, AnalysisMode::Spectrum);
        assert!(cfg.glow.enabled);
        assert_eq!(cfg.glow.steps, 3);
        assert_eq!(cfg.encode.crf, 20);
        assert!(cfg.encode.bitrate.is_none());
    }

    #[test]
    fn untouched_flags_keep_config() {
        let cli = Cli::try_parse_from(["ringviz", "a.wav", "b.png"]).unwrap();
        let mut cfg = Config::default();
        cfg.ring.spokes = 12;
        cli.apply(&mut cfg);
        assert_eq!(cfg.ring.spokes, 12);
        assert_eq!(cfg.encode.bitrate.as_deref(), Some("12M"));
    }
}
