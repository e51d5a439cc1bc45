mod audio;
mod cli;
mod config;
mod encode;
mod error;
mod render;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};

use cli::Cli;
use config::Config;
use encode::ffmpeg::FfmpegEncoder;
use error::VizError;
use render::background::{Background, FitMode};
use render::frame::FrameSynth;
use render::pipeline::{render_all, CancelToken};

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();

    let mut config = match config::find_config_path(cli.config.as_deref()) {
        Some(path) => {
            let cfg = config::load_config(&path)?;
            log::info!("Loaded config from {}", path.display());
            cfg
        }
        None => Config::default(),
    };
    cli.apply(&mut config);
    config.validate()?;

    let fit_mode: FitMode = cli.mode.parse()?;
    for path in [&cli.audio, &cli.background] {
        if !path.is_file() {
            return Err(VizError::input(format!("input file not found: {}", path.display())).into());
        }
    }

    let out = &config.output;
    log::info!("ringviz - radial audio visualizer");
    log::info!("Audio: {}", cli.audio.display());
    log::info!("Background: {} ({:?})", cli.background.display(), fit_mode);
    log::info!("Output: {}", cli.output.display());
    log::info!("Resolution: {}x{} @ {}fps, {} spokes", out.width, out.height, out.fps, config.ring.spokes);

    // 1. Decode and resample audio
    log::info!("Decoding audio...");
    let audio_data = audio::decode::decode_audio(&cli.audio)
        .context("extraction failed")?
        .resampled(config.audio.sample_rate)
        .context("extraction failed")?;

    // 2. Background, fitted once
    let background = Background::load(&cli.background, out.width, out.height, fit_mode)?;

    // 3. Analyze audio
    log::info!("Analyzing audio...");
    let (global, levels) = audio::analysis::analyze(&audio_data, &config)?;
    log::info!("Total frames: {}, Duration: {:.1}s", global.total_frames, global.duration);
    drop(audio_data);

    let synth = FrameSynth::from_config(levels, &config);

    // 4. Start FFmpeg encoder
    log::info!("Starting FFmpeg encoder...");
    let mut encoder = FfmpegEncoder::new(
        &cli.output,
        &cli.audio,
        out.width,
        out.height,
        out.fps,
        &config.encode,
    )?;

    // 5. Render loop
    let pb = ProgressBar::new(synth.total_frames() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} frames ({eta} remaining)")
            .context("Invalid progress bar template")?
            .progress_chars("=>-"),
    );

    let cancel = CancelToken::new();
    let rendered = render_all(
        &synth,
        &background,
        &mut encoder,
        &config.render,
        &cancel,
        &pb,
    );

    if let Err(err) = rendered {
        pb.abandon_with_message("Rendering failed");
        encoder.abort();
        return Err(err);
    }

    pb.finish_with_message("Rendering complete");

    // 6. Finish encoding
    log::info!("Finishing encoding...");
    encoder.finish()?;

    log::info!("Done! Output: {}", cli.output.display());
    Ok(())
}
