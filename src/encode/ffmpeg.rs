use anyhow::{Context, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStderr, Command, Stdio};
use std::thread::JoinHandle;

use super::FrameSink;
use crate::config::EncodeConfig;

/// Bytes of ffmpeg stderr kept for the failure report.
const STDERR_TAIL_BYTES: usize = 16 * 1024;

pub struct FfmpegEncoder {
    child: Child,
    output_path: PathBuf,
    stderr_tail: Option<JoinHandle<String>>,
}

/// Arguments for an ffmpeg run reading raw RGBA frames from stdin and the audio from `input_audio`.
pub fn build_args(
    output_path: &Path,
    input_audio: &Path,
    width: u32,
    height: u32,
    fps: u32,
    encode: &EncodeConfig,
) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-y".into(),
        "-hide_banner".into(),
        "-nostats".into(),
        "-loglevel".into(), "error".into(),
        "-f".into(), "rawvideo".into(),
        "-pixel_format".into(), "rgba".into(),
        "-video_size".into(), format!("{}x{}", width, height).into(),
        "-framerate".into(), fps.to_string().into(),
        "-i".into(), "pipe:0".into(),
        "-i".into(), input_audio.as_os_str().to_owned(),
        "-map".into(), "0:v:0".into(),
        "-map".into(), "1:a:0".into(),
        "-c:v".into(), encode.codec.clone().into(),
        "-pix_fmt".into(), encode.pix_fmt.clone().into(),
        "-preset".into(), encode.preset.clone().into(),
    ];

    if let Some(ref br) = encode.bitrate {
        args.extend(["-b:v".into(), br.clone().into()]);
    } else {
        args.extend(["-crf".into(), encode.crf.to_string().into()]);
    }

    if encode.threads > 0 {
        args.extend(["-threads".into(), encode.threads.to_string().into()]);
    }

    args.extend([
        "-c:a".into(), encode.audio_codec.clone().into(),
        "-b:a".into(), encode.audio_bitrate.clone().into(),
        "-shortest".into(),
        output_path.as_os_str().to_owned(),
    ]);

    args
}

/// Read ffmpeg's stderr until it closes, keeping only the last `STDERR_TAIL_BYTES`.
///
/// The pipe must be drained while frames are written, otherwise ffmpeg blocks on a
/// full stderr buffer and stops reading stdin.
fn drain_stderr(mut stderr: ChildStderr) -> JoinHandle<String> {
    std::thread::spawn(move || {
        let mut tail: VecDeque<u8> = VecDeque::with_capacity(STDERR_TAIL_BYTES);
        let mut chunk = [0u8; 4096];
        loop {
            match stderr.read(&mut chunk) {
                Ok(0) => break,
                Ok(n) => {
                    tail.extend(&chunk[..n]);
                    let excess = tail.len().saturating_sub(STDERR_TAIL_BYTES);
                    tail.drain(..excess);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(tail.make_contiguous()).into_owned()
    })
}

impl FfmpegEncoder {
    pub fn new(
        output_path: &Path,
        input_audio: &Path,
        width: u32,
        height: u32,
        fps: u32,
        encode: &EncodeConfig,
    ) -> Result<Self> {
        let mut command = Command::new("ffmpeg");
        command.args(build_args(output_path, input_audio, width, height, fps, encode));
        let encoder = Self::spawn(command, output_path)
            .context("Failed to spawn ffmpeg. Is ffmpeg installed?")?;

        log::info!(
            "FFmpeg encoder started: {}x{} @ {}fps, codec={}, threads={}",
            width, height, fps, encode.codec, encode.threads
        );
        Ok(encoder)
    }

    /// Start `command` with piped stdin and a drained stderr.
    fn spawn(mut command: Command, output_path: &Path) -> Result<Self> {
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;
        let stderr_tail = child.stderr.take().map(drain_stderr);

        Ok(Self {
            child,
            output_path: output_path.to_path_buf(),
            stderr_tail,
        })
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr_tail
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    }

    pub fn finish(mut self) -> Result<()> {
        // Close stdin to signal EOF
        drop(self.child.stdin.take());

        let status = self.child.wait().context("Failed to wait for ffmpeg")?;
        let stderr = self.collect_stderr();

        if !status.success() {
            anyhow::bail!("FFmpeg exited with error:\n{}", stderr);
        }

        log::info!("FFmpeg encoding complete");
        Ok(())
    }

    /// Kill ffmpeg and remove the partial output file.
    pub fn abort(mut self) {
        drop(self.child.stdin.take());
        if let Err(err) = self.child.kill() {
            log::warn!("Failed to stop ffmpeg: {}", err);
        }
        if let Err(err) = self.child.wait() {
            log::warn!("Failed to reap ffmpeg: {}", err);
        }
        self.collect_stderr();
        if self.output_path.exists() {
            if let Err(err) = std::fs::remove_file(&self.output_path) {
                log::warn!(
                    "Failed to remove partial output {}: {}",
                    self.output_path.display(),
                    err
                );
            }
        }
    }
}

impl FrameSink for FfmpegEncoder {
    fn write_frame(&mut self, rgba_pixels: &[u8]) -> Result<()> {
        let stdin = self.child.stdin.as_mut().context("FFmpeg stdin not available")?;
        stdin.write_all(rgba_pixels).context("Failed to write frame to ffmpeg")?;
        Ok(())
    }
}
