//! services/api/src/adapters/video.rs
//!
//! Implements the `VideoDecoder` port by shelling out to `ffprobe` for the
//! stream geometry and `ffmpeg` for decoding to raw RGB24 frames on stdout.
//!
//! All calls here block; callers run them on a blocking worker.

use image::RgbImage;
use oloy_core::ports::{FrameSource, PortError, PortResult, VideoDecoder};
use serde::Deserialize;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct FfmpegVideoDecoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl FfmpegVideoDecoder {
    pub fn new(ffmpeg: PathBuf, ffprobe: PathBuf) -> Self {
        Self { ffmpeg, ffprobe }
    }

    /// Width and height of the first video stream.
    fn probe(&self, path: &Path) -> PortResult<(u32, u32)> {
        let output = Command::new(&self.ffprobe)
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height",
                "-of",
                "json",
            ])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| PortError::Unexpected(format!("Could not run ffprobe: {}", e)))?;

        if !output.status.success() {
            return Err(PortError::InvalidInput(format!(
                "Could not open video: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        parse_probe_output(&output.stdout)
    }
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
}

fn parse_probe_output(stdout: &[u8]) -> PortResult<(u32, u32)> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| PortError::InvalidInput(format!("Unreadable ffprobe output: {}", e)))?;
    probe
        .streams
        .first()
        .and_then(|stream| match (stream.width, stream.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        })
        .ok_or_else(|| PortError::InvalidInput("Could not open video: no video stream".to_string()))
}

impl VideoDecoder for FfmpegVideoDecoder {
    fn open(&self, path: &Path) -> PortResult<Box<dyn FrameSource>> {
        let (width, height) = self.probe(path)?;

        let mut command = Command::new(&self.ffmpeg);
        command
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(path)
            .args(["-map", "0:v:0", "-f", "rawvideo", "-pix_fmt", "rgb24", "-"]);
        let frames = FfmpegFrames::spawn(command, width, height)?;

        debug!("Opened {} as {}x{} video", path.display(), width, height);
        Ok(Box::new(frames))
    }
}

/// Raw frames read from a running `ffmpeg` process.
struct FfmpegFrames {
    child: Child,
    stdout: ChildStdout,
    /// Drains stderr so the process never blocks on a full pipe.
    stderr: Option<JoinHandle<String>>,
    width: u32,
    height: u32,
    finished: bool,
}

impl FfmpegFrames {
    fn spawn(mut command: Command, width: u32, height: u32) -> PortResult<Self> {
        let mut child = command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| PortError::Unexpected(format!("Could not run ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| PortError::Unexpected("ffmpeg stdout was not captured".to_string()))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            child,
            stdout,
            stderr,
            width,
            height,
            finished: false,
        })
    }

    /// Reaps the process at end of stream. A failed exit means frames were lost.
    fn finish(&mut self) -> PortResult<()> {
        self.finished = true;
        let status = self
            .child
            .wait()
            .map_err(|e| PortError::Unexpected(format!("Failed to wait for ffmpeg: {}", e)))?;
        let stderr = self
            .stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();

        if status.success() {
            return Ok(());
        }
        warn!("ffmpeg exited with {}: {}", status, stderr.trim());
        Err(PortError::Unexpected(format!(
            "Video decoding failed ({}): {}",
            status,
            stderr.trim()
        )))
    }
}

impl FrameSource for FfmpegFrames {
    fn next_frame(&mut self) -> PortResult<Option<RgbImage>> {
        if self.finished {
            return Ok(None);
        }
        let frame_len = self.width as usize * self.height as usize * 3;
        let mut buffer = vec![0u8; frame_len];
        let filled = read_full(&mut self.stdout, &mut buffer)
            .map_err(|e| PortError::Unexpected(format!("Failed to read frame: {}", e)))?;

        if filled < frame_len {
            if filled > 0 {
                warn!("Discarding trailing partial frame ({} of {} bytes)", filled, frame_len);
            }
            self.finish()?;
            return Ok(None);
        }
        RgbImage::from_raw(self.width, self.height, buffer)
            .map(Some)
            .ok_or_else(|| PortError::Unexpected("Frame buffer has the wrong size".to_string()))
    }
}

impl Drop for FfmpegFrames {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.child.kill();
            let _ = self.child.wait();
        }
    }
}

/// Reads until `buffer` is full or the stream ends; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
