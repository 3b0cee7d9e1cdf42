//! ffprobe/ffmpeg backed [`VideoDecoder`].
//!
//! `ffprobe` supplies container metadata, then a single `ffmpeg` process
//! streams raw RGB frames over stdout. The child is killed when the source
//! is dropped.

use std::io::ErrorKind;
use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use image::RgbImage;
use serde::Deserialize;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStdout, Command};

use crate::frames::{FrameSource, SamplerError, VideoDecoder};

/// Container metadata for the first video stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamProbe {
    pub width: u32,
    pub height: u32,
    pub total_frames: u64,
    pub fps: f64,
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    nb_frames: Option<String>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Parse an ffprobe rational such as `30000/1001`. `0/0` and garbage give 0.
pub fn parse_frame_rate(rate: &str) -> f64 {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().unwrap_or(0.0);
            let den: f64 = den.trim().parse().unwrap_or(0.0);
            if den > 0.0 { num / den } else { 0.0 }
        }
        None => rate.trim().parse().unwrap_or(0.0),
    };
    if value.is_finite() && value > 0.0 {
        value
    } else {
        0.0
    }
}

/// Interpret `ffprobe -of json` output.
///
/// Some containers (mkv, webm) carry no frame count; it is then estimated
/// from duration and frame rate, so treat it as approximate.
pub fn parse_probe(json: &str) -> Result<StreamProbe, SamplerError> {
    let output: ProbeOutput = serde_json::from_str(json)
        .map_err(|e| SamplerError::Unreadable(format!("unparseable ffprobe output: {}", e)))?;

    let stream = output
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| SamplerError::Unreadable("no video stream".into()))?;

    let (width, height) = match (stream.width, stream.height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => (w, h),
        _ => return Err(SamplerError::Unreadable("video stream has no dimensions".into())),
    };

    let fps = stream
        .avg_frame_rate
        .as_deref()
        .map(parse_frame_rate)
        .filter(|fps| *fps > 0.0)
        .or_else(|| stream.r_frame_rate.as_deref().map(parse_frame_rate))
        .unwrap_or(0.0);

    let duration = output
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d > 0.0);

    let total_frames = stream
        .nb_frames
        .and_then(|n| n.trim().parse::<u64>().ok())
        .or_else(|| duration.map(|d| (d * fps).round() as u64))
        .unwrap_or(0);

    Ok(StreamProbe {
        width,
        height,
        total_frames,
        fps,
    })
}

pub async fn probe(path: &Path) -> Result<StreamProbe, SamplerError> {
    let output = Command::new("ffprobe")
        .args(["-v", "error"])
        .args(["-select_streams", "v:0"])
        .args([
            "-show_entries",
            "stream=width,height,nb_frames,avg_frame_rate,r_frame_rate:format=duration",
        ])
        .args(["-of", "json"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SamplerError::Unreadable(format!("failed to run ffprobe: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(SamplerError::Unreadable(format!(
            "{}: {}",
            path.display(),
            stderr.trim()
        )));
    }

    parse_probe(&String::from_utf8_lossy(&output.stdout))
}

#[derive(Debug, Clone)]
pub struct FfmpegDecoder {
    threads: usize,
}

impl FfmpegDecoder {
    pub fn new(threads: usize) -> Self {
        Self {
            threads: threads.max(1),
        }
    }
}

#[async_trait]
impl VideoDecoder for FfmpegDecoder {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplerError> {
        let probe = probe(path).await?;
        let threads = self.threads.to_string();

        // -noautorotate keeps output dimensions equal to the probed ones
        let mut child = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .args(["-threads", &threads])
            .arg("-noautorotate")
            .arg("-i")
            .arg(path)
            .args(["-an", "-sn"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SamplerError::Unreadable(format!("failed to start ffmpeg: {}", e)))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SamplerError::Unreadable("ffmpeg stdout unavailable".into()))?;

        log::debug!(
            "[ffmpeg] Opened {} ({}x{}, {} frames, {:.2} fps)",
            path.display(),
            probe.width,
            probe.height,
            probe.total_frames,
            probe.fps
        );

        Ok(Box::new(FfmpegSource {
            _child: child,
            stdout,
            frame_len: probe.width as usize * probe.height as usize * 3,
            probe,
        }))
    }
}

struct FfmpegSource {
    // held for kill_on_drop
    _child: Child,
    stdout: ChildStdout,
    frame_len: usize,
    probe: StreamProbe,
}

#[async_trait]
impl FrameSource for FfmpegSource {
    fn total_frames(&self) -> u64 {
        self.probe.total_frames
    }

    fn fps(&self) -> f64 {
        self.probe.fps
    }

    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SamplerError> {
        let mut buf = vec![0u8; self.frame_len];
        match self.stdout.read_exact(&mut buf).await {
            Ok(_) => {}
            // a trailing partial frame counts as end of stream
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(SamplerError::Io(e)),
        }

        RgbImage::from_raw(self.probe.width, self.probe.height, buf)
            .map(Some)
            .ok_or_else(|| SamplerError::Decode("frame buffer size mismatch".into()))
    }
}
