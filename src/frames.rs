//! Frame sampling
//!
//! Walks a decoded video once and keeps an evenly spaced subset of frames,
//! JPEG-encoded, for the analyzer. Decoding itself is behind [`VideoDecoder`]
//! so the sampling policy can run against any backend.

use std::path::Path;

use async_trait::async_trait;
use base64::Engine;
use image::RgbImage;
use image::codecs::jpeg::JpegEncoder;
use serde::Serialize;
use thiserror::Error;

use crate::constants::JPEG_QUALITY;

#[derive(Debug, Error)]
pub enum SamplerError {
    #[error("cannot open video file: {0}")]
    Unreadable(String),
    #[error("frame cap must be at least 1")]
    InvalidFrameCap,
    #[error("failed to read frame data: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode frame: {0}")]
    Decode(String),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] image::ImageError),
}

/// An opened video, read front to back. Dropping it releases the decoder.
#[async_trait]
pub trait FrameSource: Send {
    /// Frame count reported by the container. Best effort, may be 0.
    fn total_frames(&self) -> u64;

    /// Frame rate reported by the container. 0 when unknown.
    fn fps(&self) -> f64;

    /// Next frame in decode order, or `None` at end of stream.
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, SamplerError>;
}

/// Opens video files into [`FrameSource`]s.
#[async_trait]
pub trait VideoDecoder: Send + Sync {
    async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplerError>;
}

/// A kept frame with its position in the source video.
#[derive(Debug, Clone, PartialEq)]
pub struct SampledFrame {
    pub index: u64,
    pub timestamp_secs: f64,
    pub jpeg: Vec<u8>,
}

impl SampledFrame {
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.jpeg)
    }
}

/// Container-level facts about one sampled video.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VideoMetadata {
    pub total_frames: u64,
    pub fps: f64,
    #[serde(rename = "duration")]
    pub duration_secs: f64,
    pub extracted_frames: usize,
}

impl VideoMetadata {
    pub fn new(total_frames: u64, fps: f64, extracted_frames: usize) -> Self {
        let duration_secs = if fps > 0.0 {
            total_frames as f64 / fps
        } else {
            0.0
        };
        Self {
            total_frames,
            fps,
            duration_secs,
            extracted_frames,
        }
    }
}

/// Step between kept frame indices.
pub fn sampling_stride(total_frames: u64, max_frames: usize) -> u64 {
    let max_frames = max_frames.max(1) as u64;
    if total_frames <= max_frames {
        1
    } else {
        total_frames / max_frames
    }
}

pub fn frame_timestamp(index: u64, fps: f64) -> f64 {
    if fps > 0.0 { index as f64 / fps } else { 0.0 }
}

/// Keep every `stride`-th frame of `source`, starting at index 0, until
/// `max_frames` are kept or the stream ends.
pub async fn sample(
    source: &mut dyn FrameSource,
    max_frames: usize,
) -> Result<(Vec<SampledFrame>, VideoMetadata), SamplerError> {
    if max_frames == 0 {
        return Err(SamplerError::InvalidFrameCap);
    }

    let total_frames = source.total_frames();
    let fps = source.fps();
    let stride = sampling_stride(total_frames, max_frames);

    let mut frames = Vec::with_capacity(max_frames);
    let mut index = 0u64;

    while frames.len() < max_frames {
        let Some(image) = source.next_frame().await? else {
            break;
        };

        if index % stride == 0 {
            frames.push(SampledFrame {
                index,
                timestamp_secs: frame_timestamp(index, fps),
                jpeg: encode_jpeg(&image)?,
            });
        }
        // decoded frame dropped here, only the JPEG is kept
        index += 1;
    }

    log::debug!(
        "[frames] Kept {} of {} frames (stride {}, {:.2} fps)",
        frames.len(),
        total_frames,
        stride,
        fps
    );

    let metadata = VideoMetadata::new(total_frames, fps, frames.len());
    Ok((frames, metadata))
}

/// Open `path` with `decoder` and sample it. The decoder is released before
/// returning, whether sampling succeeded or not.
pub async fn sample_video(
    decoder: &dyn VideoDecoder,
    path: &Path,
    max_frames: usize,
) -> Result<(Vec<SampledFrame>, VideoMetadata), SamplerError> {
    let mut source = decoder.open(path).await?;
    let result = sample(source.as_mut(), max_frames).await;
    drop(source);
    result
}

fn encode_jpeg(image: &RgbImage) -> Result<Vec<u8>, SamplerError> {
    let mut buf = Vec::new();
    JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY).encode_image(image)?;
    Ok(buf)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Synthetic video: `frame_count` solid frames whose red channel is the
    /// frame index, reporting `total_frames`/`fps` as container metadata.
    pub(crate) struct SyntheticSource {
        pub total_frames: u64,
        pub fps: f64,
        pub frame_count: u64,
        pub fail_at: Option<u64>,
        pub position: u64,
        pub released: Arc<AtomicBool>,
    }

    impl SyntheticSource {
        pub(crate) fn new(total_frames: u64, fps: f64) -> Self {
            Self {
                total_frames,
                fps,
                frame_count: total_frames,
                fail_at: None,
                position: 0,
                released: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    impl Drop for SyntheticSource {
        fn drop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl FrameSource for SyntheticSource {
        fn total_frames(&self) -> u64 {
            self.total_frames
        }

        fn fps(&self) -> f64 {
            self.fps
        }

        async fn next_frame(&mut self) -> Result<Option<RgbImage>, SamplerError> {
            if Some(self.position) == self.fail_at {
                return Err(SamplerError::Decode("corrupt packet".into()));
            }
            if self.position >= self.frame_count {
                return Ok(None);
            }
            let shade = (self.position % 256) as u8;
            self.position += 1;
            Ok(Some(RgbImage::from_pixel(8, 8, image::Rgb([shade, 0, 0]))))
        }
    }

    struct SyntheticDecoder {
        total_frames: u64,
        fail_at: Option<u64>,
        released: Arc<AtomicBool>,
    }

    #[async_trait]
    impl VideoDecoder for SyntheticDecoder {
        async fn open(&self, path: &Path) -> Result<Box<dyn FrameSource>, SamplerError> {
            if path.to_string_lossy().contains("missing") {
                return Err(SamplerError::Unreadable(path.display().to_string()));
            }
            let mut source = SyntheticSource::new(self.total_frames, 30.0);
            source.fail_at = self.fail_at;
            source.released = self.released.clone();
            Ok(Box::new(source))
        }
    }

    fn indices(frames: &[SampledFrame]) -> Vec<u64> {
        frames.iter().map(|f| f.index).collect()
    }

    #[test]
    fn test_stride_selection() {
        assert_eq!(sampling_stride(0, 10), 1);
        assert_eq!(sampling_stride(7, 10), 1);
        assert_eq!(sampling_stride(10, 10), 1);
        assert_eq!(sampling_stride(90, 10), 9);
        assert_eq!(sampling_stride(105, 10), 10);
        assert_eq!(sampling_stride(1000, 3), 333);
    }

    #[test]
    fn test_zero_fps_yields_zero_time() {
        assert_eq!(frame_timestamp(42, 0.0), 0.0);
        assert_eq!(VideoMetadata::new(300, 0.0, 10).duration_secs, 0.0);
        assert!((frame_timestamp(45, 30.0) - 1.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_three_second_clip_samples_every_ninth_frame() {
        let mut source = SyntheticSource::new(90, 30.0);
        let (frames, metadata) = sample(&mut source, 10).await.unwrap();

        assert_eq!(indices(&frames), vec![0, 9, 18, 27, 36, 45, 54, 63, 72, 81]);
        assert_eq!(metadata.extracted_frames, 10);
        assert_eq!(metadata.total_frames, 90);
        assert!((metadata.duration_secs - 3.0).abs() < 1e-9);
        assert!((frames[1].timestamp_secs - 0.3).abs() < 1e-9);
        assert!(frames.iter().all(|f| f.jpeg.starts_with(&[0xFF, 0xD8])));
    }

    #[tokio::test]
    async fn test_short_video_keeps_every_frame() {
        let mut source = SyntheticSource::new(4, 25.0);
        let (frames, metadata) = sample(&mut source, 10).await.unwrap();

        assert_eq!(indices(&frames), vec![0, 1, 2, 3]);
        assert_eq!(metadata.extracted_frames, 4);
    }

    #[tokio::test]
    async fn test_stream_shorter_than_reported_ends_early() {
        let mut source = SyntheticSource::new(100, 10.0);
        source.frame_count = 35;
        let (frames, metadata) = sample(&mut source, 10).await.unwrap();

        assert_eq!(indices(&frames), vec![0, 10, 20, 30]);
        assert_eq!(metadata.extracted_frames, 4);
        assert_eq!(metadata.total_frames, 100);
    }

    #[tokio::test]
    async fn test_empty_video_is_not_an_error() {
        let mut source = SyntheticSource::new(0, 30.0);
        let (frames, metadata) = sample(&mut source, 10).await.unwrap();

        assert!(frames.is_empty());
        assert_eq!(metadata.total_frames, 0);
        assert_eq!(metadata.duration_secs, 0.0);
        assert_eq!(metadata.extracted_frames, 0);
    }

    #[tokio::test]
    async fn test_unknown_fps_gives_zero_timestamps() {
        let mut source = SyntheticSource::new(50, 0.0);
        let (frames, metadata) = sample(&mut source, 5).await.unwrap();

        assert_eq!(indices(&frames), vec![0, 10, 20, 30, 40]);
        assert!(frames.iter().all(|f| f.timestamp_secs == 0.0));
        assert_eq!(metadata.duration_secs, 0.0);
    }

    #[tokio::test]
    async fn test_zero_cap_is_rejected() {
        let mut source = SyntheticSource::new(10, 30.0);
        assert!(matches!(
            sample(&mut source, 0).await,
            Err(SamplerError::InvalidFrameCap)
        ));
    }

    #[tokio::test]
    async fn test_source_released_on_success_and_failure() {
        let released = Arc::new(AtomicBool::new(false));
        let decoder = SyntheticDecoder {
            total_frames: 20,
            fail_at: None,
            released: released.clone(),
        };
        sample_video(&decoder, Path::new("clip.mp4"), 10).await.unwrap();
        assert!(released.load(Ordering::SeqCst));

        let released = Arc::new(AtomicBool::new(false));
        let decoder = SyntheticDecoder {
            total_frames: 20,
            fail_at: Some(3),
            released: released.clone(),
        };
        let err = sample_video(&decoder, Path::new("clip.mp4"), 10).await;
        assert!(matches!(err, Err(SamplerError::Decode(_))));
        assert!(released.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_unopenable_source_reports_unreadable() {
        let decoder = SyntheticDecoder {
            total_frames: 20,
            fail_at: None,
            released: Arc::new(AtomicBool::new(false)),
        };
        let err = sample_video(&decoder, Path::new("missing.mp4"), 10).await;
        assert!(matches!(err, Err(SamplerError::Unreadable(_))));
    }
}
