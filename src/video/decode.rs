use std::path::{Path, PathBuf};

use image::RgbImage;

use crate::foundation::core::{Fps, FrameIndex, PixelShape};
use crate::foundation::error::{GaugeError, GaugeResult};

/// Immutable metadata about an opened video.
#[derive(Clone, Debug)]
pub struct VideoInfo {
    /// Source path used for decoding.
    pub source_path: PathBuf,
    /// Total decodable frame count; frame indices live in
    /// `[0, frame_count)`.
    pub frame_count: u64,
    /// Frame rate.
    pub fps: Fps,
    /// Pixel dimensions of every frame.
    pub shape: PixelShape,
}

/// Decoder collaborator: opens a video and decodes single frames by
/// index, synchronously.
pub trait VideoDecoder: Send + Sync {
    /// Probe `path` and return its immutable metadata.
    fn open(&self, path: &Path) -> GaugeResult<VideoInfo>;

    /// Decode the frame at `index` into RGB8. Blocking; an issued decode
    /// is never interrupted mid-flight.
    fn decode(&self, info: &VideoInfo, index: FrameIndex) -> GaugeResult<RgbImage>;
}

/// Decoder shelling out to `ffprobe`/`ffmpeg`.
#[derive(Clone, Copy, Debug, Default)]
pub struct FfmpegDecoder;

impl VideoDecoder for FfmpegDecoder {
    fn open(&self, path: &Path) -> GaugeResult<VideoInfo> {
        probe_video(path)
    }

    fn decode(&self, info: &VideoInfo, index: FrameIndex) -> GaugeResult<RgbImage> {
        decode_frame_rgb24(info, index)
    }
}

/// Probe source video metadata through `ffprobe`.
#[cfg(feature = "media-ffmpeg")]
pub fn probe_video(source_path: &Path) -> GaugeResult<VideoInfo> {
    #[derive(serde::Deserialize)]
    struct ProbeStream {
        codec_type: Option<String>,
        width: Option<u32>,
        height: Option<u32>,
        nb_frames: Option<String>,
        r_frame_rate: Option<String>,
        duration: Option<String>,
    }
    #[derive(serde::Deserialize)]
    struct ProbeOut {
        streams: Vec<ProbeStream>,
    }

    let out = std::process::Command::new("ffprobe")
        .args([
            "-v",
            "error",
            "-print_format",
            "json",
            "-show_streams",
            "-show_format",
        ])
        .arg(source_path)
        .output()
        .map_err(|e| GaugeError::setup(format!("failed to run ffprobe: {e}")))?;
    if !out.status.success() {
        return Err(GaugeError::setup(format!(
            "ffprobe failed for '{}': {}",
            source_path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let parsed: ProbeOut = serde_json::from_slice(&out.stdout)
        .map_err(|e| GaugeError::setup(format!("ffprobe json parse failed: {e}")))?;
    let video_stream = parsed
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| GaugeError::setup("no video stream found"))?;

    let width = video_stream
        .width
        .ok_or_else(|| GaugeError::setup("missing video width from ffprobe"))?;
    let height = video_stream
        .height
        .ok_or_else(|| GaugeError::setup("missing video height from ffprobe"))?;
    let shape = PixelShape::new(width, height)
        .map_err(|e| GaugeError::setup(format!("invalid video dimensions: {e}")))?;

    let fps = parse_frame_rate(video_stream.r_frame_rate.as_deref())?;

    let frame_count = match video_stream
        .nb_frames
        .as_deref()
        .and_then(|s| s.parse::<u64>().ok())
    {
        Some(n) => n,
        None => {
            // Containers without per-stream frame counts: derive from
            // duration.
            let secs = video_stream
                .duration
                .as_deref()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| GaugeError::setup("ffprobe reports neither nb_frames nor duration"))?;
            fps.secs_to_frames_floor(secs)
        }
    };
    if frame_count == 0 {
        return Err(GaugeError::setup(format!(
            "video '{}' has no frames",
            source_path.display()
        )));
    }

    Ok(VideoInfo {
        source_path: source_path.to_path_buf(),
        frame_count,
        fps,
        shape,
    })
}

#[cfg(feature = "media-ffmpeg")]
fn parse_frame_rate(raw: Option<&str>) -> GaugeResult<Fps> {
    let raw = raw.ok_or_else(|| GaugeError::setup("missing r_frame_rate from ffprobe"))?;
    let (num, den) = raw
        .split_once('/')
        .and_then(|(n, d)| Some((n.parse::<u32>().ok()?, d.parse::<u32>().ok()?)))
        .ok_or_else(|| GaugeError::setup(format!("unparseable r_frame_rate '{raw}'")))?;
    Fps::new(num, den).map_err(|e| GaugeError::setup(format!("invalid frame rate '{raw}': {e}")))
}

/// Decode one RGB frame by index through `ffmpeg`.
#[cfg(feature = "media-ffmpeg")]
pub fn decode_frame_rgb24(info: &VideoInfo, index: FrameIndex) -> GaugeResult<RgbImage> {
    if index.0 >= info.frame_count {
        return Err(GaugeError::validation(format!(
            "frame index {} out of range [0, {})",
            index.0, info.frame_count
        )));
    }

    let start_time_sec = info.fps.frames_to_secs(index.0);
    let out = std::process::Command::new("ffmpeg")
        .args(["-v", "error", "-ss", &format!("{start_time_sec:.9}")])
        .arg("-i")
        .arg(&info.source_path)
        .args([
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            "rgb24",
            "pipe:1",
        ])
        .output()
        .map_err(|e| GaugeError::decode(format!("failed to run ffmpeg for frame decode: {e}")))?;

    if !out.status.success() {
        return Err(GaugeError::decode(format!(
            "ffmpeg decode failed for '{}' frame {}: {}",
            info.source_path.display(),
            index.0,
            String::from_utf8_lossy(&out.stderr).trim()
        )));
    }

    let expected_len = info.shape.area() as usize * 3;
    if out.stdout.len() != expected_len {
        return Err(GaugeError::decode(format!(
            "decoded frame {} has invalid size: got {} bytes, expected {expected_len}",
            index.0,
            out.stdout.len()
        )));
    }

    RgbImage::from_raw(info.shape.width, info.shape.height, out.stdout)
        .ok_or_else(|| GaugeError::decode("decoded frame buffer has unexpected length"))
}

/// Probe source video metadata through `ffprobe`.
///
/// Returns an error when the `media-ffmpeg` feature is disabled.
#[cfg(not(feature = "media-ffmpeg"))]
pub fn probe_video(_source_path: &Path) -> GaugeResult<VideoInfo> {
    Err(GaugeError::setup(
        "video decoding requires the 'media-ffmpeg' feature",
    ))
}

/// Decode one RGB frame by index through `ffmpeg`.
///
/// Returns an error when the `media-ffmpeg` feature is disabled.
#[cfg(not(feature = "media-ffmpeg"))]
pub fn decode_frame_rgb24(_info: &VideoInfo, _index: FrameIndex) -> GaugeResult<RgbImage> {
    Err(GaugeError::setup(
        "video decoding requires the 'media-ffmpeg' feature",
    ))
}

// No unit tests here: these functions shell out to `ffprobe`/`ffmpeg` and
// are best validated via integration tests that can be conditionally
// ignored when the tools are unavailable.
