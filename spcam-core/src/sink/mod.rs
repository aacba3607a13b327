//! Frame sinks and the codec collaborators behind them.
//!
//! | Module     | Purpose                                          |
//! |------------|--------------------------------------------------|
//! | `video`    | Lazily opened video file for one recording       |
//! | `snapshot` | Standalone still images                          |
//! | `jpeg`     | [`ImageCodec`] backed by the `image` crate        |
//! | `ffmpeg`   | [`EncoderFactory`] that pipes raw RGB to `ffmpeg` |

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::error::{CameraError, CameraResult};

pub mod ffmpeg;
pub mod jpeg;
pub mod snapshot;
pub mod video;

pub use ffmpeg::FfmpegEncoderFactory;
pub use jpeg::JpegCodec;
pub use snapshot::SnapshotSink;
pub use video::VideoSink;

// ── PixelFrame ───────────────────────────────────────────────────

/// A decoded image: tightly packed RGB24 rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelFrame {
    pub width: u32,
    pub height: u32,
    /// `width * height * 3` bytes.
    pub data: Vec<u8>,
}

impl PixelFrame {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

// ── Collaborator traits ──────────────────────────────────────────

/// Turns JPEG payloads into pixels and pixels into image files.
pub trait ImageCodec: Send + Sync {
    fn decode(&self, jpeg: &[u8]) -> CameraResult<PixelFrame>;

    fn save(&self, frame: &PixelFrame, path: &Path) -> CameraResult<()>;
}

/// An open video file accepting frames of one fixed size.
#[async_trait]
pub trait VideoEncoder: Send {
    async fn write_frame(&mut self, frame: &PixelFrame) -> CameraResult<()>;

    /// Flush and close the file, returning the number of frames written.
    async fn finish(&mut self) -> CameraResult<u64>;
}

/// Opens [`VideoEncoder`]s.
#[async_trait]
pub trait EncoderFactory: Send + Sync {
    async fn open(
        &self,
        path: &Path,
        fourcc: &str,
        fps: u8,
        width: u32,
        height: u32,
    ) -> CameraResult<Box<dyn VideoEncoder>>;
}

// ── Output naming ────────────────────────────────────────────────

/// `<dir>/<stem>_YYYYmmdd_HHMMSS.<ext>`, with a numeric suffix if a
/// file of that name already exists. Creates `dir` if needed.
pub fn timestamped_path(dir: &Path, stem: &str, ext: &str) -> CameraResult<PathBuf> {
    std::fs::create_dir_all(dir).map_err(|e| CameraError::SinkOpen {
        path: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let mut path = dir.join(format!("{stem}_{stamp}.{ext}"));
    let mut n = 1;
    while path.exists() {
        path = dir.join(format!("{stem}_{stamp}_{n}.{ext}"));
        n += 1;
    }
    Ok(path)
}
