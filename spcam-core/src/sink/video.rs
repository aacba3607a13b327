//! Video file for a single recording session.
//!
//! The file name is fixed when the session starts, but the encoder is
//! only opened on the first frame, once its pixel size and the device's
//! reported fps are known. Every later frame must match that size.

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{CameraError, CameraResult};
use crate::sink::{EncoderFactory, PixelFrame, VideoEncoder, timestamped_path};

/// Frames between progress log lines.
const PROGRESS_EVERY: u64 = 10;

pub struct VideoSink {
    path: PathBuf,
    fourcc: String,
    frame_count: u64,
    fps: Option<u8>,
    size: Option<(u32, u32)>,
    encoder: Option<Box<dyn VideoEncoder>>,
}

impl VideoSink {
    /// Reserve a new `video_<timestamp>.mp4` in `dir`.
    pub fn create(dir: &Path, fourcc: &str) -> CameraResult<Self> {
        let path = timestamped_path(dir, "video", "mp4")?;
        info!("creating new video file: {}", path.display());
        Ok(Self {
            path,
            fourcc: fourcc.to_string(),
            frame_count: 0,
            fps: None,
            size: None,
            encoder: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// fps the encoder was opened with, once the first frame arrived.
    pub fn fps(&self) -> Option<u8> {
        self.fps
    }

    /// Append one frame, opening the encoder on the first call.
    ///
    /// A [`CameraError::DimensionMismatch`] leaves the sink usable; any
    /// other error means the file cannot continue.
    pub async fn write(
        &mut self,
        frame: &PixelFrame,
        fps: u8,
        encoders: &dyn EncoderFactory,
    ) -> CameraResult<()> {
        match self.size {
            Some((width, height)) if (width, height) != frame.dimensions() => {
                return Err(CameraError::DimensionMismatch {
                    expected_width: width,
                    expected_height: height,
                    actual_width: frame.width,
                    actual_height: frame.height,
                });
            }
            Some(_) => {}
            None => {
                // ffmpeg rejects a zero rate; the device reports 0 on some stills.
                let fps = fps.max(1);
                info!(
                    "initializing video writer: {}x{} @ {} fps",
                    frame.width, frame.height, fps
                );
                let encoder = encoders
                    .open(&self.path, &self.fourcc, fps, frame.width, frame.height)
                    .await?;
                self.encoder = Some(encoder);
                self.size = Some(frame.dimensions());
                self.fps = Some(fps);
            }
        }

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| CameraError::SinkWrite("video writer not initialized".into()))?;
        encoder.write_frame(frame).await?;
        self.frame_count += 1;

        if self.frame_count % PROGRESS_EVERY == 0 {
            debug!("processed {} frames so far", self.frame_count);
        }
        Ok(())
    }

    /// Flush and close the file. Returns the path and frames written.
    ///
    /// A session that never received a frame has no file to close.
    pub async fn finalize(mut self) -> CameraResult<(PathBuf, u64)> {
        if let Some(mut encoder) = self.encoder.take() {
            info!(
                "closing video file {}, {} frames",
                self.path.display(),
                self.frame_count
            );
            let written = encoder.finish().await?;
            if written != self.frame_count {
                warn!(
                    "encoder reports {written} frames, sink counted {}",
                    self.frame_count
                );
            }
        } else {
            debug!("closing empty session {}", self.path.display());
        }
        Ok((self.path, self.frame_count))
    }
}

impl std::fmt::Debug for VideoSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoSink")
            .field("path", &self.path)
            .field("frame_count", &self.frame_count)
            .field("fps", &self.fps)
            .field("size", &self.size)
            .field("open", &self.encoder.is_some())
            .finish()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Arc;
    use parking_lot::Mutex;

    /// Everything a [`RecordingEncoders`] factory observed.
    #[derive(Debug, Default)]
    pub(crate) struct EncoderLog {
        pub opened: Vec<(PathBuf, u8, u32, u32)>,
        pub frames: Vec<(u32, u32)>,
        pub finished: u32,
    }

    /// In-memory encoder factory.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingEncoders {
        pub log: Arc<Mutex<EncoderLog>>,
        pub fail_open: bool,
        pub fail_write: bool,
    }

    struct RecordingEncoder {
        log: Arc<Mutex<EncoderLog>>,
        fail_write: bool,
        frames: u64,
    }

    #[async_trait]
    impl VideoEncoder for RecordingEncoder {
        async fn write_frame(&mut self, frame: &PixelFrame) -> CameraResult<()> {
            if self.fail_write {
                return Err(CameraError::SinkWrite("disk full".into()));
            }
            self.log.lock().frames.push(frame.dimensions());
            self.frames += 1;
            Ok(())
        }

        async fn finish(&mut self) -> CameraResult<u64> {
            self.log.lock().finished += 1;
            Ok(self.frames)
        }
    }

    #[async_trait]
    impl EncoderFactory for RecordingEncoders {
        async fn open(
            &self,
            path: &Path,
            _fourcc: &str,
            fps: u8,
            width: u32,
            height: u32,
        ) -> CameraResult<Box<dyn VideoEncoder>> {
            if self.fail_open {
                return Err(CameraError::SinkOpen {
                    path: path.to_path_buf(),
                    reason: "refused".into(),
                });
            }
            self.log
                .lock()
                .opened
                .push((path.to_path_buf(), fps, width, height));
            Ok(Box::new(RecordingEncoder {
                log: Arc::clone(&self.log),
                fail_write: self.fail_write,
                frames: 0,
            }))
        }
    }

    fn pixels(width: u32, height: u32) -> PixelFrame {
        PixelFrame {
            width,
            height,
            data: vec![0; (width * height * 3) as usize],
        }
    }

    #[tokio::test]
    async fn opens_lazily_on_first_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let encoders = RecordingEncoders::default();
        let mut sink = VideoSink::create(tmp.path(), "mp4v").unwrap();
        assert!(encoders.log.lock().opened.is_empty());
        assert_eq!(sink.fps(), None);

        sink.write(&pixels(4, 2), 30, &encoders).await.unwrap();
        sink.write(&pixels(4, 2), 15, &encoders).await.unwrap();

        let log = encoders.log.lock();
        assert_eq!(log.opened.len(), 1);
        assert_eq!(log.opened[0].1, 30);
        assert_eq!((log.opened[0].2, log.opened[0].3), (4, 2));
        assert_eq!(log.frames.len(), 2);
        drop(log);
        assert_eq!(sink.fps(), Some(30));
        assert_eq!(sink.frame_count(), 2);
    }

    #[tokio::test]
    async fn mismatched_frame_is_rejected_but_sink_survives() {
        let tmp = tempfile::tempdir().unwrap();
        let encoders = RecordingEncoders::default();
        let mut sink = VideoSink::create(tmp.path(), "mp4v").unwrap();

        sink.write(&pixels(4, 2), 30, &encoders).await.unwrap();
        let err = sink.write(&pixels(8, 8), 30, &encoders).await.unwrap_err();
        assert!(matches!(err, CameraError::DimensionMismatch { .. }));
        sink.write(&pixels(4, 2), 30, &encoders).await.unwrap();
        assert_eq!(sink.frame_count(), 2);
    }

    #[tokio::test]
    async fn finalize_closes_encoder() {
        let tmp = tempfile::tempdir().unwrap();
        let encoders = RecordingEncoders::default();
        let mut sink = VideoSink::create(tmp.path(), "mp4v").unwrap();
        sink.write(&pixels(2, 2), 10, &encoders).await.unwrap();

        let (path, frames) = sink.finalize().await.unwrap();
        assert_eq!(frames, 1);
        assert!(path.starts_with(tmp.path()));
        assert_eq!(encoders.log.lock().finished, 1);
    }

    #[tokio::test]
    async fn empty_session_finalizes_without_encoder() {
        let tmp = tempfile::tempdir().unwrap();
        let encoders = RecordingEncoders::default();
        let sink = VideoSink::create(tmp.path(), "mp4v").unwrap();
        let (_, frames) = sink.finalize().await.unwrap();
        assert_eq!(frames, 0);
        assert_eq!(encoders.log.lock().finished, 0);
    }

    #[tokio::test]
    async fn zero_fps_is_clamped() {
        let tmp = tempfile::tempdir().unwrap();
        let encoders = RecordingEncoders::default();
        let mut sink = VideoSink::create(tmp.path(), "mp4v").unwrap();
        sink.write(&pixels(2, 2), 0, &encoders).await.unwrap();
        assert_eq!(encoders.log.lock().opened[0].1, 1);
    }
}
