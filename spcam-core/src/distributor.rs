//! Frame fan-out.
//!
//! Every decoded [`FrameMessage`] goes to at most two places:
//!
//! - snapshot frames go to the [`SnapshotSink`] and nowhere else;
//! - video frames go to the open [`VideoSink`] while recording, which
//!   must not drop anything, and to the [`PreviewQueue`], which drops
//!   the oldest entry instead of waiting.
//!
//! The two video-frame paths fail independently: a broken video file
//! never starves the preview, and a full preview never slows recording.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, error, trace, warn};

use crate::error::{CameraError, CameraResult};
use crate::message::FrameMessage;
use crate::preview::PreviewQueue;
use crate::sink::{EncoderFactory, ImageCodec, PixelFrame, SnapshotSink, VideoSink};
use crate::state::RecordingState;

/// What happened to one frame.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A snapshot frame was saved (or failed to save).
    Snapshot(CameraResult<PathBuf>),
    /// Appended to the video file; `frame_count` includes this frame.
    Written { frame_count: u64 },
    /// Only offered to the preview, nothing was recording.
    Previewed,
    /// Not recorded (undecodable or wrong size); the session goes on.
    Dropped(CameraError),
    /// The video file cannot continue. The sink has been released and
    /// the caller must leave `Recording`.
    SinkFailed(CameraError),
}

pub struct FrameDistributor {
    video: Option<VideoSink>,
    snapshots: SnapshotSink,
    preview: Arc<PreviewQueue>,
    codec: Arc<dyn ImageCodec>,
    encoders: Arc<dyn EncoderFactory>,
    video_dir: PathBuf,
    fourcc: String,
}

impl FrameDistributor {
    pub fn new(
        video_dir: impl Into<PathBuf>,
        photo_dir: impl Into<PathBuf>,
        fourcc: impl Into<String>,
        preview: Arc<PreviewQueue>,
        codec: Arc<dyn ImageCodec>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Self {
        Self {
            video: None,
            snapshots: SnapshotSink::new(photo_dir, Arc::clone(&codec)),
            preview,
            codec,
            encoders,
            video_dir: video_dir.into(),
            fourcc: fourcc.into(),
        }
    }

    /// The open recording session, if any.
    pub fn session(&self) -> Option<&VideoSink> {
        self.video.as_ref()
    }

    /// Start a new video file. A session still open is finalized first.
    pub async fn open_session(&mut self) -> CameraResult<PathBuf> {
        if let Some(stale) = self.video.take() {
            warn!("new session while {} still open", stale.path().display());
            if let Err(e) = stale.finalize().await {
                error!("failed to finalize previous video: {e}");
            }
        }
        let sink = VideoSink::create(&self.video_dir, &self.fourcc)?;
        let path = sink.path().to_path_buf();
        self.video = Some(sink);
        Ok(path)
    }

    /// Finalize the open video file. `None` when no session was open.
    pub async fn close_session(&mut self) -> Option<CameraResult<(PathBuf, u64)>> {
        let sink = self.video.take()?;
        Some(sink.finalize().await)
    }

    /// Route one frame according to its kind and the recording state.
    pub async fn on_frame(&mut self, frame: FrameMessage, state: RecordingState) -> FrameOutcome {
        if frame.is_snapshot() {
            debug!("received snapshot frame");
            return FrameOutcome::Snapshot(self.snapshots.save(frame.payload).await);
        }

        let outcome = if state.is_recording() {
            self.record(&frame).await
        } else {
            trace!(frame_number = frame.frame_number, "received frame but not recording");
            FrameOutcome::Previewed
        };

        if self.preview.push(frame.payload).is_some() {
            trace!("preview full, dropped oldest frame");
        }
        outcome
    }

    async fn record(&mut self, frame: &FrameMessage) -> FrameOutcome {
        let Some(sink) = self.video.as_mut() else {
            return FrameOutcome::Dropped(CameraError::SinkWrite(
                "recording without an open video file".into(),
            ));
        };

        let pixels = match decode(Arc::clone(&self.codec), frame.payload.clone()).await {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!(frame_number = frame.frame_number, "failed to decode frame: {e}");
                return FrameOutcome::Dropped(e);
            }
        };

        match sink.write(&pixels, frame.fps, self.encoders.as_ref()).await {
            Ok(()) => FrameOutcome::Written {
                frame_count: sink.frame_count(),
            },
            Err(e @ CameraError::DimensionMismatch { .. }) => {
                warn!(frame_number = frame.frame_number, "{e}");
                FrameOutcome::Dropped(e)
            }
            Err(e) => {
                error!("video sink failed: {e}");
                if let Some(sink) = self.video.take() {
                    release(sink).await;
                }
                FrameOutcome::SinkFailed(e)
            }
        }
    }
}

async fn decode(codec: Arc<dyn ImageCodec>, jpeg: Bytes) -> CameraResult<PixelFrame> {
    tokio::task::spawn_blocking(move || codec.decode(&jpeg)).await?
}

/// Close a failed sink, keeping whatever it managed to write.
async fn release(sink: VideoSink) {
    let path = sink.path().to_path_buf();
    if let Err(e) = sink.finalize().await {
        warn!("failed to close {}: {e}", path.display());
    }
}

// ── Tests ────────────────────────────────────────────────────────
