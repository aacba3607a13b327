//! Application façade over the camera link.
//!
//! [`CameraController`] owns the link and the receive task. Callers issue
//! guarded commands and read status. The receive task runs a private
//! pipeline that applies acknowledgements to the state machine and
//! routes frames through the distributor.
//!
//! The current [`RecorderStatus`] lives in a `watch` channel. The
//! pipeline is its only writer; command guards and UIs read it.
//!
//! [`StatusEvent`]s go out on a channel bounded by [`EVENT_CAPACITY`].
//! Sending never waits: while the receiver is full, new events are
//! dropped, so a caller that stops draining it loses events but never
//! stalls the receive task or grows memory.

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::codec::DemuxStats;
use crate::distributor::{FrameDistributor, FrameOutcome};
use crate::error::{CameraError, CameraResult};
use crate::events::{RecorderStatus, StatusEvent};
use crate::message::{AckCode, Command, FrameMessage, Resolution, WhiteBalance};
use crate::preview::{DEFAULT_PREVIEW_CAPACITY, PreviewQueue};
use crate::protocol::{BoxedReader, BoxedWriter, MessageHandler, ProtocolHandler};
use crate::sink::{EncoderFactory, FfmpegEncoderFactory, ImageCodec, JpegCodec};
use crate::state::{RecordingState, RecordingStateMachine, Transition};
use crate::transport::Transport;

/// Status events buffered for a slow receiver.
pub const EVENT_CAPACITY: usize = 256;

// ── ControllerConfig ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Where `video_*.mp4` files go.
    pub video_dir: PathBuf,
    /// Where `snapshot_*.jpg` files go.
    pub photo_dir: PathBuf,
    pub preview_capacity: usize,
    pub fourcc: String,
    pub ffmpeg_path: PathBuf,
    /// How often an idle receive task checks for a stop request.
    pub poll_interval_ms: u64,
    /// How long `disconnect` waits for the receive task to finish.
    pub join_timeout_ms: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            video_dir: PathBuf::from("videos"),
            photo_dir: PathBuf::from("photos"),
            preview_capacity: DEFAULT_PREVIEW_CAPACITY,
            fourcc: "mp4v".to_string(),
            ffmpeg_path: PathBuf::from("ffmpeg"),
            poll_interval_ms: 10,
            join_timeout_ms: 5000,
        }
    }
}

impl ControllerConfig {
    fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    fn join_timeout(&self) -> Duration {
        Duration::from_millis(self.join_timeout_ms)
    }
}

// ── CameraController ─────────────────────────────────────────────

struct Link {
    protocol: Arc<ProtocolHandler>,
    running: Arc<AtomicBool>,
    receiver: JoinHandle<DemuxStats>,
}

impl Link {
    fn is_alive(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

pub struct CameraController {
    config: ControllerConfig,
    codec: Arc<dyn ImageCodec>,
    encoders: Arc<dyn EncoderFactory>,
    preview: Arc<PreviewQueue>,
    events: mpsc::Sender<StatusEvent>,
    status: Arc<watch::Sender<RecorderStatus>>,
    link: Option<Link>,
}

impl CameraController {
    /// Controller with the JPEG codec and the ffmpeg encoder.
    pub fn new(config: ControllerConfig) -> (Self, mpsc::Receiver<StatusEvent>) {
        let encoders = Arc::new(FfmpegEncoderFactory::new(config.ffmpeg_path.clone()));
        Self::with_collaborators(config, Arc::new(JpegCodec), encoders)
    }

    pub fn with_collaborators(
        config: ControllerConfig,
        codec: Arc<dyn ImageCodec>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> (Self, mpsc::Receiver<StatusEvent>) {
        let (events, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let (status, _) = watch::channel(RecorderStatus::default());
        let preview = Arc::new(PreviewQueue::new(config.preview_capacity));
        let controller = Self {
            config,
            codec,
            encoders,
            preview,
            events,
            status: Arc::new(status),
            link: None,
        };
        (controller, events_rx)
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    // ── Link lifecycle ───────────────────────────────────────────

    /// Open `transport` and start the receive task.
    pub async fn connect(&mut self, transport: &dyn Transport) -> CameraResult<()> {
        self.ensure_disconnected().await?;
        info!("connecting to {}", transport.describe());

        let (reader, writer) = match transport.open().await {
            Ok(halves) => halves,
            Err(e) => {
                self.notify(StatusEvent::ConnectFailed(e.to_string()));
                return Err(e);
            }
        };
        self.start_link(reader, writer);
        self.notify(StatusEvent::Connected(transport.describe()));
        Ok(())
    }

    /// Use an already-open duplex stream as the link.
    pub async fn attach_stream<S>(&mut self, stream: S, label: &str) -> CameraResult<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.attach(Box::new(reader), Box::new(writer), label).await
    }

    /// Use separate read and write halves as the link.
    pub async fn attach(
        &mut self,
        reader: BoxedReader,
        writer: BoxedWriter,
        label: &str,
    ) -> CameraResult<()> {
        self.ensure_disconnected().await?;
        self.start_link(reader, writer);
        self.notify(StatusEvent::Connected(label.to_string()));
        Ok(())
    }

    fn start_link(&mut self, reader: BoxedReader, writer: BoxedWriter) {
        self.status.send_replace(RecorderStatus::default());

        let pipeline = Pipeline {
            machine: RecordingStateMachine::new(),
            distributor: FrameDistributor::new(
                self.config.video_dir.clone(),
                self.config.photo_dir.clone(),
                self.config.fourcc.clone(),
                Arc::clone(&self.preview),
                Arc::clone(&self.codec),
                Arc::clone(&self.encoders),
            ),
            status: Arc::clone(&self.status),
            events: self.events.clone(),
        };

        let protocol = Arc::new(ProtocolHandler::new(writer));
        let running = Arc::new(AtomicBool::new(true));
        let receiver = protocol.spawn_receiver(
            reader,
            pipeline,
            Arc::clone(&running),
            self.config.poll_interval(),
        );
        self.link = Some(Link {
            protocol,
            running,
            receiver,
        });
    }

    /// Refuse a second live link, and reap one that already died.
    async fn ensure_disconnected(&mut self) -> CameraResult<()> {
        let Some(link) = self.link.take() else {
            return Ok(());
        };
        if link.is_alive() {
            self.link = Some(link);
            return Err(CameraError::AlreadyConnected);
        }
        debug!("reaping closed link");
        self.join(link).await;
        Ok(())
    }

    /// Close the link.
    ///
    /// A recording in progress is asked to stop first. The receive task
    /// is then stopped and joined, which finalizes any open video file.
    pub async fn disconnect(&mut self) -> CameraResult<()> {
        let link = self.link.take().ok_or(CameraError::NotConnected)?;
        info!("disconnecting from device...");

        if link.is_alive() && self.state().is_recording() {
            match link.protocol.stop_recording().await {
                Ok(()) => {
                    self.notify(StatusEvent::CommandSent(Command::StopRecording));
                    let mut status = self.status.subscribe();
                    let stopped = tokio::time::timeout(self.config.join_timeout(), async {
                        status.wait_for(|s| !s.state.is_recording()).await.is_ok()
                    })
                    .await;
                    if !matches!(stopped, Ok(true)) {
                        warn!("no stop acknowledgement before disconnect");
                    }
                }
                Err(e) => warn!("could not send stop before disconnect: {e}"),
            }
        }

        link.running.store(false, Ordering::SeqCst);
        self.join(link).await;
        self.notify(StatusEvent::Disconnected);
        Ok(())
    }

    async fn join(&self, mut link: Link) {
        match tokio::time::timeout(self.config.join_timeout(), &mut link.receiver).await {
            Ok(Ok(stats)) => debug!(?stats, "receive task joined"),
            Ok(Err(e)) => error!("receive task failed: {e}"),
            Err(_) => {
                warn!("receive task did not stop in time, aborting");
                link.receiver.abort();
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.as_ref().is_some_and(Link::is_alive)
    }

    // ── Commands ─────────────────────────────────────────────────

    /// Check `command` against the recording state, then send it.
    ///
    /// A refused command never reaches the wire. Success only means the
    /// byte was written; the device answers asynchronously.
    pub async fn issue(&self, command: Command) -> CameraResult<()> {
        let link = self
            .link
            .as_ref()
            .filter(|link| link.is_alive())
            .ok_or(CameraError::NotConnected)?;

        let state = self.state();
        if let Err(e) = state.permits(command) {
            debug!("{e}");
            self.notify(StatusEvent::CommandRefused { command, state });
            return Err(e);
        }

        if let Err(e) = link.protocol.send(command).await {
            self.notify(StatusEvent::Error(format!("failed to send {command}: {e}")));
            return Err(e);
        }
        self.notify(StatusEvent::CommandSent(command));
        Ok(())
    }

    pub async fn start_recording(&self, resolution: Resolution) -> CameraResult<()> {
        self.issue(Command::StartRecording(resolution)).await
    }

    pub async fn stop_recording(&self) -> CameraResult<()> {
        self.issue(Command::StopRecording).await
    }

    pub async fn take_snapshot(&self) -> CameraResult<()> {
        self.issue(Command::TakeSnapshot).await
    }

    pub async fn shutdown_device(&self) -> CameraResult<()> {
        self.issue(Command::Shutdown).await
    }

    pub async fn set_white_balance(&self, mode: WhiteBalance) -> CameraResult<()> {
        self.issue(Command::SetWhiteBalance(mode)).await
    }

    // ── Status ───────────────────────────────────────────────────

    pub fn status(&self) -> RecorderStatus {
        self.status.borrow().clone()
    }

    pub fn state(&self) -> RecordingState {
        self.status.borrow().state
    }

    /// `IDLE` or `RECORDING (Frames: N, FPS: F)`.
    pub fn status_text(&self) -> String {
        self.status.borrow().to_string()
    }

    /// Receiver that sees every status change.
    pub fn subscribe(&self) -> watch::Receiver<RecorderStatus> {
        self.status.subscribe()
    }

    /// Live preview frames (JPEG payloads).
    pub fn preview(&self) -> Arc<PreviewQueue> {
        Arc::clone(&self.preview)
    }

    /// Frames received on the current link.
    pub fn frames_received(&self) -> u64 {
        self.link
            .as_ref()
            .map_or(0, |link| link.protocol.frames_received())
    }

    fn notify(&self, event: StatusEvent) {
        emit(&self.events, event);
    }
}

impl Drop for CameraController {
    fn drop(&mut self) {
        if let Some(link) = &self.link {
            link.running.store(false, Ordering::SeqCst);
        }
    }
}

fn emit(events: &mpsc::Sender<StatusEvent>, event: StatusEvent) {
    info!("{event}");
    if let Err(mpsc::error::TrySendError::Full(event)) = events.try_send(event) {
        debug!("status receiver full, dropped: {event}");
    }
}

// ── Pipeline ─────────────────────────────────────────────────────

/// Receive-task side: the only owner of the state machine and sinks.
struct Pipeline {
    machine: RecordingStateMachine,
    distributor: FrameDistributor,
    status: Arc<watch::Sender<RecorderStatus>>,
    events: mpsc::Sender<StatusEvent>,
}

impl Pipeline {
    fn notify(&self, event: StatusEvent) {
        emit(&self.events, event);
    }

    fn publish(&self) {
        let session = self.distributor.session();
        let next = RecorderStatus {
            state: self.machine.state(),
            frame_count: session.map_or(0, |s| s.frame_count()),
            fps: session.and_then(|s| s.fps()),
            file: session.map(|s| s.path().to_path_buf()),
        };
        self.status.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    async fn finish_session(&mut self) {
        match self.distributor.close_session().await {
            Some(Ok((path, frames))) => {
                self.notify(StatusEvent::RecordingStopped { path, frames });
            }
            Some(Err(e)) => self.notify(StatusEvent::Error(format!("failed to close video: {e}"))),
            None => warn!("recording stopped with no open video file"),
        }
    }
}

#[async_trait]
impl MessageHandler for Pipeline {
    async fn on_ack(&mut self, ack: AckCode) {
        debug!("received response: {ack}");
        match self.machine.on_ack(ack) {
            Transition::Started => match self.distributor.open_session().await {
                Ok(path) => self.notify(StatusEvent::RecordingStarted(path)),
                Err(e) => {
                    self.machine.force_idle();
                    self.notify(StatusEvent::Error(format!("cannot record: {e}")));
                }
            },
            Transition::Stopped => self.finish_session().await,
            Transition::Rejected(ack) => self.notify(StatusEvent::DeviceRejected(ack)),
            Transition::Snapshot { ok } => self.notify(StatusEvent::SnapshotAck { ok }),
            Transition::Unexpected { ack, state } => {
                self.notify(StatusEvent::Warning(format!("unexpected {ack} while {state}")));
            }
        }
        self.publish();
    }

    async fn on_frame(&mut self, frame: FrameMessage) {
        let state = self.machine.state();
        match self.distributor.on_frame(frame, state).await {
            FrameOutcome::Snapshot(Ok(path)) => self.notify(StatusEvent::SnapshotSaved(path)),
            FrameOutcome::Snapshot(Err(e)) => self.notify(StatusEvent::SnapshotFailed(e.to_string())),
            FrameOutcome::Written { .. } | FrameOutcome::Previewed => {}
            FrameOutcome::Dropped(e) => self.notify(StatusEvent::Warning(format!("frame dropped: {e}"))),
            FrameOutcome::SinkFailed(e) => {
                self.machine.force_idle();
                self.notify(StatusEvent::Error(format!("recording aborted: {e}")));
            }
        }
        self.publish();
    }

    async fn on_transport_error(&mut self, error: CameraError) {
        self.notify(StatusEvent::Error(format!("link error: {error}")));
    }

    async fn on_close(&mut self) {
        if self.distributor.session().is_some() {
            info!("link closing while recording, finalizing video");
            self.finish_session().await;
        }
        self.machine.force_idle();
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.preview_capacity, 30);
        assert_eq!(config.fourcc, "mp4v");
        assert_eq!(config.video_dir, PathBuf::from("videos"));
        assert_eq!(config.photo_dir, PathBuf::from("photos"));
    }

    #[test]
    fn zero_poll_interval_is_clamped() {
        let config = ControllerConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(config.poll_interval(), Duration::from_millis(1));
    }

    #[tokio::test]
    async fn commands_need_a_link() {
        let (controller, _events) = CameraController::new(ControllerConfig::default());
        assert!(!controller.is_connected());
        let err = controller.take_snapshot().await.unwrap_err();
        assert!(matches!(err, CameraError::NotConnected));
    }

    #[tokio::test]
    async fn disconnect_without_link_fails() {
        let (mut controller, _events) = CameraController::new(ControllerConfig::default());
        assert!(matches!(
            controller.disconnect().await,
            Err(CameraError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn second_attach_is_refused() {
        let (mut controller, mut events) = CameraController::new(ControllerConfig::default());
        let (a, _peer_a) = tokio::io::duplex(64);
        let (b, _peer_b) = tokio::io::duplex(64);

        controller.attach_stream(a, "first").await.unwrap();
        assert_eq!(
            events.recv().await,
            Some(StatusEvent::Connected("first".into()))
        );
        let err = controller.attach_stream(b, "second").await.unwrap_err();
        assert!(matches!(err, CameraError::AlreadyConnected));

        controller.disconnect().await.unwrap();
        assert!(!controller.is_connected());
    }

    #[tokio::test]
    async fn undrained_events_stay_bounded() {
        let (controller, mut events) = CameraController::new(ControllerConfig::default());
        for n in 0..EVENT_CAPACITY + 10 {
            controller.notify(StatusEvent::Warning(format!("frame dropped: {n}")));
        }

        let mut queued = 0;
        while let Ok(event) = events.try_recv() {
            if queued == 0 {
                assert_eq!(event, StatusEvent::Warning("frame dropped: 0".into()));
            }
            queued += 1;
        }
        assert_eq!(queued, EVENT_CAPACITY);

        // Room again once drained.
        controller.notify(StatusEvent::Disconnected);
        assert_eq!(events.try_recv().ok(), Some(StatusEvent::Disconnected));
    }

    #[tokio::test]
    async fn guard_refusal_is_notified() {
        let (mut controller, mut events) = CameraController::new(ControllerConfig::default());
        let (stream, _peer) = tokio::io::duplex(64);
        controller.attach_stream(stream, "test").await.unwrap();
        let _ = events.recv().await;

        let err = controller.stop_recording().await.unwrap_err();
        assert!(matches!(err, CameraError::CommandRefused { .. }));
        assert_eq!(
            events.recv().await,
            Some(StatusEvent::CommandRefused {
                command: Command::StopRecording,
                state: RecordingState::Idle,
            })
        );
        controller.disconnect().await.unwrap();
    }
}
