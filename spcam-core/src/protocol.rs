//! Command sending and the receive loop.
//!
//! [`ProtocolHandler`] owns the write half of the link and serialises
//! commands through a mutex, so concurrent callers never interleave
//! bytes. A send only reports whether the byte left this process; the
//! device answers later with an [`AckCode`] on the read half.
//!
//! [`receive_loop`] owns the read half. It drives the demultiplexer and
//! hands each message, in arrival order, to a single [`MessageHandler`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, info, warn};

use crate::codec::{CameraCodec, DemuxStats};
use crate::error::{CameraError, CameraResult};
use crate::message::{AckCode, Command, FrameMessage, Message, Resolution, WhiteBalance};

pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Interval between receive-loop progress lines.
const STATS_LOG_INTERVAL: Duration = Duration::from_secs(2);

// ── MessageHandler ───────────────────────────────────────────────

/// Consumer of demultiplexed messages. Exactly one call per message.
#[async_trait]
pub trait MessageHandler: Send {
    async fn on_ack(&mut self, ack: AckCode);

    async fn on_frame(&mut self, frame: FrameMessage);

    /// The read half failed; the loop stops after this call.
    async fn on_transport_error(&mut self, _error: CameraError) {}

    /// Last call, made when the loop exits for any reason.
    async fn on_close(&mut self) {}
}

// ── ProtocolHandler ──────────────────────────────────────────────

pub struct ProtocolHandler {
    writer: Mutex<FramedWrite<BoxedWriter, CameraCodec>>,
    frames_received: Arc<AtomicU64>,
}

impl ProtocolHandler {
    pub fn new(writer: BoxedWriter) -> Self {
        Self {
            writer: Mutex::new(FramedWrite::new(writer, CameraCodec::new())),
            frames_received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Write one command and flush it.
    pub async fn send(&self, command: Command) -> CameraResult<()> {
        let mut writer = self.writer.lock().await;
        writer.send(command).await?;
        debug!("sent command {:?} ({command})", command.wire_byte() as char);
        Ok(())
    }

    pub async fn start_recording(&self, resolution: Resolution) -> CameraResult<()> {
        self.send(Command::StartRecording(resolution)).await
    }

    pub async fn stop_recording(&self) -> CameraResult<()> {
        self.send(Command::StopRecording).await
    }

    pub async fn take_snapshot(&self) -> CameraResult<()> {
        self.send(Command::TakeSnapshot).await
    }

    pub async fn shutdown_device(&self) -> CameraResult<()> {
        self.send(Command::Shutdown).await
    }

    pub async fn set_white_balance(&self, mode: WhiteBalance) -> CameraResult<()> {
        self.send(Command::SetWhiteBalance(mode)).await
    }

    /// Frames demultiplexed and dispatched since this handler was created.
    pub fn frames_received(&self) -> u64 {
        self.frames_received.load(Ordering::Relaxed)
    }

    /// Run [`receive_loop`] on its own task. Clear `running` to stop it.
    pub fn spawn_receiver<H>(
        &self,
        reader: BoxedReader,
        handler: H,
        running: Arc<AtomicBool>,
        poll_interval: Duration,
    ) -> JoinHandle<DemuxStats>
    where
        H: MessageHandler + 'static,
    {
        running.store(true, Ordering::SeqCst);
        tokio::spawn(receive_loop(
            reader,
            handler,
            running,
            Arc::clone(&self.frames_received),
            poll_interval,
        ))
    }
}

// ── Receive loop ─────────────────────────────────────────────────

/// Drain `reader` until EOF, a read error, or `running` goes false.
///
/// Handler calls happen outside the `select!`, so a stop request never
/// interrupts a frame mid-dispatch. Returns the demultiplexer counters.
pub async fn receive_loop<H>(
    reader: BoxedReader,
    mut handler: H,
    running: Arc<AtomicBool>,
    frames_received: Arc<AtomicU64>,
    poll_interval: Duration,
) -> DemuxStats
where
    H: MessageHandler,
{
    let mut framed = FramedRead::new(reader, CameraCodec::new());
    let mut last_log = Instant::now();
    info!("receive loop started");

    loop {
        if !running.load(Ordering::SeqCst) {
            break;
        }

        let next = tokio::select! {
            next = framed.next() => next,
            _ = wait_for_stop(&running, poll_interval) => break,
        };

        match next {
            Some(Ok(Message::Ack(ack))) => handler.on_ack(ack).await,
            Some(Ok(Message::Frame(frame))) => {
                handler.on_frame(frame).await;
                frames_received.fetch_add(1, Ordering::Relaxed);
            }
            Some(Err(e)) => {
                warn!("receive error: {e}");
                handler.on_transport_error(e).await;
                break;
            }
            None => {
                info!("link closed by peer");
                break;
            }
        }

        if last_log.elapsed() >= STATS_LOG_INTERVAL {
            let stats = framed.decoder().stats();
            debug!(
                buffered = framed.read_buffer().len(),
                acks = stats.acks,
                frames = stats.frames,
                garbage = stats.garbage_bytes,
                "receive loop alive"
            );
            last_log = Instant::now();
        }
    }

    running.store(false, Ordering::SeqCst);
    handler.on_close().await;
    let stats = framed.decoder().stats();
    info!(?stats, "receive loop stopped");
    stats
}

/// Resolves once `running` becomes false.
async fn wait_for_stop(running: &AtomicBool, poll_interval: Duration) {
    loop {
        if !running.load(Ordering::SeqCst) {
            return;
        }
        tokio::time::sleep(poll_interval).await;
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::tests::frame_bytes;
    use tokio::io::AsyncWriteExt;
    use tokio::sync::mpsc;

    /// Forwards every callback to a channel.
    struct Collector {
        tx: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl MessageHandler for Collector {
        async fn on_ack(&mut self, ack: AckCode) {
            let _ = self.tx.send(format!("ack {ack}"));
        }

        async fn on_frame(&mut self, frame: FrameMessage) {
            let _ = self.tx.send(format!("frame {} ({} bytes)", frame.frame_number, frame.payload.len()));
        }

        async fn on_close(&mut self) {
            let _ = self.tx.send("close".into());
        }
    }

    fn collector() -> (Collector, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Collector { tx }, rx)
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(item) = rx.try_recv() {
            out.push(item);
        }
        out
    }

    #[tokio::test]
    async fn commands_are_single_bytes() {
        let mock = tokio_test::io::Builder::new()
            .write(b"b")
            .write(b"0")
            .write(b"s")
            .write(b"1")
            .write(b"G")
            .build();
        let handler = ProtocolHandler::new(Box::new(mock));

        handler.start_recording(Resolution::Vga).await.unwrap();
        handler.stop_recording().await.unwrap();
        handler.take_snapshot().await.unwrap();
        handler.shutdown_device().await.unwrap();
        handler.set_white_balance(WhiteBalance::Daylight).await.unwrap();
    }

    #[tokio::test]
    async fn write_failure_is_reported() {
        let mock = tokio_test::io::Builder::new()
            .write_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let handler = ProtocolHandler::new(Box::new(mock));
        let err = handler.take_snapshot().await.unwrap_err();
        assert!(matches!(err, CameraError::Transport(_)));
    }

    #[tokio::test]
    async fn dispatches_in_arrival_order() {
        let mut stream = Vec::new();
        stream.extend_from_slice(AckCode::StartOk.as_bytes());
        stream.extend_from_slice(&frame_bytes(1, 30, b"abc"));
        stream.extend_from_slice(b"\x00\x00noise");
        stream.extend_from_slice(&frame_bytes(2, 30, b"de"));
        stream.extend_from_slice(AckCode::StopOk.as_bytes());

        let mock = tokio_test::io::Builder::new().read(&stream).build();
        let (handler, mut rx) = collector();
        let running = Arc::new(AtomicBool::new(true));
        let counter = Arc::new(AtomicU64::new(0));

        let stats = receive_loop(
            Box::new(mock),
            handler,
            Arc::clone(&running),
            Arc::clone(&counter),
            Duration::from_millis(5),
        )
        .await;

        assert_eq!(
            drain(&mut rx),
            vec![
                "ack rsp:VST.",
                "frame 1 (3 bytes)",
                "frame 2 (2 bytes)",
                "ack rsp:VSP.",
                "close",
            ]
        );
        assert_eq!(counter.load(Ordering::Relaxed), 2);
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.acks, 2);
        assert!(stats.garbage_bytes > 0);
        assert!(!running.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn message_split_across_reads() {
        let bytes = frame_bytes(7, 15, b"payload");
        let (head, tail) = bytes.split_at(6);
        let mock = tokio_test::io::Builder::new().read(head).read(tail).build();
        let (handler, mut rx) = collector();

        receive_loop(
            Box::new(mock),
            handler,
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicU64::new(0)),
            Duration::from_millis(5),
        )
        .await;

        assert_eq!(drain(&mut rx), vec!["frame 7 (7 bytes)", "close"]);
    }

    #[tokio::test]
    async fn stop_flag_ends_idle_loop() {
        let (client, device) = tokio::io::duplex(64);
        let (device_read, _device_write) = tokio::io::split(device);
        let (_client_read, client_write) = tokio::io::split(client);
        let handler = ProtocolHandler::new(Box::new(client_write));

        let (collector, mut rx) = collector();
        let running = Arc::new(AtomicBool::new(false));
        let task = handler.spawn_receiver(
            Box::new(device_read),
            collector,
            Arc::clone(&running),
            Duration::from_millis(5),
        );
        assert!(running.load(Ordering::SeqCst));

        tokio::time::sleep(Duration::from_millis(20)).await;
        running.store(false, Ordering::SeqCst);
        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats, DemuxStats::default());
        assert_eq!(drain(&mut rx), vec!["close"]);
    }

    #[tokio::test]
    async fn commands_reach_the_peer() {
        let (client, mut device) = tokio::io::duplex(64);
        let handler = ProtocolHandler::new(Box::new(client));
        handler.start_recording(Resolution::Hd).await.unwrap();
        handler.set_white_balance(WhiteBalance::Auto).await.unwrap();

        let mut buf = [0u8; 2];
        tokio::io::AsyncReadExt::read_exact(&mut device, &mut buf).await.unwrap();
        assert_eq!(&buf, b"cB");
        device.shutdown().await.unwrap();
    }
}
