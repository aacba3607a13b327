//! Byte links to the device.

use std::io::{ErrorKind, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use async_trait::async_trait;
use futures::executor::block_on;
use serialport::{DataBits, FlowControl, Parity, StopBits};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf};
use tracing::{debug, info, warn};

use crate::error::{CameraError, CameraResult};
use crate::protocol::{BoxedReader, BoxedWriter};

/// Longest a blocking port read lasts before the close flag is rechecked.
const READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes buffered between the port threads and the async side.
const PIPE_CAPACITY: usize = 64 * 1024;

/// Something that can open a duplex byte stream to the camera.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link and return its read and write halves.
    async fn open(&self) -> CameraResult<(BoxedReader, BoxedWriter)>;

    /// Human-readable name of the link, for status lines.
    fn describe(&self) -> String;
}

// ── SerialTransport ──────────────────────────────────────────────

/// A serial port such as `/dev/ttyUSB0` or `COM3`, opened 8N1 with no
/// flow control.
#[derive(Debug, Clone)]
pub struct SerialTransport {
    port: String,
    baud_rate: u32,
}

impl SerialTransport {
    pub fn new(port: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port: port.into(),
            baud_rate,
        }
    }

    pub fn port(&self) -> &str {
        &self.port
    }

    pub fn baud_rate(&self) -> u32 {
        self.baud_rate
    }

    fn open_error(&self, e: serialport::Error) -> CameraError {
        CameraError::Transport(std::io::Error::other(format!(
            "failed to open {}: {e}",
            self.port
        )))
    }
}

#[async_trait]
impl Transport for SerialTransport {
    async fn open(&self) -> CameraResult<(BoxedReader, BoxedWriter)> {
        let port = serialport::new(self.port.as_str(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(READ_TIMEOUT)
            .open()
            .map_err(|e| self.open_error(e))?;
        let reader = port.try_clone().map_err(|e| self.open_error(e))?;

        let (reader, writer, _threads) = bridge(&self.port, reader, port)?;
        info!("opened serial link {}", self.describe());
        Ok((reader, writer))
    }

    fn describe(&self) -> String {
        format!("{} @ {} baud", self.port, self.baud_rate)
    }
}

// ── Port threads ─────────────────────────────────────────────────

/// Connect a blocking port to an in-memory pipe served by two threads.
///
/// The reader thread wakes at least every `READ_TIMEOUT` to check whether
/// the link was dropped, so the port is closed shortly after both async
/// halves go away. The returned handles may be dropped to detach.
fn bridge<R, W>(
    name: &str,
    port_rx: R,
    port_tx: W,
) -> std::io::Result<(BoxedReader, BoxedWriter, [JoinHandle<()>; 2])>
where
    R: Read + Send + 'static,
    W: Write + Send + 'static,
{
    let (link, device) = tokio::io::duplex(PIPE_CAPACITY);
    let (device_rx, device_tx) = tokio::io::split(device);
    let closed = Arc::new(AtomicBool::new(false));

    let inbound = std::thread::Builder::new()
        .name(format!("{name} reader"))
        .spawn({
            let closed = Arc::clone(&closed);
            move || pump_inbound(port_rx, device_tx, &closed)
        })?;

    let outbound = std::thread::Builder::new()
        .name(format!("{name} writer"))
        .spawn({
            let closed = Arc::clone(&closed);
            move || pump_outbound(device_rx, port_tx, &closed)
        });
    let outbound = match outbound {
        Ok(handle) => handle,
        Err(e) => {
            closed.store(true, Ordering::SeqCst);
            return Err(e);
        }
    };

    let (reader, writer) = tokio::io::split(link);
    Ok((Box::new(reader), Box::new(writer), [inbound, outbound]))
}

/// Port to pipe. Ends on port EOF or error, or once `closed` is set.
fn pump_inbound<R: Read>(mut port: R, mut pipe: WriteHalf<DuplexStream>, closed: &AtomicBool) {
    let mut buf = [0u8; 4096];
    while !closed.load(Ordering::SeqCst) {
        match port.read(&mut buf) {
            Ok(0) => {
                debug!("serial port reached end of stream");
                break;
            }
            Ok(n) => {
                if block_on(pipe.write_all(&buf[..n])).is_err() {
                    break;
                }
            }
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted
                ) => {}
            Err(e) => {
                warn!("serial read failed: {e}");
                break;
            }
        }
    }
    // Readers on the link side see EOF.
    let _ = block_on(pipe.shutdown());
    debug!("serial reader stopped");
}

/// Pipe to port. Ends when the link side is dropped or the port fails.
fn pump_outbound<W: Write>(mut pipe: ReadHalf<DuplexStream>, mut port: W, closed: &AtomicBool) {
    let mut buf = [0u8; 256];
    loop {
        match block_on(pipe.read(&mut buf)) {
            Ok(0) | Err(_) => break,
            Ok(n) => {
                if let Err(e) = port.write_all(&buf[..n]).and_then(|()| port.flush()) {
                    warn!("serial write failed: {e}");
                    break;
                }
            }
        }
    }
    closed.store(true, Ordering::SeqCst);
    debug!("serial writer stopped");
}
