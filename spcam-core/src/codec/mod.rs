//! Stream demultiplexer for the camera link.
//!
//! Acknowledgements and JPEG frames share one byte stream. The
//! [`CameraCodec`] decoder pulls them apart and resynchronises after
//! line noise. Its encoder writes single-byte commands.
//!
//! ## Wire format
//!
//! **Acknowledgement** (8 bytes):
//! ```text
//! prefix:        "rsp:"  (4)
//! code:          ASCII   (4)
//! ```
//!
//! **Frame** (13 byte header + payload_size):
//! ```text
//! prefix:        "jpg:"  (4)
//! fps:           u8      (1)
//! frame_number:  u32 LE  (4)   0xFFFFFFFF = snapshot
//! payload_size:  u32 LE  (4)   jpeg bytes + end marker
//! jpeg:          [u8]    (payload_size - 4)
//! end_marker:    u32 LE  (4)   0xFA01FB00
//! ```

use bytes::{Buf, BytesMut};
use tracing::{debug, trace, warn};

use crate::error::CameraError;
use crate::message::{ACK_LEN, AckCode, Command, FrameMessage, Message};

// ── Constants ────────────────────────────────────────────────────

pub const ACK_PREFIX: &[u8; 4] = b"rsp:";
pub const FRAME_PREFIX: &[u8; 4] = b"jpg:";
pub const PREFIX_LEN: usize = 4;

/// prefix(4) + fps(1) + frame_number(4) + payload_size(4).
pub const FRAME_HEADER_LEN: usize = 13;

/// Trailing constant closing every frame.
pub const END_MARKER: u32 = 0xFA01_FB00;
pub const END_MARKER_LEN: usize = 4;

/// Declared payload sizes above this are treated as a corrupted header.
pub const MAX_PAYLOAD_SIZE: u32 = 1_000_000;

// ── DemuxStats ───────────────────────────────────────────────────

/// Running counters kept by the decoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DemuxStats {
    pub acks: u64,
    pub frames: u64,
    /// Bytes dropped while hunting for a prefix.
    pub garbage_bytes: u64,
    /// Frame headers skipped because of an impossible size field.
    pub bad_sizes: u64,
    /// Complete frames dropped because the end marker did not match.
    pub bad_markers: u64,
    /// `rsp:` messages whose code is not a known acknowledgement.
    pub unknown_acks: u64,
}

// ── CameraCodec ──────────────────────────────────────────────────

/// Demultiplexer for the inbound stream and encoder for commands.
#[derive(Debug, Default)]
pub struct CameraCodec {
    stats: DemuxStats,
}

impl CameraCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> DemuxStats {
        self.stats
    }

    /// Try to take one frame off the head of `src`.
    ///
    /// `src` must start with [`FRAME_PREFIX`].
    fn take_frame(&mut self, src: &mut BytesMut) -> FrameStep {
        if src.len() < FRAME_HEADER_LEN {
            trace!(buffered = src.len(), "incomplete frame header");
            return FrameStep::NeedMore;
        }

        let fps = src[4];
        let frame_number = u32::from_le_bytes([src[5], src[6], src[7], src[8]]);
        let payload_size = u32::from_le_bytes([src[9], src[10], src[11], src[12]]);

        // A size that cannot hold the end marker is as corrupt as one
        // above the ceiling.
        if payload_size > MAX_PAYLOAD_SIZE || (payload_size as usize) < END_MARKER_LEN {
            warn!(payload_size, "invalid frame size, skipping prefix");
            self.stats.bad_sizes += 1;
            src.advance(PREFIX_LEN);
            return FrameStep::Skipped;
        }

        let total = FRAME_HEADER_LEN + payload_size as usize;
        if src.len() < total {
            trace!(buffered = src.len(), total, "incomplete frame");
            src.reserve(total - src.len());
            return FrameStep::NeedMore;
        }

        let mut raw = src.split_to(total);
        let marker_at = total - END_MARKER_LEN;
        let end_marker = u32::from_le_bytes([
            raw[marker_at],
            raw[marker_at + 1],
            raw[marker_at + 2],
            raw[marker_at + 3],
        ]);

        if end_marker != END_MARKER {
            warn!(
                frame_number,
                "invalid end marker {end_marker:#010X}, expected {END_MARKER:#010X}"
            );
            self.stats.bad_markers += 1;
            return FrameStep::Skipped;
        }

        raw.truncate(marker_at);
        raw.advance(FRAME_HEADER_LEN);
        self.stats.frames += 1;
        debug!(frame_number, fps, bytes = raw.len(), "frame extracted");

        FrameStep::Frame(FrameMessage {
            frame_number,
            fps,
            payload: raw.freeze(),
        })
    }
}

enum FrameStep {
    Frame(FrameMessage),
    Skipped,
    NeedMore,
}

/// `true` when `buf` is shorter than a prefix but could still grow into one.
fn is_partial_prefix(buf: &[u8]) -> bool {
    buf.len() < PREFIX_LEN && (ACK_PREFIX.starts_with(buf) || FRAME_PREFIX.starts_with(buf))
}

/// Bytes that can be dropped before the next possible prefix start.
///
/// Only the first prefix bytes (`r`, `j`) can begin a message, so every
/// other byte is garbage. Always at least 1.
fn garbage_run(buf: &[u8]) -> usize {
    buf.iter()
        .skip(1)
        .position(|&b| b == ACK_PREFIX[0] || b == FRAME_PREFIX[0])
        .map_or(buf.len(), |pos| pos + 1)
}

impl tokio_util::codec::Decoder for CameraCodec {
    type Item = Message;
    type Error = CameraError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            if src.starts_with(ACK_PREFIX) {
                if src.len() < ACK_LEN {
                    return Ok(None);
                }
                let raw = src.split_to(ACK_LEN);
                match AckCode::try_from(&raw[..]) {
                    Ok(code) => {
                        self.stats.acks += 1;
                        debug!(%code, "ack received");
                        return Ok(Some(Message::Ack(code)));
                    }
                    Err(e) => {
                        warn!("dropping {e}");
                        self.stats.unknown_acks += 1;
                        continue;
                    }
                }
            }

            if src.starts_with(FRAME_PREFIX) {
                match self.take_frame(src) {
                    FrameStep::Frame(frame) => return Ok(Some(Message::Frame(frame))),
                    FrameStep::Skipped => continue,
                    FrameStep::NeedMore => return Ok(None),
                }
            }

            if is_partial_prefix(src) {
                return Ok(None);
            }

            let skip = garbage_run(src);
            trace!(skip, "resynchronising");
            self.stats.garbage_bytes += skip as u64;
            src.advance(skip);
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        match self.decode(buf)? {
            Some(message) => Ok(Some(message)),
            None => {
                if !buf.is_empty() {
                    debug!(bytes = buf.len(), "discarding incomplete message at end of stream");
                    self.stats.garbage_bytes += buf.len() as u64;
                    buf.clear();
                }
                Ok(None)
            }
        }
    }
}

impl tokio_util::codec::Encoder<Command> for CameraCodec {
    type Error = CameraError;

    fn encode(&mut self, item: Command, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&[item.wire_byte()]);
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────
