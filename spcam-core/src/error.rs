//! Domain-specific error types for the camera link.
//!
//! Fallible operations return `Result<T, CameraError>`. Framing and
//! decode problems inside the receive task never surface here; they are
//! absorbed where they are detected and reported as status events.

use std::path::PathBuf;

use thiserror::Error;

use crate::message::Command;
use crate::state::RecordingState;

/// The canonical error type for the camera link.
#[derive(Debug, Error)]
pub enum CameraError {
    // ── Transport Errors ─────────────────────────────────────────
    /// The serial link or its I/O layer reported an error.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// A command was issued with no open link.
    #[error("not connected")]
    NotConnected,

    /// `connect` was called while a link is already open.
    #[error("already connected")]
    AlreadyConnected,

    // ── Protocol Errors ──────────────────────────────────────────
    /// The local guard refused a command for the current recording state.
    #[error("{command} refused while {state}")]
    CommandRefused {
        command: Command,
        state: RecordingState,
    },

    /// A value did not map to any known enum variant.
    #[error("unknown {type_name}: {value}")]
    UnknownVariant {
        type_name: &'static str,
        value: String,
    },

    /// A frame arrived with dimensions different from the open sink.
    #[error("frame is {actual_width}x{actual_height}, sink expects {expected_width}x{expected_height}")]
    DimensionMismatch {
        expected_width: u32,
        expected_height: u32,
        actual_width: u32,
        actual_height: u32,
    },

    // ── Codec / Sink Errors ──────────────────────────────────────
    /// The image codec rejected a payload.
    #[error("image decode failed: {0}")]
    Decode(String),

    /// A video or snapshot file could not be created.
    #[error("cannot open sink {path}: {reason}")]
    SinkOpen { path: PathBuf, reason: String },

    /// Writing to an open sink failed.
    #[error("sink write failed: {0}")]
    SinkWrite(String),

    /// The external encoder process failed.
    #[error("encoder error: {0}")]
    Encoder(String),

    // ── Task Errors ──────────────────────────────────────────────
    /// The receive task panicked or was aborted.
    #[error("receive task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result alias used throughout the crate.
pub type CameraResult<T> = Result<T, CameraError>;

// ── Convenient From implementations ──────────────────────────────

impl From<image::ImageError> for CameraError {
    fn from(e: image::ImageError) -> Self {
        CameraError::Decode(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Resolution;

    #[test]
    fn error_display_messages() {
        let e = CameraError::CommandRefused {
            command: Command::StartRecording(Resolution::Vga),
            state: RecordingState::Recording,
        };
        assert!(e.to_string().contains("refused"));
        assert!(e.to_string().contains("RECORDING"));

        let e = CameraError::DimensionMismatch {
            expected_width: 640,
            expected_height: 480,
            actual_width: 320,
            actual_height: 240,
        };
        assert!(e.to_string().contains("320x240"));
        assert!(e.to_string().contains("640x480"));
    }

    #[test]
    fn from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe broke");
        let e: CameraError = io_err.into();
        assert!(matches!(e, CameraError::Transport(_)));
    }
}
