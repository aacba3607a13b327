//! Notifications for the presentation layer.

use std::fmt;
use std::path::PathBuf;

use crate::message::{AckCode, Command};
use crate::state::RecordingState;

/// Something the user should hear about.
///
/// Sent over an unbounded channel by the controller; the receive task
/// never blocks on a slow reader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    Connected(String),
    ConnectFailed(String),
    Disconnected,
    CommandSent(Command),
    CommandRefused {
        command: Command,
        state: RecordingState,
    },
    RecordingStarted(PathBuf),
    RecordingStopped {
        path: PathBuf,
        frames: u64,
    },
    /// The device refused a start or stop.
    DeviceRejected(AckCode),
    SnapshotAck {
        ok: bool,
    },
    SnapshotSaved(PathBuf),
    SnapshotFailed(String),
    /// Soft problem; recording continues.
    Warning(String),
    /// The current session or link is broken.
    Error(String),
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected(link) => write!(f, "Connected to device ({link})"),
            Self::ConnectFailed(reason) => write!(f, "Failed to connect to device: {reason}"),
            Self::Disconnected => write!(f, "Disconnected from device"),
            Self::CommandSent(Command::SetWhiteBalance(mode)) => {
                write!(f, "White balance set to: {mode}")
            }
            Self::CommandSent(Command::StartRecording(res)) => {
                write!(f, "Starting {res} recording...")
            }
            Self::CommandSent(Command::StopRecording) => write!(f, "Stopping recording..."),
            Self::CommandSent(Command::TakeSnapshot) => write!(f, "Taking snapshot..."),
            Self::CommandSent(Command::Shutdown) => write!(f, "Shutting down device..."),
            Self::CommandRefused { command, state } => match (command, state) {
                (Command::StartRecording(_), RecordingState::Recording) => {
                    write!(f, "Already recording")
                }
                (Command::StopRecording, RecordingState::Idle) => write!(f, "Not recording"),
                (Command::TakeSnapshot, RecordingState::Recording) => {
                    write!(f, "Cannot take snapshot while recording")
                }
                _ => write!(f, "Cannot {command} while {state}"),
            },
            Self::RecordingStarted(path) => {
                write!(f, "Recording started. Saving to {}", path.display())
            }
            Self::RecordingStopped { path, frames } => write!(
                f,
                "Recording stopped. Saved {frames} frames to {}",
                path.display()
            ),
            Self::DeviceRejected(ack) => match ack {
                AckCode::StartFailed => write!(f, "Failed to start recording"),
                AckCode::AlreadyRecording => write!(f, "Device is already recording"),
                AckCode::StopFailed => write!(f, "Failed to stop recording"),
                AckCode::NotRecording => write!(f, "Device is not recording"),
                other => write!(f, "Device rejected command ({other})"),
            },
            Self::SnapshotAck { ok: true } => write!(f, "Snapshot taken successfully"),
            Self::SnapshotAck { ok: false } => write!(f, "Failed to take snapshot"),
            Self::SnapshotSaved(path) => write!(f, "Snapshot saved to {}", path.display()),
            Self::SnapshotFailed(reason) => write!(f, "Failed to save snapshot: {reason}"),
            Self::Warning(msg) => write!(f, "Warning: {msg}"),
            Self::Error(msg) => write!(f, "Error: {msg}"),
        }
    }
}

// ── RecorderStatus ───────────────────────────────────────────────

/// Snapshot of the recorder, published on every change.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecorderStatus {
    pub state: RecordingState,
    pub frame_count: u64,
    /// Known once the first video frame opened the encoder.
    pub fps: Option<u8>,
    pub file: Option<PathBuf>,
}

impl fmt::Display for RecorderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.state {
            RecordingState::Idle => write!(f, "IDLE"),
            RecordingState::Recording => {
                write!(f, "RECORDING (Frames: {}", self.frame_count)?;
                if let Some(fps) = self.fps {
                    write!(f, ", FPS: {fps}")?;
                }
                write!(f, ")")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{Resolution, WhiteBalance};

    #[test]
    fn status_text() {
        assert_eq!(RecorderStatus::default().to_string(), "IDLE");

        let mut status = RecorderStatus {
            state: RecordingState::Recording,
            frame_count: 12,
            fps: None,
            file: None,
        };
        assert_eq!(status.to_string(), "RECORDING (Frames: 12)");
        status.fps = Some(30);
        assert_eq!(status.to_string(), "RECORDING (Frames: 12, FPS: 30)");
    }

    #[test]
    fn event_messages() {
        let e = StatusEvent::CommandSent(Command::StartRecording(Resolution::Hd));
        assert_eq!(e.to_string(), "Starting HD recording...");

        let e = StatusEvent::CommandRefused {
            command: Command::StopRecording,
            state: RecordingState::Idle,
        };
        assert_eq!(e.to_string(), "Not recording");

        let e = StatusEvent::RecordingStopped {
            path: PathBuf::from("videos/v.mp4"),
            frames: 42,
        };
        assert_eq!(e.to_string(), "Recording stopped. Saved 42 frames to videos/v.mp4");

        let e = StatusEvent::CommandSent(Command::SetWhiteBalance(WhiteBalance::Daylight));
        assert!(e.to_string().starts_with("White balance set to:"));

        let e = StatusEvent::DeviceRejected(AckCode::AlreadyRecording);
        assert_eq!(e.to_string(), "Device is already recording");
    }
}
