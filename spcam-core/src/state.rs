//! Recording state machine driven by device acknowledgements.
//!
//! The device is authoritative: the state only changes when an
//! [`AckCode`] arrives, never when a command is sent.
//!
//! ```text
//!            start-ok
//!   IDLE ───────────────► RECORDING
//!     ▲                       │
//!     └───────────────────────┘
//!            stop-ok
//! ```

use std::fmt;

use crate::error::CameraError;
use crate::message::{AckCode, Command};

// ── RecordingState ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecordingState {
    #[default]
    Idle,
    Recording,
}

impl fmt::Display for RecordingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "IDLE"),
            Self::Recording => write!(f, "RECORDING"),
        }
    }
}

impl RecordingState {
    pub fn is_recording(&self) -> bool {
        matches!(self, Self::Recording)
    }

    /// Pre-flight check before a command goes on the wire.
    ///
    /// Start and snapshot need `Idle`, stop needs `Recording`. Shutdown
    /// and white balance are always allowed.
    pub fn permits(&self, command: Command) -> Result<(), CameraError> {
        let allowed = match command {
            Command::StartRecording(_) | Command::TakeSnapshot => !self.is_recording(),
            Command::StopRecording => self.is_recording(),
            Command::Shutdown | Command::SetWhiteBalance(_) => true,
        };
        if allowed {
            Ok(())
        } else {
            Err(CameraError::CommandRefused {
                command,
                state: *self,
            })
        }
    }
}

// ── Transition ───────────────────────────────────────────────────

/// What an acknowledgement did to the machine.
///
/// The caller performs the side effect (open or finalize the sink,
/// notify the user).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// `Idle → Recording`: open a new video sink.
    Started,
    /// `Recording → Idle`: finalize the video sink.
    Stopped,
    /// The device refused a start or stop; state unchanged.
    Rejected(AckCode),
    /// Snapshot result; state unchanged.
    Snapshot { ok: bool },
    /// The ack makes no sense in the current state; state unchanged.
    Unexpected {
        ack: AckCode,
        state: RecordingState,
    },
}

// ── RecordingStateMachine ────────────────────────────────────────

#[derive(Debug, Default)]
pub struct RecordingStateMachine {
    state: RecordingState,
}

impl RecordingStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> RecordingState {
        self.state
    }

    /// Apply an acknowledgement.
    pub fn on_ack(&mut self, ack: AckCode) -> Transition {
        use AckCode::*;
        use RecordingState::*;

        match (self.state, ack) {
            (Idle, StartOk) => {
                self.state = Recording;
                Transition::Started
            }
            (Recording, StopOk) => {
                self.state = Idle;
                Transition::Stopped
            }
            (Idle, StartFailed | AlreadyRecording) => Transition::Rejected(ack),
            (Recording, StopFailed | NotRecording) => Transition::Rejected(ack),
            (_, SnapshotOk) => Transition::Snapshot { ok: true },
            (_, SnapshotFailed) => Transition::Snapshot { ok: false },
            (state, ack) => Transition::Unexpected { ack, state },
        }
    }

    /// Force-reset to `Idle` regardless of current state.
    ///
    /// Use this when the video sink fails and the session cannot
    /// continue.
    pub fn force_idle(&mut self) -> bool {
        let was_recording = self.state.is_recording();
        self.state = RecordingState::Idle;
        was_recording
    }
}

// ── Tests ────────────────────────────────────────────────────────
