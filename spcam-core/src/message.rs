//! Device commands, acknowledgement codes and inbound message types.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;

use crate::error::CameraError;

/// Frame number reserved for snapshot frames.
pub const SNAPSHOT_FRAME_NUMBER: u32 = 0xFFFF_FFFF;

// ── Resolution ───────────────────────────────────────────────────

/// Recording resolutions offered by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    /// 320x240.
    Qvga,
    /// 640x480.
    Vga,
    /// 1280x720.
    Hd,
}

impl Resolution {
    pub const ALL: [Resolution; 3] = [Resolution::Qvga, Resolution::Vga, Resolution::Hd];

    /// Wire byte that starts a recording at this resolution.
    pub const fn wire_byte(self) -> u8 {
        match self {
            Resolution::Qvga => b'a',
            Resolution::Vga => b'b',
            Resolution::Hd => b'c',
        }
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Qvga => write!(f, "QVGA"),
            Resolution::Vga => write!(f, "VGA"),
            Resolution::Hd => write!(f, "HD"),
        }
    }
}

impl FromStr for Resolution {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "qvga" => Ok(Resolution::Qvga),
            "vga" => Ok(Resolution::Vga),
            "hd" => Ok(Resolution::Hd),
            _ => Err(CameraError::UnknownVariant {
                type_name: "Resolution",
                value: s.to_string(),
            }),
        }
    }
}

// ── WhiteBalance ─────────────────────────────────────────────────

/// White-balance presets, each selected by a single wire character.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WhiteBalance {
    Auto,
    Incandescent,
    Fluorescent,
    Daylight,
    Cloudy,
    Shade,
}

impl WhiteBalance {
    pub const ALL: [WhiteBalance; 6] = [
        WhiteBalance::Auto,
        WhiteBalance::Incandescent,
        WhiteBalance::Fluorescent,
        WhiteBalance::Daylight,
        WhiteBalance::Cloudy,
        WhiteBalance::Shade,
    ];

    pub const fn wire_byte(self) -> u8 {
        match self {
            WhiteBalance::Auto => b'B',
            WhiteBalance::Incandescent => b'C',
            WhiteBalance::Fluorescent => b'D',
            WhiteBalance::Daylight => b'G',
            WhiteBalance::Cloudy => b'I',
            WhiteBalance::Shade => b'J',
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            WhiteBalance::Auto => "auto",
            WhiteBalance::Incandescent => "incandescent",
            WhiteBalance::Fluorescent => "fluorescent",
            WhiteBalance::Daylight => "daylight",
            WhiteBalance::Cloudy => "cloudy",
            WhiteBalance::Shade => "shade",
        }
    }
}

impl TryFrom<u8> for WhiteBalance {
    type Error = CameraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        WhiteBalance::ALL
            .into_iter()
            .find(|mode| mode.wire_byte() == value)
            .ok_or_else(|| CameraError::UnknownVariant {
                type_name: "WhiteBalance",
                value: (value as char).to_string(),
            })
    }
}

/// Accepts either the wire character (`"B"`) or the preset name (`"daylight"`).
impl FromStr for WhiteBalance {
    type Err = CameraError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let [b] = s.as_bytes() {
            return WhiteBalance::try_from(*b);
        }
        WhiteBalance::ALL
            .into_iter()
            .find(|mode| mode.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| CameraError::UnknownVariant {
                type_name: "WhiteBalance",
                value: s.to_string(),
            })
    }
}

impl fmt::Display for WhiteBalance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Command ──────────────────────────────────────────────────────

/// Commands understood by the device. Each is a single ASCII byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Command {
    StartRecording(Resolution),
    StopRecording,
    TakeSnapshot,
    Shutdown,
    SetWhiteBalance(WhiteBalance),
}

impl Command {
    pub const fn wire_byte(self) -> u8 {
        match self {
            Command::StartRecording(res) => res.wire_byte(),
            Command::StopRecording => b'0',
            Command::TakeSnapshot => b's',
            Command::Shutdown => b'1',
            Command::SetWhiteBalance(mode) => mode.wire_byte(),
        }
    }
}

impl TryFrom<u8> for Command {
    type Error = CameraError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            b'a' => Ok(Command::StartRecording(Resolution::Qvga)),
            b'b' => Ok(Command::StartRecording(Resolution::Vga)),
            b'c' => Ok(Command::StartRecording(Resolution::Hd)),
            b'0' => Ok(Command::StopRecording),
            b's' => Ok(Command::TakeSnapshot),
            b'1' => Ok(Command::Shutdown),
            other => WhiteBalance::try_from(other)
                .map(Command::SetWhiteBalance)
                .map_err(|_| CameraError::UnknownVariant {
                    type_name: "Command",
                    value: (other as char).to_string(),
                }),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::StartRecording(res) => write!(f, "start recording ({res})"),
            Command::StopRecording => write!(f, "stop recording"),
            Command::TakeSnapshot => write!(f, "take snapshot"),
            Command::Shutdown => write!(f, "shutdown"),
            Command::SetWhiteBalance(mode) => write!(f, "white balance {mode}"),
        }
    }
}

// ── AckCode ──────────────────────────────────────────────────────

/// Length of an acknowledgement on the wire, prefix included.
pub const ACK_LEN: usize = 8;

/// Asynchronous acknowledgements sent by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AckCode {
    StartOk,
    StartFailed,
    AlreadyRecording,
    StopOk,
    StopFailed,
    NotRecording,
    SnapshotOk,
    SnapshotFailed,
}

impl AckCode {
    pub const ALL: [AckCode; 8] = [
        AckCode::StartOk,
        AckCode::StartFailed,
        AckCode::AlreadyRecording,
        AckCode::StopOk,
        AckCode::StopFailed,
        AckCode::NotRecording,
        AckCode::SnapshotOk,
        AckCode::SnapshotFailed,
    ];

    pub const fn as_bytes(self) -> &'static [u8; ACK_LEN] {
        match self {
            AckCode::StartOk => b"rsp:VST.",
            AckCode::StartFailed => b"rsp:VST!",
            AckCode::AlreadyRecording => b"rsp:VST#",
            AckCode::StopOk => b"rsp:VSP.",
            AckCode::StopFailed => b"rsp:VSP!",
            AckCode::NotRecording => b"rsp:VSP#",
            AckCode::SnapshotOk => b"rsp:SST.",
            AckCode::SnapshotFailed => b"rsp:SST!",
        }
    }

    /// Returns `true` for the two snapshot acknowledgements.
    pub fn is_snapshot(self) -> bool {
        matches!(self, AckCode::SnapshotOk | AckCode::SnapshotFailed)
    }
}

impl TryFrom<&[u8]> for AckCode {
    type Error = CameraError;

    fn try_from(value: &[u8]) -> Result<Self, Self::Error> {
        AckCode::ALL
            .into_iter()
            .find(|code| code.as_bytes().as_slice() == value)
            .ok_or_else(|| CameraError::UnknownVariant {
                type_name: "AckCode",
                value: String::from_utf8_lossy(value).into_owned(),
            })
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.as_bytes()))
    }
}

// ── Inbound messages ─────────────────────────────────────────────

/// One JPEG image extracted from the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameMessage {
    pub frame_number: u32,
    pub fps: u8,
    pub payload: Bytes,
}

impl FrameMessage {
    /// Snapshot frames carry the reserved frame number.
    pub fn is_snapshot(&self) -> bool {
        self.frame_number == SNAPSHOT_FRAME_NUMBER
    }
}

/// Everything the demultiplexer can emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Ack(AckCode),
    Frame(FrameMessage),
}
