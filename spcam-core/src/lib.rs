//! # spcam-core
//!
//! Host-side control library for a serial camera.
//!
//! This crate contains:
//! - **Messages**: `Command`, `AckCode`, `FrameMessage`, `Resolution`, `WhiteBalance`
//! - **Codec**: `CameraCodec`, the demultiplexer for the shared ack/frame stream
//! - **Protocol**: `ProtocolHandler` and the receive loop
//! - **State**: `RecordingStateMachine`, driven by device acknowledgements
//! - **Distributor**: `FrameDistributor`, fanning frames to video, snapshot and preview
//! - **Sinks**: video files via `ffmpeg`, JPEG snapshots via `image`
//! - **Controller**: `CameraController`, the application façade
//! - **Error**: `CameraError`, a `thiserror`-based error enum

pub mod codec;
pub mod controller;
pub mod distributor;
pub mod error;
pub mod events;
pub mod message;
pub mod preview;
pub mod protocol;
pub mod sink;
pub mod state;
pub mod transport;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{CameraCodec, DemuxStats};
pub use controller::{CameraController, ControllerConfig, EVENT_CAPACITY};
pub use distributor::{FrameDistributor, FrameOutcome};
pub use error::{CameraError, CameraResult};
pub use events::{RecorderStatus, StatusEvent};
pub use message::{
    AckCode, Command, FrameMessage, Message, Resolution, SNAPSHOT_FRAME_NUMBER, WhiteBalance,
};
pub use preview::{DEFAULT_PREVIEW_CAPACITY, PreviewQueue};
pub use protocol::{BoxedReader, BoxedWriter, MessageHandler, ProtocolHandler, receive_loop};
pub use sink::{
    EncoderFactory, FfmpegEncoderFactory, ImageCodec, JpegCodec, PixelFrame, SnapshotSink,
    VideoEncoder, VideoSink,
};
pub use state::{RecordingState, RecordingStateMachine, Transition};
pub use transport::{SerialTransport, Transport};
