//! Video encoding through an external `ffmpeg` process.
//!
//! Decoded RGB24 frames are written to ffmpeg's stdin as raw video;
//! ffmpeg muxes them into the target container.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info};

use crate::error::{CameraError, CameraResult};
use crate::sink::{EncoderFactory, PixelFrame, VideoEncoder};

/// Map a fourcc to the ffmpeg encoder producing it.
pub fn encoder_for_fourcc(fourcc: &str) -> CameraResult<&'static str> {
    match fourcc.to_ascii_lowercase().as_str() {
        "mp4v" => Ok("mpeg4"),
        "avc1" => Ok("libx264"),
        "mjpg" => Ok("mjpeg"),
        _ => Err(CameraError::UnknownVariant {
            type_name: "fourcc",
            value: fourcc.to_string(),
        }),
    }
}

// ── FfmpegEncoderFactory ─────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct FfmpegEncoderFactory {
    program: PathBuf,
}

impl FfmpegEncoderFactory {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(path: &Path, encoder: &str, fourcc: &str, fps: u8, width: u32, height: u32) -> Vec<String> {
        vec![
            "-y".into(),
            "-loglevel".into(),
            "error".into(),
            "-f".into(),
            "rawvideo".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            "-s".into(),
            format!("{width}x{height}"),
            "-r".into(),
            fps.to_string(),
            "-i".into(),
            "-".into(),
            "-c:v".into(),
            encoder.into(),
            "-vtag".into(),
            fourcc.to_ascii_lowercase(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            path.display().to_string(),
        ]
    }
}

impl Default for FfmpegEncoderFactory {
    fn default() -> Self {
        Self::new("ffmpeg")
    }
}

#[async_trait]
impl EncoderFactory for FfmpegEncoderFactory {
    async fn open(
        &self,
        path: &Path,
        fourcc: &str,
        fps: u8,
        width: u32,
        height: u32,
    ) -> CameraResult<Box<dyn VideoEncoder>> {
        let encoder = encoder_for_fourcc(fourcc)?;
        let args = Self::args(path, encoder, fourcc, fps, width, height);
        info!("starting ffmpeg encoder: {:?}", args);

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CameraError::SinkOpen {
                path: path.to_path_buf(),
                reason: format!("failed to start {}: {e}", self.program.display()),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| CameraError::SinkOpen {
            path: path.to_path_buf(),
            reason: "failed to capture ffmpeg stdin".into(),
        })?;

        Ok(Box::new(FfmpegEncoder {
            child: Some(child),
            stdin: Some(stdin),
            frame_size: width as usize * height as usize * 3,
            frame_count: 0,
        }))
    }
}

// ── FfmpegEncoder ────────────────────────────────────────────────

pub struct FfmpegEncoder {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    frame_size: usize,
    frame_count: u64,
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn write_frame(&mut self, frame: &PixelFrame) -> CameraResult<()> {
        if frame.data.len() != self.frame_size {
            return Err(CameraError::SinkWrite(format!(
                "frame holds {} bytes, encoder expects {}",
                frame.data.len(),
                self.frame_size
            )));
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| CameraError::SinkWrite("encoder already finished".into()))?;
        stdin
            .write_all(&frame.data)
            .await
            .map_err(|e| CameraError::SinkWrite(format!("failed to write frame: {e}")))?;
        self.frame_count += 1;
        Ok(())
    }

    async fn finish(&mut self) -> CameraResult<u64> {
        // Closing stdin signals EOF to ffmpeg.
        if let Some(mut stdin) = self.stdin.take() {
            let _ = stdin.shutdown().await;
        }
        let Some(child) = self.child.take() else {
            return Ok(self.frame_count);
        };

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CameraError::Encoder(format!("failed to wait for ffmpeg: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CameraError::Encoder(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        debug!("ffmpeg finished: {} frames", self.frame_count);
        Ok(self.frame_count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourcc_mapping() {
        assert_eq!(encoder_for_fourcc("mp4v").unwrap(), "mpeg4");
        assert_eq!(encoder_for_fourcc("AVC1").unwrap(), "libx264");
        assert_eq!(encoder_for_fourcc("MJPG").unwrap(), "mjpeg");
        assert!(encoder_for_fourcc("xvid").is_err());
    }

    #[test]
    fn args_describe_raw_input() {
        let args = FfmpegEncoderFactory::args(Path::new("out.mp4"), "mpeg4", "mp4v", 30, 640, 480);
        let joined = args.join(" ");
        assert!(joined.contains("-f rawvideo -pix_fmt rgb24 -s 640x480 -r 30 -i -"));
        assert!(joined.contains("-c:v mpeg4 -vtag mp4v"));
        assert_eq!(args.last().unwrap(), "out.mp4");
    }

    #[tokio::test]
    async fn missing_program_is_a_sink_open_error() {
        let factory = FfmpegEncoderFactory::new("/nonexistent/ffmpeg-binary");
        let err = match factory.open(Path::new("x.mp4"), "mp4v", 30, 2, 2).await {
            Ok(_) => panic!("spawn should fail"),
            Err(e) => e,
        };
        assert!(matches!(err, CameraError::SinkOpen { .. }));
    }
}
