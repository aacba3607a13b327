//! Still images captured on demand.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tracing::info;

use crate::error::CameraResult;
use crate::sink::{ImageCodec, timestamped_path};

/// Writes each snapshot payload to its own `snapshot_<timestamp>.jpg`.
#[derive(Clone)]
pub struct SnapshotSink {
    dir: PathBuf,
    codec: Arc<dyn ImageCodec>,
}

impl SnapshotSink {
    pub fn new(dir: impl Into<PathBuf>, codec: Arc<dyn ImageCodec>) -> Self {
        Self {
            dir: dir.into(),
            codec,
        }
    }

    /// Decode and re-encode `jpeg` into a fresh file. A payload that does
    /// not decode produces no file.
    pub async fn save(&self, jpeg: Bytes) -> CameraResult<PathBuf> {
        let codec = Arc::clone(&self.codec);
        let dir = self.dir.clone();
        let path = tokio::task::spawn_blocking(move || -> CameraResult<PathBuf> {
            let frame = codec.decode(&jpeg)?;
            let path = timestamped_path(&dir, "snapshot", "jpg")?;
            codec.save(&frame, &path)?;
            Ok(path)
        })
        .await??;
        info!("snapshot saved: {}", path.display());
        Ok(path)
    }
}

impl std::fmt::Debug for SnapshotSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotSink").field("dir", &self.dir).finish()
    }
}
