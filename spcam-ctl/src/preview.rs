//! Live preview consumer: keeps one file holding the newest frame.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use spcam_core::PreviewQueue;
use tracing::{debug, warn};

/// How long one wait for a frame lasts before the stop flag is rechecked.
const POLL: Duration = Duration::from_millis(250);

/// Drain `queue` into `path` until `running` goes false.
///
/// Frames that piled up since the last write are skipped; only the
/// newest is written. Returns the number of files written.
pub async fn run_preview_writer(
    queue: Arc<PreviewQueue>,
    path: PathBuf,
    running: Arc<AtomicBool>,
) -> u64 {
    let staging = path.with_extension("part");
    let mut written = 0u64;

    while running.load(Ordering::SeqCst) {
        let Some(mut latest) = queue.pop_timeout(POLL).await else {
            continue;
        };
        while let Some(frame) = queue.try_pop() {
            latest = frame;
        }

        match replace_file(&staging, &path, &latest).await {
            Ok(()) => written += 1,
            Err(e) => warn!("failed to update preview {}: {e}", path.display()),
        }
    }

    debug!("preview writer stopped after {written} updates");
    written
}

/// Write to `staging`, then rename over `path` so readers never see a
/// half-written image.
async fn replace_file(staging: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    tokio::fs::write(staging, data).await?;
    tokio::fs::rename(staging, path).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_newest_frame() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("live.jpg");
        let queue = Arc::new(PreviewQueue::new(8));
        let running = Arc::new(AtomicBool::new(true));

        for n in 1..=3u8 {
            queue.push(vec![n; 4].into());
        }
        let task = tokio::spawn(run_preview_writer(
            Arc::clone(&queue),
            path.clone(),
            Arc::clone(&running),
        ));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !path.exists() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        running.store(false, Ordering::SeqCst);
        let written = task.await.unwrap();

        assert_eq!(written, 1);
        assert_eq!(std::fs::read(&path).unwrap(), vec![3; 4]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn stops_when_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let running = Arc::new(AtomicBool::new(false));
        let written = run_preview_writer(
            Arc::new(PreviewQueue::new(2)),
            tmp.path().join("live.jpg"),
            running,
        )
        .await;
        assert_eq!(written, 0);
    }
}
