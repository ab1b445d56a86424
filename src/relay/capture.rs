//! Optional debug sink for the raw audio a session forwarded upstream.
//!
//! Only allocated when a capture directory is configured, so the common
//! path carries no buffer at all. Writing happens once, at session end, and
//! is fire-and-forget: a failed dump is logged and the session outcome is
//! unaffected.

use std::path::PathBuf;
use tracing::{info, warn};

pub struct AudioCapture {
    dir: PathBuf,
    session_id: String,
    buffer: Vec<u8>,
}

impl AudioCapture {
    pub fn new(dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            session_id: session_id.into(),
            buffer: Vec::new(),
        }
    }

    /// Append one client audio frame.
    pub fn push(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Write the accumulated bytes to `<dir>/<session-id>.raw`. Consumes the
    /// capture; errors are logged, never returned.
    pub async fn flush(self) {
        if self.buffer.is_empty() {
            return;
        }
        let path = self.dir.join(format!("{}.raw", self.session_id));
        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), %err, "could not create capture directory");
            return;
        }
        match tokio::fs::write(&path, &self.buffer).await {
            Ok(()) => info!(
                path = %path.display(),
                bytes = self.buffer.len(),
                "wrote session audio capture"
            ),
            Err(err) => warn!(path = %path.display(), %err, "audio capture write failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_one_file_per_session() {
        let dir = tempfile::tempdir().unwrap();
        let mut capture = AudioCapture::new(dir.path(), "session-a");
        capture.push(&[1, 2, 3]);
        capture.push(&[4, 5]);
        assert_eq!(capture.len(), 5);
        capture.flush().await;

        let written = std::fs::read(dir.path().join("session-a.raw")).unwrap();
        assert_eq!(written, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn empty_capture_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        AudioCapture::new(dir.path(), "session-b").flush().await;
        assert!(!dir.path().join("session-b.raw").exists());
    }

    #[tokio::test]
    async fn flush_failure_is_swallowed() {
        // Point at a path that cannot be a directory.
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut capture = AudioCapture::new(file.path(), "session-c");
        capture.push(&[9]);
        // Must not panic or propagate.
        capture.flush().await;
    }
}
