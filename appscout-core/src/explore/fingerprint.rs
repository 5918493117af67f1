use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::TempDir;
use tokio::time::sleep;
use tracing::debug;

use crate::config::{CaptureSection, SettleSection};
use crate::simulator::{DeviceDriver, SimulatorResult};

/// Content digest of a captured frame. Equal fingerprints mean byte-identical
/// captures; an empty fingerprint carries no information.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScreenFingerprint(String);

impl ScreenFingerprint {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(hex::encode(Sha256::digest(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for ScreenFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A captured image together with its fingerprint.
#[derive(Debug, Clone)]
pub struct Frame {
    pub fingerprint: ScreenFingerprint,
    pub bytes: Vec<u8>,
}

impl Frame {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self {
            fingerprint: ScreenFingerprint::of_bytes(&bytes),
            bytes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneChange {
    Unchanged,
    Changed,
    Inconclusive,
}

impl SceneChange {
    pub fn is_changed(&self) -> bool {
        matches!(self, SceneChange::Changed)
    }
}

pub struct SceneFingerprinter {
    driver: Arc<dyn DeviceDriver>,
    scratch: TempDir,
    capture: CaptureSection,
    settle: SettleSection,
    // Shared behind `Arc` by the verifier and prober, so the count needs `Sync`.
    failures: AtomicU64,
}

impl SceneFingerprinter {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        capture: CaptureSection,
        settle: SettleSection,
    ) -> SimulatorResult<Self> {
        let scratch = tempfile::Builder::new().prefix("appscout-frames").tempdir()?;
        Ok(Self {
            driver,
            scratch,
            capture,
            settle,
            failures: AtomicU64::new(0),
        })
    }

    /// Three-way classification; a missing side is never read as "no change".
    pub fn compare(
        before: Option<&ScreenFingerprint>,
        after: Option<&ScreenFingerprint>,
    ) -> SceneChange {
        match (
            before.filter(|fingerprint| !fingerprint.is_empty()),
            after.filter(|fingerprint| !fingerprint.is_empty()),
        ) {
            (Some(before), Some(after)) if before == after => SceneChange::Unchanged,
            (Some(_), Some(_)) => SceneChange::Changed,
            _ => SceneChange::Inconclusive,
        }
    }

    pub fn capture_failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    pub async fn capture(&self) -> Option<ScreenFingerprint> {
        self.capture_frame().await.map(|frame| frame.fingerprint)
    }

    /// Requests a frame into the scratch directory, waits for the file to show
    /// up non-empty, then digests and removes it.
    pub async fn capture_frame(&self) -> Option<Frame> {
        let path = self.scratch_path();
        let _ = tokio::fs::remove_file(&path).await;

        if let Err(err) = self.driver.capture_frame(&path).await {
            debug!(error = %err, "frame capture failed");
            self.failures.fetch_add(1, Ordering::Relaxed);
            return None;
        }

        for attempt in 0..self.capture.poll_attempts {
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.len() > 0 => {
                    let bytes = tokio::fs::read(&path).await;
                    let _ = tokio::fs::remove_file(&path).await;
                    match bytes {
                        Ok(bytes) if !bytes.is_empty() => return Some(Frame::from_bytes(bytes)),
                        Ok(_) => break,
                        Err(err) => {
                            debug!(error = %err, "frame unreadable");
                            break;
                        }
                    }
                }
                _ => {
                    if attempt + 1 < self.capture.poll_attempts {
                        sleep(self.capture.poll_interval()).await;
                    }
                }
            }
        }

        debug!(path = %path.display(), "frame never materialized");
        self.failures.fetch_add(1, Ordering::Relaxed);
        None
    }

    /// Waits for the screen to stop moving: two consecutive identical captures
    /// within the configured window. Falls back to the last frame seen.
    pub async fn settle(&self) -> Option<Frame> {
        sleep(self.settle.min_delay()).await;
        let mut previous: Option<Frame> = None;
        for poll in 0..self.settle.max_polls() {
            if poll > 0 {
                sleep(self.settle.poll_interval()).await;
            }
            let Some(frame) = self.capture_frame().await else {
                continue;
            };
            if let Some(last) = &previous {
                if last.fingerprint == frame.fingerprint {
                    return Some(frame);
                }
            }
            previous = Some(frame);
        }
        debug!("screen did not stabilize within settle window");
        previous
    }

    fn scratch_path(&self) -> PathBuf {
        self.scratch.path().join("frame.png")
    }
}

impl fmt::Debug for SceneFingerprinter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SceneFingerprinter")
            .field("scratch", &self.scratch.path())
            .field("capture", &self.capture)
            .field("settle", &self.settle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fingerprint(value: &str) -> ScreenFingerprint {
        ScreenFingerprint::new(value)
    }

    #[test]
    fn identical_bytes_produce_identical_fingerprints() {
        let a = ScreenFingerprint::of_bytes(b"\x89PNG frame");
        let b = ScreenFingerprint::of_bytes(b"\x89PNG frame");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
        assert_ne!(a, ScreenFingerprint::of_bytes(b"\x89PNG other"));
    }

    #[test]
    fn compare_is_three_way() {
        let a = fingerprint("abc123");
        let b = fingerprint("def456");
        let empty = fingerprint("");
        assert_eq!(
            SceneFingerprinter::compare(Some(&a), Some(&a.clone())),
            SceneChange::Unchanged
        );
        assert_eq!(
            SceneFingerprinter::compare(Some(&a), Some(&b)),
            SceneChange::Changed
        );
        assert_eq!(
            SceneFingerprinter::compare(None, Some(&b)),
            SceneChange::Inconclusive
        );
        assert_eq!(
            SceneFingerprinter::compare(Some(&a), None),
            SceneChange::Inconclusive
        );
        assert_eq!(
            SceneFingerprinter::compare(Some(&empty), Some(&empty)),
            SceneChange::Inconclusive
        );
    }
}
