use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::simulator::{ExplorationMetrics, SimulatorResult};

use super::fingerprint::{Frame, SceneChange, ScreenFingerprint};

pub const URLS_FILE: &str = "urls.json";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ManifestEntry {
    pub sequence: u32,
    pub label: String,
    pub path: PathBuf,
}

/// Mutable state of one run. Every screenshot goes through [`record`](Self::record).
#[derive(Debug)]
pub struct ExplorationSession {
    output_dir: PathBuf,
    screenshot_sequence: u32,
    seen_fingerprints: HashSet<ScreenFingerprint>,
    manifest: Vec<ManifestEntry>,
    metrics: ExplorationMetrics,
    notes: Vec<String>,
}

impl ExplorationSession {
    pub async fn create<P: AsRef<Path>>(output_dir: P) -> SimulatorResult<Self> {
        let output_dir = output_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&output_dir).await?;
        Ok(Self {
            output_dir,
            screenshot_sequence: 0,
            seen_fingerprints: HashSet::new(),
            manifest: Vec::new(),
            metrics: ExplorationMetrics::default(),
            notes: Vec::new(),
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn sequence(&self) -> u32 {
        self.screenshot_sequence
    }

    pub fn manifest(&self) -> &[ManifestEntry] {
        &self.manifest
    }

    pub fn metrics(&self) -> &ExplorationMetrics {
        &self.metrics
    }

    pub fn notes(&self) -> &[String] {
        &self.notes
    }

    pub fn has_seen(&self, fingerprint: &ScreenFingerprint) -> bool {
        self.seen_fingerprints.contains(fingerprint)
    }

    pub fn record_probe(&mut self, change: SceneChange) {
        self.metrics.record_probe(change);
    }

    pub fn record_back_navigation(&mut self) {
        self.metrics.record_back_navigation();
    }

    pub fn record_deep_link(&mut self) {
        self.metrics.record_deep_link();
    }

    pub fn set_capture_failures(&mut self, failures: u64) {
        self.metrics.capture_failures = failures;
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        debug!(note = %note, "session note");
        self.notes.push(note);
    }

    /// Stores `frame` as `NN_label.png` unless its fingerprint was seen before.
    /// Returns the new manifest entry when something was written.
    pub async fn record(&mut self, frame: &Frame, label: &str) -> Option<ManifestEntry> {
        if frame.fingerprint.is_empty() || frame.bytes.is_empty() {
            return None;
        }
        if self.seen_fingerprints.contains(&frame.fingerprint) {
            self.metrics.record_duplicate();
            debug!(label, fingerprint = %frame.fingerprint, "duplicate screen skipped");
            return None;
        }

        let sequence = self.screenshot_sequence + 1;
        let label = sanitize_label(label);
        let path = self.output_dir.join(format!("{sequence:02}_{label}.png"));
        if let Err(err) = tokio::fs::write(&path, &frame.bytes).await {
            warn!(path = %path.display(), error = %err, "failed to write screenshot");
            return None;
        }

        self.screenshot_sequence = sequence;
        self.seen_fingerprints.insert(frame.fingerprint.clone());
        self.metrics.record_screenshot();
        let entry = ManifestEntry {
            sequence,
            label,
            path,
        };
        info!(sequence, label = %entry.label, "screenshot captured");
        self.manifest.push(entry.clone());
        Some(entry)
    }

    /// Writes the end-of-run files. `urls.json` starts empty; a later upload
    /// step fills it.
    pub async fn finish(&self) -> SimulatorResult<()> {
        self.write_urls().await?;
        let manifest = serde_json::to_vec_pretty(&self.manifest)?;
        tokio::fs::write(self.output_dir.join(MANIFEST_FILE), manifest).await?;
        Ok(())
    }

    pub async fn finish_aborted(&self) -> SimulatorResult<()> {
        self.write_urls().await
    }

    async fn write_urls(&self) -> SimulatorResult<()> {
        let urls: Vec<String> = Vec::new();
        let json = serde_json::to_vec(&urls)?;
        tokio::fs::write(self.output_dir.join(URLS_FILE), json).await?;
        Ok(())
    }
}

pub fn sanitize_label(label: &str) -> String {
    let mut sanitized = String::with_capacity(label.len());
    for ch in label.chars() {
        if ch.is_ascii_alphanumeric() {
            sanitized.push(ch.to_ascii_lowercase());
        } else if !sanitized.ends_with('_') {
            sanitized.push('_');
        }
    }
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        "screen".to_string()
    } else {
        trimmed.to_string()
    }
}
