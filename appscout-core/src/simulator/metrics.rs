use serde::{Deserialize, Serialize};

use crate::explore::SceneChange;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExplorationMetrics {
    pub probes: u64,
    pub changed: u64,
    pub unchanged: u64,
    pub inconclusive: u64,
    pub capture_failures: u64,
    pub screenshots: u64,
    pub duplicates_skipped: u64,
    pub back_navigations: u64,
    pub deep_links_opened: u64,
}

impl ExplorationMetrics {
    pub fn record_probe(&mut self, change: SceneChange) {
        self.probes = self.probes.saturating_add(1);
        match change {
            SceneChange::Changed => self.changed = self.changed.saturating_add(1),
            SceneChange::Unchanged => self.unchanged = self.unchanged.saturating_add(1),
            SceneChange::Inconclusive => self.inconclusive = self.inconclusive.saturating_add(1),
        }
    }

    pub fn record_screenshot(&mut self) {
        self.screenshots = self.screenshots.saturating_add(1);
    }

    pub fn record_duplicate(&mut self) {
        self.duplicates_skipped = self.duplicates_skipped.saturating_add(1);
    }

    pub fn record_back_navigation(&mut self) {
        self.back_navigations = self.back_navigations.saturating_add(1);
    }

    pub fn record_deep_link(&mut self) {
        self.deep_links_opened = self.deep_links_opened.saturating_add(1);
    }

    pub fn change_rate(&self) -> f64 {
        if self.probes == 0 {
            0.0
        } else {
            (self.changed as f64 / self.probes as f64) * 100.0
        }
    }
}
