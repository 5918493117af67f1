use std::sync::Arc;

use tracing::debug;

use crate::simulator::{DeviceDriver, DeviceProfile, SimulatorResult, SwipeDirection};

use super::fingerprint::{SceneChange, SceneFingerprinter, ScreenFingerprint};
use super::session::{ExplorationSession, ManifestEntry};

/// Canonical top-left back button, as screen fractions.
pub const BACK_BUTTON: (f64, f64) = (0.07, 0.075);

#[derive(Debug, Clone, PartialEq)]
pub enum Interaction {
    Tap { x: f64, y: f64 },
    Swipe { from: (f64, f64), to: (f64, f64) },
    OpenUrl(String),
}

impl Interaction {
    pub fn tap((x, y): (f64, f64)) -> Self {
        Interaction::Tap { x, y }
    }

    pub fn swipe(direction: SwipeDirection, profile: &DeviceProfile) -> Self {
        let (from, to) = direction.vector(profile);
        Interaction::Swipe { from, to }
    }
}

#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub change: SceneChange,
    pub after: Option<ScreenFingerprint>,
    pub recorded: Option<ManifestEntry>,
}

impl ProbeOutcome {
    fn failed() -> Self {
        Self {
            change: SceneChange::Inconclusive,
            after: None,
            recorded: None,
        }
    }

    pub fn is_novel(&self) -> bool {
        self.recorded.is_some()
    }
}

/// before / interact / settle / classify, shared by bypass and exploration.
pub struct Prober {
    driver: Arc<dyn DeviceDriver>,
    fingerprinter: Arc<SceneFingerprinter>,
    profile: DeviceProfile,
}

impl Prober {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        fingerprinter: Arc<SceneFingerprinter>,
        profile: DeviceProfile,
    ) -> Self {
        Self {
            driver,
            fingerprinter,
            profile,
        }
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn driver(&self) -> &Arc<dyn DeviceDriver> {
        &self.driver
    }

    pub fn fingerprinter(&self) -> &Arc<SceneFingerprinter> {
        &self.fingerprinter
    }

    pub async fn perform(&self, interaction: &Interaction) -> SimulatorResult<()> {
        match interaction {
            Interaction::Tap { x, y } => self.driver.tap(*x, *y).await,
            Interaction::Swipe { from, to } => self.driver.swipe(*from, *to).await,
            Interaction::OpenUrl(url) => self.driver.open_url(url).await,
        }
    }

    /// Runs one probe. When the screen changed and a label is given, the
    /// settled frame is offered to the session, which drops known screens.
    pub async fn probe(
        &self,
        session: &mut ExplorationSession,
        interaction: &Interaction,
        label: Option<&str>,
    ) -> ProbeOutcome {
        let before = self.fingerprinter.capture().await;
        if let Err(err) = self.perform(interaction).await {
            debug!(?interaction, error = %err, "interaction failed");
            session.record_probe(SceneChange::Inconclusive);
            return ProbeOutcome::failed();
        }
        let after = self.fingerprinter.settle().await;
        let change = SceneFingerprinter::compare(
            before.as_ref(),
            after.as_ref().map(|frame| &frame.fingerprint),
        );
        session.record_probe(change);
        debug!(?interaction, ?change, "probe classified");

        let recorded = match (&after, label) {
            (Some(frame), Some(label)) if change.is_changed() => {
                session.record(frame, label).await
            }
            _ => None,
        };
        ProbeOutcome {
            change,
            after: after.map(|frame| frame.fingerprint),
            recorded,
        }
    }

    /// Settles and stores the current screen without interacting.
    pub async fn snapshot(
        &self,
        session: &mut ExplorationSession,
        label: &str,
    ) -> Option<ManifestEntry> {
        let frame = self.fingerprinter.settle().await?;
        session.record(&frame, label).await
    }

    /// Fire-and-forget: tap the canonical back button, then an edge swipe.
    pub async fn navigate_back(&self, session: &mut ExplorationSession) {
        let (x, y) = self.profile.point(BACK_BUTTON.0, BACK_BUTTON.1);
        if let Err(err) = self.driver.tap(x, y).await {
            debug!(error = %err, "back tap failed");
        }
        let from = self.profile.point(0.0, 0.5);
        let to = self.profile.point(0.7, 0.5);
        if let Err(err) = self.driver.swipe(from, to).await {
            debug!(error = %err, "back edge swipe failed");
        }
        session.record_back_navigation();
        let _ = self.fingerprinter.settle().await;
    }
}
