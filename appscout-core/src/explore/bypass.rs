use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{BypassSection, BypassStrategy, Credentials, FeaturesSection};
use crate::simulator::SwipeDirection;

use super::analyzer::AppAnalysis;
use super::fingerprint::{SceneChange, SceneFingerprinter};
use super::probe::{Interaction, Prober};
use super::session::ExplorationSession;

/// Where "Skip", "Not now", "Continue" and close buttons usually sit.
pub const SKIP_POSITIONS: &[(f64, f64)] = &[
    (0.90, 0.070),
    (0.50, 0.900),
    (0.50, 0.850),
    (0.08, 0.070),
    (0.85, 0.930),
];

const EMAIL_FIELD: (f64, f64) = (0.5, 0.38);
const PASSWORD_FIELD: (f64, f64) = (0.5, 0.46);
const SUBMIT_BUTTON: (f64, f64) = (0.5, 0.56);

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StrategyAttempt {
    pub strategy: BypassStrategy,
    pub cleared: bool,
    pub detail: String,
}

impl StrategyAttempt {
    fn new(strategy: BypassStrategy, cleared: bool, detail: impl Into<String>) -> Self {
        Self {
            strategy,
            cleared,
            detail: detail.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExplicitLinkOutcome {
    pub url: String,
    pub change: SceneChange,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BypassReport {
    pub attempts: Vec<StrategyAttempt>,
    pub cleared_by: Option<BypassStrategy>,
    pub explicit_deep_link: Option<ExplicitLinkOutcome>,
    /// First deep link observed to change the screen.
    pub working_deep_link: Option<String>,
}

/// Ordered chain of onboarding/auth wall strategies; stops at the first one
/// whose own before/after comparison reports a change.
pub struct BypassPipeline {
    prober: Arc<Prober>,
    bundle_id: String,
    analysis: Arc<AppAnalysis>,
    credentials: Option<Credentials>,
    features: FeaturesSection,
    config: BypassSection,
}

impl BypassPipeline {
    pub fn new(
        prober: Arc<Prober>,
        bundle_id: impl Into<String>,
        analysis: Arc<AppAnalysis>,
        credentials: Option<Credentials>,
        features: FeaturesSection,
        config: BypassSection,
    ) -> Self {
        Self {
            prober,
            bundle_id: bundle_id.into(),
            analysis,
            credentials,
            features,
            config,
        }
    }

    /// Runs the strategies that must happen before the app starts.
    pub async fn prepare(&self, report: &mut BypassReport) {
        for strategy in &self.features.bypass_strategy_order {
            if strategy.is_pre_launch() {
                let attempt = self.inject_state().await;
                report.attempts.push(attempt);
            }
        }
    }

    pub async fn run(&self, session: &mut ExplorationSession, report: &mut BypassReport) {
        for strategy in &self.features.bypass_strategy_order {
            if strategy.is_pre_launch() {
                continue;
            }
            let attempt = match strategy {
                BypassStrategy::LaunchArguments => self.relaunch_with_arguments(session).await,
                BypassStrategy::DeepLink => self.open_priority_deep_links(session, report).await,
                BypassStrategy::CoordinateProbe => self.tap_skip_positions(session).await,
                BypassStrategy::SwipeProbe => self.swipe_carousel(session).await,
                BypassStrategy::CredentialLogin => self.log_in(session).await,
                BypassStrategy::StateInjection => continue,
            };
            info!(
                strategy = %attempt.strategy,
                cleared = attempt.cleared,
                detail = %attempt.detail,
                "bypass strategy finished"
            );
            let cleared = attempt.cleared;
            report.attempts.push(attempt);
            if cleared {
                report.cleared_by = Some(*strategy);
                break;
            }
        }

        if let Some(url) = self
            .credentials
            .as_ref()
            .and_then(|credentials| credentials.deep_link.clone())
        {
            let outcome = self.open_explicit_deep_link(session, &url).await;
            if outcome.change.is_changed() {
                report.working_deep_link = Some(url);
            }
            report.explicit_deep_link = Some(outcome);
        }
    }

    async fn inject_state(&self) -> StrategyAttempt {
        let driver = self.prober.driver();
        let mut preferences = 0usize;
        for entry in &self.config.preferences {
            match driver
                .write_preference(&self.bundle_id, &entry.key, &entry.value)
                .await
            {
                Ok(()) => preferences += 1,
                Err(err) => debug!(key = %entry.key, error = %err, "preference write ignored"),
            }
        }
        let mut credentials = 0usize;
        for entry in &self.config.credential_entries {
            match driver
                .write_credential_entry(&self.bundle_id, &entry.key, &entry.value)
                .await
            {
                Ok(()) => credentials += 1,
                Err(err) => debug!(key = %entry.key, error = %err, "credential write ignored"),
            }
        }
        StrategyAttempt::new(
            BypassStrategy::StateInjection,
            false,
            format!(
                "wrote {preferences}/{} preferences and {credentials}/{} credential entries",
                self.config.preferences.len(),
                self.config.credential_entries.len()
            ),
        )
    }

    /// Relaunches with each flag set until one brings the app back in front
    /// with a frame. A relaunch that leaves another surface frontmost is
    /// skipped, and the app is relaunched plainly if none succeeds.
    async fn relaunch_with_arguments(&self, session: &mut ExplorationSession) -> StrategyAttempt {
        let driver = self.prober.driver();
        let fingerprinter = self.prober.fingerprinter();
        let before = fingerprinter.capture().await;
        let mut backgrounded = 0usize;
        for entry in &self.config.launch_arguments {
            let args: Vec<String> = entry.split_whitespace().map(str::to_string).collect();
            if args.is_empty() {
                continue;
            }
            if let Err(err) = driver.terminate(&self.bundle_id).await {
                debug!(error = %err, "terminate before relaunch failed");
            }
            if let Err(err) = driver.launch(&self.bundle_id, &args).await {
                debug!(arguments = %entry, error = %err, "relaunch failed");
                continue;
            }
            let Some(frame) = fingerprinter.settle().await else {
                continue;
            };
            if !self.app_in_front().await {
                warn!(arguments = %entry, "relaunch did not reach the foreground");
                backgrounded += 1;
                continue;
            }
            let change = SceneFingerprinter::compare(before.as_ref(), Some(&frame.fingerprint));
            session.record_probe(change);
            if change.is_changed() {
                session.record(&frame, "launch_arguments").await;
            }
            return StrategyAttempt::new(
                BypassStrategy::LaunchArguments,
                change.is_changed(),
                format!("relaunched with `{entry}`: {change:?}"),
            );
        }

        let restored = self.restore_foreground().await;
        StrategyAttempt::new(
            BypassStrategy::LaunchArguments,
            false,
            format!(
                "no relaunch reached the foreground ({backgrounded} left another surface in front), restored: {restored}"
            ),
        )
    }

    async fn app_in_front(&self) -> bool {
        match self.prober.driver().foreground_app().await {
            Ok(Some(bundle)) => bundle == self.bundle_id,
            Ok(None) => false,
            Err(err) => {
                debug!(error = %err, "foreground query failed");
                false
            }
        }
    }

    async fn restore_foreground(&self) -> bool {
        let driver = self.prober.driver();
        if let Err(err) = driver.terminate(&self.bundle_id).await {
            debug!(error = %err, "terminate before restore failed");
        }
        if let Err(err) = driver.launch(&self.bundle_id, &[]).await {
            warn!(error = %err, "plain relaunch failed");
            return false;
        }
        self.prober.fingerprinter().settle().await;
        let restored = self.app_in_front().await;
        if !restored {
            warn!(bundle_id = %self.bundle_id, "app not in front after plain relaunch");
        }
        restored
    }

    async fn open_priority_deep_links(
        &self,
        session: &mut ExplorationSession,
        report: &mut BypassReport,
    ) -> StrategyAttempt {
        if !self.features.enable_deep_link_discovery {
            return StrategyAttempt::new(BypassStrategy::DeepLink, false, "deep links disabled");
        }
        let candidates = self.analysis.priority_deep_links();
        if candidates.is_empty() {
            return StrategyAttempt::new(BypassStrategy::DeepLink, false, "no candidates");
        }
        let mut tried = 0usize;
        for link in candidates.into_iter().take(self.config.max_deep_link_attempts) {
            tried += 1;
            let outcome = self
                .prober
                .probe(session, &Interaction::OpenUrl(link.to_string()), Some("deeplink_bypass"))
                .await;
            session.record_deep_link();
            if outcome.change.is_changed() {
                report.working_deep_link = Some(link.to_string());
                return StrategyAttempt::new(
                    BypassStrategy::DeepLink,
                    true,
                    format!("{link} changed the screen"),
                );
            }
        }
        StrategyAttempt::new(
            BypassStrategy::DeepLink,
            false,
            format!("{tried} deep links left the screen unchanged"),
        )
    }

    async fn tap_skip_positions(&self, session: &mut ExplorationSession) -> StrategyAttempt {
        let profile = self.prober.profile();
        for (index, (fx, fy)) in SKIP_POSITIONS.iter().enumerate() {
            let interaction = Interaction::tap(profile.point(*fx, *fy));
            let outcome = self
                .prober
                .probe(session, &interaction, Some("onboarding_skip"))
                .await;
            if outcome.change.is_changed() {
                return StrategyAttempt::new(
                    BypassStrategy::CoordinateProbe,
                    true,
                    format!("skip position {} ({fx}, {fy}) changed the screen", index + 1),
                );
            }
        }
        StrategyAttempt::new(
            BypassStrategy::CoordinateProbe,
            false,
            "no skip position changed the screen",
        )
    }

    /// Treats onboarding as a paged carousel. Any frame after a swipe counts,
    /// which is a weaker signal than the other strategies.
    async fn swipe_carousel(&self, session: &mut ExplorationSession) -> StrategyAttempt {
        let interaction = Interaction::swipe(SwipeDirection::Left, self.prober.profile());
        let mut framed = 0usize;
        for page in 0..self.features.max_onboarding_screens {
            let label = format!("onboarding_page_{}", page + 1);
            let outcome = self.prober.probe(session, &interaction, Some(&label)).await;
            if outcome.after.is_some() {
                framed += 1;
            }
        }
        StrategyAttempt::new(
            BypassStrategy::SwipeProbe,
            framed > 0,
            format!(
                "{framed}/{} swipes produced a frame",
                self.features.max_onboarding_screens
            ),
        )
    }

    async fn log_in(&self, session: &mut ExplorationSession) -> StrategyAttempt {
        let credentials = self.credentials.as_ref();
        if let Some(label) = credentials.and_then(|c| c.skip_button_text.as_deref()) {
            session.note(format!(
                "skip button \"{label}\" not searched: no text recognition available"
            ));
        }
        let Some((email, password)) = credentials.and_then(Credentials::login_pair) else {
            return StrategyAttempt::new(
                BypassStrategy::CredentialLogin,
                false,
                "no email and password supplied",
            );
        };

        let profile = self.prober.profile();
        let driver = self.prober.driver();
        let fingerprinter = self.prober.fingerprinter();
        let before = fingerprinter.capture().await;
        let steps = [
            (EMAIL_FIELD, Some(email)),
            (PASSWORD_FIELD, Some(password)),
            (SUBMIT_BUTTON, None),
        ];
        for ((fx, fy), text) in steps {
            let (x, y) = profile.point(fx, fy);
            if let Err(err) = driver.tap(x, y).await {
                debug!(error = %err, "login tap failed");
            }
            if let Some(text) = text {
                if let Err(err) = driver.type_text(text).await {
                    debug!(error = %err, "login text entry failed");
                }
            }
        }
        let after = fingerprinter.settle().await;
        let change = SceneFingerprinter::compare(
            before.as_ref(),
            after.as_ref().map(|frame| &frame.fingerprint),
        );
        session.record_probe(change);
        if let (true, Some(frame)) = (change.is_changed(), after.as_ref()) {
            session.record(frame, "after_login").await;
        }
        StrategyAttempt::new(
            BypassStrategy::CredentialLogin,
            change.is_changed(),
            format!("submitted login form: {change:?}"),
        )
    }

    async fn open_explicit_deep_link(
        &self,
        session: &mut ExplorationSession,
        url: &str,
    ) -> ExplicitLinkOutcome {
        let outcome = self
            .prober
            .probe(session, &Interaction::OpenUrl(url.to_string()), Some("deeplink_explicit"))
            .await;
        session.record_deep_link();
        info!(url, change = ?outcome.change, "explicit deep link opened");
        ExplicitLinkOutcome {
            url: url.to_string(),
            change: outcome.change,
        }
    }
}
