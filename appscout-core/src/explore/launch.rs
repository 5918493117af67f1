use std::sync::Arc;

use serde::Serialize;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::config::LaunchSection;
use crate::simulator::DeviceDriver;

use super::fingerprint::{SceneChange, SceneFingerprinter, ScreenFingerprint};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LaunchState {
    NotLaunched,
    Launching,
    VerifyingForeground,
    Ready,
    Aborted { reason: String },
}

impl LaunchState {
    pub fn is_ready(&self) -> bool {
        matches!(self, LaunchState::Ready)
    }

    pub fn abort_reason(&self) -> Option<&str> {
        match self {
            LaunchState::Aborted { reason } => Some(reason),
            _ => None,
        }
    }
}

/// Which signal moved the verifier to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ForegroundSignal {
    ForegroundQuery,
    ScreenChange,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchReport {
    pub state: LaunchState,
    pub attempts: u32,
    pub used_fallback: bool,
    pub confirmed_by: Option<ForegroundSignal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Observation {
    ProcessNotRunning,
    HomeScreenFrontmost,
    Unconfirmed,
}

/// Confirms the target app, not the home screen, is frontmost. `Aborted` is
/// terminal for the whole run.
pub struct LaunchVerifier {
    driver: Arc<dyn DeviceDriver>,
    fingerprinter: Arc<SceneFingerprinter>,
    config: LaunchSection,
    state: LaunchState,
}

impl LaunchVerifier {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        fingerprinter: Arc<SceneFingerprinter>,
        config: LaunchSection,
    ) -> Self {
        Self {
            driver,
            fingerprinter,
            config,
            state: LaunchState::NotLaunched,
        }
    }

    pub fn state(&self) -> &LaunchState {
        &self.state
    }

    /// Launches `bundle_id` and polls the foreground signals. `fallback_url`
    /// is opened when the launch command itself fails; `baseline` is the home
    /// screen fingerprint taken before launch.
    pub async fn verify(
        &mut self,
        bundle_id: &str,
        args: &[String],
        fallback_url: Option<&str>,
        baseline: Option<&ScreenFingerprint>,
    ) -> LaunchReport {
        self.transition(LaunchState::Launching);
        let mut used_fallback = false;
        if let Err(err) = self.driver.launch(bundle_id, args).await {
            warn!(bundle_id, error = %err, "launch command failed");
            match fallback_url {
                Some(url) => {
                    if let Err(fallback_err) = self.driver.open_url(url).await {
                        return self.abort(
                            format!(
                                "launch command failed: {err}; opening {url} failed: {fallback_err}"
                            ),
                            0,
                            true,
                        );
                    }
                    info!(bundle_id, url, "launched through url scheme fallback");
                    used_fallback = true;
                }
                None => {
                    // No declared scheme to open; reissue the launch once.
                    sleep(self.config.interval()).await;
                    if let Err(retry_err) = self.driver.launch(bundle_id, args).await {
                        return self.abort(
                            format!("launch command failed twice: {err}; {retry_err}"),
                            0,
                            false,
                        );
                    }
                    info!(bundle_id, "launch succeeded on retry");
                }
            }
        }

        self.transition(LaunchState::VerifyingForeground);
        let mut last = Observation::Unconfirmed;
        for attempt in 1..=self.config.max_attempts {
            sleep(self.config.interval()).await;

            let running = self
                .driver
                .is_process_running(bundle_id)
                .await
                .unwrap_or(false);
            if !running {
                last = Observation::ProcessNotRunning;
                continue;
            }

            if let Ok(Some(foreground)) = self.driver.foreground_app().await {
                if foreground == bundle_id {
                    return self.ready(ForegroundSignal::ForegroundQuery, attempt, used_fallback);
                }
            }

            let home = self.driver.is_home_screen_frontmost().await;
            let current = self.fingerprinter.capture().await;
            let change = SceneFingerprinter::compare(baseline, current.as_ref());
            if change == SceneChange::Changed && !home {
                return self.ready(ForegroundSignal::ScreenChange, attempt, used_fallback);
            }
            last = if home {
                Observation::HomeScreenFrontmost
            } else {
                Observation::Unconfirmed
            };
        }

        let attempts = self.config.max_attempts;
        match last {
            Observation::ProcessNotRunning => self.abort(
                format!("{bundle_id} process not running after {attempts} checks"),
                attempts,
                used_fallback,
            ),
            Observation::HomeScreenFrontmost => self.abort(
                format!("home screen still frontmost after {attempts} checks"),
                attempts,
                used_fallback,
            ),
            Observation::Unconfirmed => self.abort(
                format!("{bundle_id} never confirmed in foreground after {attempts} checks"),
                attempts,
                used_fallback,
            ),
        }
    }

    fn ready(&mut self, signal: ForegroundSignal, attempts: u32, used_fallback: bool) -> LaunchReport {
        info!(?signal, attempts, "app confirmed in foreground");
        self.transition(LaunchState::Ready);
        LaunchReport {
            state: LaunchState::Ready,
            attempts,
            used_fallback,
            confirmed_by: Some(signal),
        }
    }

    fn abort(&mut self, reason: String, attempts: u32, used_fallback: bool) -> LaunchReport {
        warn!(reason = %reason, "launch verification aborted");
        let state = LaunchState::Aborted { reason };
        self.transition(state.clone());
        LaunchReport {
            state,
            attempts,
            used_fallback,
            confirmed_by: None,
        }
    }

    fn transition(&mut self, next: LaunchState) {
        info!(from = ?self.state, to = ?next, "launch state transition");
        self.state = next;
    }
}
