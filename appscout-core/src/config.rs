use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::simulator::PreferenceValue;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct ScoutConfig {
    pub features: FeaturesSection,
    pub driver: DriverSection,
    pub capture: CaptureSection,
    pub settle: SettleSection,
    pub launch: LaunchSection,
    pub bypass: BypassSection,
    pub exploration: ExplorationSection,
}

impl ScoutConfig {
    pub fn validate(&self) -> Result<()> {
        if self.features.tab_candidate_counts.is_empty() {
            return Err(invalid(
                "features.tab_candidate_counts",
                "at least one candidate count is required",
            ));
        }
        if self.features.tab_candidate_counts.contains(&0) {
            return Err(invalid(
                "features.tab_candidate_counts",
                "tab counts must be positive",
            ));
        }
        if self.exploration.grid_rows == 0 || self.exploration.grid_columns == 0 {
            return Err(invalid("exploration.grid", "grid must have rows and columns"));
        }
        let margins = self.exploration.top_margin + self.exploration.bottom_margin;
        if !(0.0..1.0).contains(&margins) {
            return Err(invalid(
                "exploration.margins",
                format!("top + bottom margin must be in [0, 1), got {margins}"),
            ));
        }
        if self.launch.max_attempts == 0 {
            return Err(invalid("launch.max_attempts", "must be at least 1"));
        }
        if self.capture.poll_attempts == 0 {
            return Err(invalid("capture.poll_attempts", "must be at least 1"));
        }
        if self.settle.poll_interval_ms == 0 {
            return Err(invalid("settle.poll_interval_ms", "must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Bypass strategies that may be reordered or disabled through configuration.
/// The explicit caller-supplied deep link always runs last and is not listed here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BypassStrategy {
    StateInjection,
    LaunchArguments,
    DeepLink,
    CoordinateProbe,
    SwipeProbe,
    CredentialLogin,
}

impl BypassStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            BypassStrategy::StateInjection => "state_injection",
            BypassStrategy::LaunchArguments => "launch_arguments",
            BypassStrategy::DeepLink => "deep_link",
            BypassStrategy::CoordinateProbe => "coordinate_probe",
            BypassStrategy::SwipeProbe => "swipe_probe",
            BypassStrategy::CredentialLogin => "credential_login",
        }
    }

    /// Strategies that must run before the app process exists.
    pub fn is_pre_launch(&self) -> bool {
        matches!(self, BypassStrategy::StateInjection)
    }
}

impl std::fmt::Display for BypassStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FeaturesSection {
    pub enable_app_analysis: bool,
    pub enable_deep_link_discovery: bool,
    pub max_onboarding_screens: usize,
    pub max_grid_discoveries: usize,
    pub tab_candidate_counts: Vec<usize>,
    pub bypass_strategy_order: Vec<BypassStrategy>,
}

impl Default for FeaturesSection {
    fn default() -> Self {
        Self {
            enable_app_analysis: true,
            enable_deep_link_discovery: true,
            max_onboarding_screens: 5,
            max_grid_discoveries: 8,
            tab_candidate_counts: vec![4, 3, 5],
            bypass_strategy_order: vec![
                BypassStrategy::StateInjection,
                BypassStrategy::LaunchArguments,
                BypassStrategy::DeepLink,
                BypassStrategy::CoordinateProbe,
                BypassStrategy::SwipeProbe,
                BypassStrategy::CredentialLogin,
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DriverSection {
    pub simctl_program: String,
    pub idb_program: String,
    pub plutil_program: String,
    pub udid: String,
}

impl Default for DriverSection {
    fn default() -> Self {
        Self {
            simctl_program: "xcrun".to_string(),
            idb_program: "idb".to_string(),
            plutil_program: "plutil".to_string(),
            udid: "booted".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureSection {
    pub poll_attempts: u32,
    pub poll_interval_ms: u64,
}

impl Default for CaptureSection {
    fn default() -> Self {
        Self {
            poll_attempts: 10,
            poll_interval_ms: 200,
        }
    }
}

impl CaptureSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Stability window used in place of fixed post-interaction sleeps.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettleSection {
    pub min_delay_ms: u64,
    pub poll_interval_ms: u64,
    pub max_wait_ms: u64,
}

impl Default for SettleSection {
    fn default() -> Self {
        Self {
            min_delay_ms: 500,
            poll_interval_ms: 400,
            max_wait_ms: 3000,
        }
    }
}

impl SettleSection {
    pub fn min_delay(&self) -> Duration {
        Duration::from_millis(self.min_delay_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Number of captures the stability window may take before giving up.
    pub fn max_polls(&self) -> usize {
        let interval = self.poll_interval_ms.max(1);
        (self.max_wait_ms / interval) as usize + 1
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LaunchSection {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for LaunchSection {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 1000,
        }
    }
}

impl LaunchSection {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PreferenceEntry {
    pub key: String,
    pub value: PreferenceValue,
}

impl PreferenceEntry {
    fn new(key: &str, value: PreferenceValue) -> Self {
        Self {
            key: key.to_string(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CredentialEntry {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BypassSection {
    /// Each entry is one relaunch; whitespace separates the process arguments.
    pub launch_arguments: Vec<String>,
    pub preferences: Vec<PreferenceEntry>,
    pub credential_entries: Vec<CredentialEntry>,
    pub max_deep_link_attempts: usize,
}

impl Default for BypassSection {
    fn default() -> Self {
        Self {
            launch_arguments: vec![
                "-skipOnboarding YES".to_string(),
                "-UITesting".to_string(),
                "--uitesting".to_string(),
                "-FASTLANE_SNAPSHOT YES".to_string(),
            ],
            preferences: vec![
                PreferenceEntry::new("hasCompletedOnboarding", PreferenceValue::Bool(true)),
                PreferenceEntry::new("onboardingCompleted", PreferenceValue::Bool(true)),
                PreferenceEntry::new("hasSeenOnboarding", PreferenceValue::Bool(true)),
                PreferenceEntry::new("didShowWalkthrough", PreferenceValue::Bool(true)),
                PreferenceEntry::new("tutorialCompleted", PreferenceValue::Bool(true)),
                PreferenceEntry::new("hasLaunchedBefore", PreferenceValue::Bool(true)),
                PreferenceEntry::new("isFirstLaunch", PreferenceValue::Bool(false)),
                PreferenceEntry::new("firstLaunch", PreferenceValue::Bool(false)),
                PreferenceEntry::new("launchCount", PreferenceValue::Integer(5)),
                PreferenceEntry::new(
                    "onboardingVersion",
                    PreferenceValue::String("completed".to_string()),
                ),
            ],
            credential_entries: vec![
                CredentialEntry {
                    key: "authToken".to_string(),
                    value: "appscout-session".to_string(),
                },
                CredentialEntry {
                    key: "isLoggedIn".to_string(),
                    value: "true".to_string(),
                },
            ],
            max_deep_link_attempts: 6,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExplorationSection {
    pub grid_rows: usize,
    pub grid_columns: usize,
    /// Fraction of the screen height reserved for header chrome.
    pub top_margin: f64,
    /// Fraction of the screen height reserved for the tab bar.
    pub bottom_margin: f64,
    pub scroll_down_swipes: usize,
    pub scroll_up_swipes: usize,
    pub scroll_discovered_screens: bool,
    pub deep_link_keywords: Vec<String>,
    pub max_deep_link_navigations: usize,
}

impl Default for ExplorationSection {
    fn default() -> Self {
        Self {
            grid_rows: 3,
            grid_columns: 2,
            top_margin: 0.15,
            bottom_margin: 0.15,
            scroll_down_swipes: 3,
            scroll_up_swipes: 1,
            scroll_discovered_screens: false,
            deep_link_keywords: [
                "feed",
                "explore",
                "discover",
                "notifications",
                "inbox",
                "favorites",
                "library",
                "orders",
                "history",
                "help",
            ]
            .iter()
            .map(|keyword| keyword.to_string())
            .collect(),
            max_deep_link_navigations: 8,
        }
    }
}

/// Login material and overrides supplied by whoever triggered the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Credentials {
    pub email: Option<String>,
    pub password: Option<String>,
    pub skip_button_text: Option<String>,
    pub deep_link: Option<String>,
}

impl Credentials {
    pub fn login_pair(&self) -> Option<(&str, &str)> {
        match (self.email.as_deref(), self.password.as_deref()) {
            (Some(email), Some(password)) if !email.is_empty() && !password.is_empty() => {
                Some((email, password))
            }
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.email.is_none()
            && self.password.is_none()
            && self.skip_button_text.is_none()
            && self.deep_link.is_none()
    }
}

/// Inputs of a single exploration run, resolved once at start.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub device: String,
    pub bundle_id: String,
    pub app_path: Option<PathBuf>,
    pub credentials: Option<Credentials>,
    pub output_dir: PathBuf,
}

pub fn load_scout_config<P: AsRef<Path>>(path: P) -> Result<ScoutConfig> {
    let config: ScoutConfig = load_toml(path)?;
    config.validate()?;
    Ok(config)
}

pub fn load_credentials<P: AsRef<Path>>(path: P) -> std::io::Result<Credentials> {
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

fn load_toml<T, P>(path: P) -> Result<T>
where
    T: DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        source,
        path: path.to_path_buf(),
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        source,
        path: path.to_path_buf(),
    })
}
