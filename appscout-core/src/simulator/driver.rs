use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Output;
use std::sync::{Arc, OnceLock};

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::config::DriverSection;

use super::error::{SimulatorError, SimulatorResult};
use super::profile::DeviceProfile;

/// Value written into the app's persisted preference domain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PreferenceValue {
    Bool(bool),
    Integer(i64),
    String(String),
}

impl PreferenceValue {
    fn defaults_args(&self) -> [String; 2] {
        match self {
            PreferenceValue::Bool(value) => [
                "-bool".to_string(),
                if *value { "YES" } else { "NO" }.to_string(),
            ],
            PreferenceValue::Integer(value) => ["-int".to_string(), value.to_string()],
            PreferenceValue::String(value) => ["-string".to_string(), value.clone()],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

impl SwipeDirection {
    /// Start and end points for a content swipe. `Down` reveals content below
    /// the fold, so the finger travels upward.
    pub fn vector(&self, profile: &DeviceProfile) -> ((f64, f64), (f64, f64)) {
        match self {
            SwipeDirection::Down => (profile.point(0.5, 0.75), profile.point(0.5, 0.25)),
            SwipeDirection::Up => (profile.point(0.5, 0.25), profile.point(0.5, 0.75)),
            SwipeDirection::Left => (profile.point(0.85, 0.5), profile.point(0.15, 0.5)),
            SwipeDirection::Right => (profile.point(0.15, 0.5), profile.point(0.85, 0.5)),
        }
    }
}

/// The single simulator capability every component talks to. Calls are
/// awaited one at a time; the simulator accepts one interaction stream.
#[async_trait]
pub trait DeviceDriver: Send + Sync {
    async fn tap(&self, x: f64, y: f64) -> SimulatorResult<()>;

    async fn swipe(&self, from: (f64, f64), to: (f64, f64)) -> SimulatorResult<()>;

    async fn type_text(&self, text: &str) -> SimulatorResult<()>;

    /// Writes the current frame as an image at `destination`.
    async fn capture_frame(&self, destination: &Path) -> SimulatorResult<()>;

    async fn launch(&self, bundle_id: &str, args: &[String]) -> SimulatorResult<()>;

    async fn open_url(&self, url: &str) -> SimulatorResult<()>;

    async fn terminate(&self, bundle_id: &str) -> SimulatorResult<()>;

    async fn is_process_running(&self, bundle_id: &str) -> SimulatorResult<bool>;

    async fn foreground_app(&self) -> SimulatorResult<Option<String>>;

    /// Reports `true` whenever the answer is not certain.
    async fn is_home_screen_frontmost(&self) -> bool;

    async fn write_preference(
        &self,
        bundle_id: &str,
        key: &str,
        value: &PreferenceValue,
    ) -> SimulatorResult<()>;

    async fn write_credential_entry(
        &self,
        bundle_id: &str,
        key: &str,
        value: &str,
    ) -> SimulatorResult<()>;
}

#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output>;
}

pub struct SystemCommandExecutor;

#[async_trait]
impl CommandExecutor for SystemCommandExecutor {
    async fn run(&self, program: &Path, args: &[String]) -> std::io::Result<Output> {
        Command::new(program).args(args).output().await
    }
}

/// Drives a booted simulator through `xcrun simctl` and `idb`.
pub struct SimctlDriver {
    simctl: PathBuf,
    idb: PathBuf,
    udid: String,
    executor: Arc<dyn CommandExecutor>,
    app_names: OnceLock<HashMap<String, String>>,
}

impl SimctlDriver {
    pub fn new(config: &DriverSection) -> Self {
        Self {
            simctl: PathBuf::from(&config.simctl_program),
            idb: PathBuf::from(&config.idb_program),
            udid: config.udid.clone(),
            executor: Arc::new(SystemCommandExecutor),
            app_names: OnceLock::new(),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    async fn simctl<I, S>(&self, args: I) -> SimulatorResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec!["simctl".to_string()];
        full.extend(args.into_iter().map(Into::into));
        self.execute(&self.simctl, full).await
    }

    async fn idb_ui<I, S>(&self, subcommand: &str, args: I) -> SimulatorResult<String>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut full = vec!["ui".to_string(), subcommand.to_string()];
        full.extend(args.into_iter().map(Into::into));
        // idb addresses the booted device implicitly.
        if self.udid != "booted" {
            full.push("--udid".to_string());
            full.push(self.udid.clone());
        }
        self.execute(&self.idb, full).await
    }

    async fn execute(&self, program: &Path, args: Vec<String>) -> SimulatorResult<String> {
        debug!(program = %program.display(), args = ?args, "running simulator command");
        let output = self.executor.run(program, &args).await?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(SimulatorError::Command(format!(
                "{} {} exited with {:?}: {}",
                program.display(),
                args.join(" "),
                output.status.code(),
                stderr
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn running_apps(&self) -> SimulatorResult<Vec<(u32, String)>> {
        let listing = self
            .simctl(["spawn", self.udid.as_str(), "launchctl", "list"])
            .await?;
        Ok(parse_running_apps(&listing))
    }

    /// Display name to bundle id for every installed app. SpringBoard is not
    /// an installed app, so the home screen never resolves to an entry.
    async fn installed_app_names(&self) -> SimulatorResult<&HashMap<String, String>> {
        if let Some(names) = self.app_names.get() {
            return Ok(names);
        }
        let listing = self.simctl(["listapps", self.udid.as_str()]).await?;
        let names = parse_installed_app_names(&listing);
        debug!(apps = names.len(), "installed app names loaded");
        Ok(self.app_names.get_or_init(|| names))
    }

    /// Label of the application element at the root of the accessibility tree.
    async fn frontmost_label(&self) -> SimulatorResult<Option<String>> {
        let tree = self.idb_ui("describe-all", Vec::<String>::new()).await?;
        parse_frontmost_label(&tree)
    }
}

impl fmt::Debug for SimctlDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimctlDriver")
            .field("simctl", &self.simctl)
            .field("idb", &self.idb)
            .field("udid", &self.udid)
            .finish()
    }
}

fn coordinate(value: f64) -> String {
    format!("{}", value.round().max(0.0) as i64)
}

/// Extracts `(pid, bundle_id)` for every running app in `launchctl list` output.
pub(crate) fn parse_running_apps(listing: &str) -> Vec<(u32, String)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(\d+)[ \t]+\S+[ \t]+UIKitApplication:([^\[\s]+)")
            .expect("launchctl pattern is valid")
    });
    pattern
        .captures_iter(listing)
        .filter_map(|captures| {
            let pid = captures.get(1)?.as_str().parse::<u32>().ok()?;
            let bundle = captures.get(2)?.as_str().to_string();
            Some((pid, bundle))
        })
        .collect()
}

/// Maps `CFBundleDisplayName` and `CFBundleName` to `CFBundleIdentifier` in
/// `simctl listapps` output. Keys inside an app entry are sorted, so the
/// display name precedes the identifier and the bundle name follows it.
pub(crate) fn parse_installed_app_names(listing: &str) -> HashMap<String, String> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r#"(?m)^[ \t]*(CFBundleDisplayName|CFBundleIdentifier|CFBundleName)[ \t]*=[ \t]*"?([^";\n]*)"?;"#)
            .expect("listapps pattern is valid")
    });
    let mut names = HashMap::new();
    let mut display: Option<String> = None;
    let mut identifier: Option<String> = None;
    for captures in pattern.captures_iter(listing) {
        let value = captures[2].trim().to_string();
        match &captures[1] {
            "CFBundleDisplayName" => display = Some(value),
            "CFBundleIdentifier" => {
                if let Some(name) = display.take() {
                    names.entry(name).or_insert_with(|| value.clone());
                }
                identifier = Some(value);
            }
            _ => {
                if let Some(bundle) = &identifier {
                    names.entry(value).or_insert_with(|| bundle.clone());
                }
            }
        }
    }
    names
}

/// Reads the root `Application` element from `idb ui describe-all` output.
pub(crate) fn parse_frontmost_label(tree: &str) -> SimulatorResult<Option<String>> {
    let elements: Value = serde_json::from_str(tree)?;
    let Some(elements) = elements.as_array() else {
        return Err(SimulatorError::Output(
            "describe-all did not return an element list".to_string(),
        ));
    };
    Ok(elements
        .iter()
        .find(|element| element.get("type").and_then(Value::as_str) == Some("Application"))
        .and_then(|element| element.get("AXLabel").and_then(Value::as_str))
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(str::to_string))
}

#[async_trait]
impl DeviceDriver for SimctlDriver {
    async fn tap(&self, x: f64, y: f64) -> SimulatorResult<()> {
        self.idb_ui("tap", [coordinate(x), coordinate(y)]).await?;
        Ok(())
    }

    async fn swipe(&self, from: (f64, f64), to: (f64, f64)) -> SimulatorResult<()> {
        self.idb_ui(
            "swipe",
            [
                coordinate(from.0),
                coordinate(from.1),
                coordinate(to.0),
                coordinate(to.1),
            ],
        )
        .await?;
        Ok(())
    }

    async fn type_text(&self, text: &str) -> SimulatorResult<()> {
        self.idb_ui("text", [text]).await?;
        Ok(())
    }

    async fn capture_frame(&self, destination: &Path) -> SimulatorResult<()> {
        let destination = destination.to_string_lossy().into_owned();
        self.simctl([
            "io".to_string(),
            self.udid.clone(),
            "screenshot".to_string(),
            "--type=png".to_string(),
            destination,
        ])
        .await?;
        Ok(())
    }

    async fn launch(&self, bundle_id: &str, args: &[String]) -> SimulatorResult<()> {
        let mut full = vec![
            "launch".to_string(),
            self.udid.clone(),
            bundle_id.to_string(),
        ];
        full.extend(args.iter().cloned());
        let stdout = self.simctl(full).await?;
        debug!(bundle_id, output = %stdout.trim(), "launch command returned");
        Ok(())
    }

    async fn open_url(&self, url: &str) -> SimulatorResult<()> {
        self.simctl(["openurl", self.udid.as_str(), url]).await?;
        Ok(())
    }

    async fn terminate(&self, bundle_id: &str) -> SimulatorResult<()> {
        self.simctl(["terminate", self.udid.as_str(), bundle_id])
            .await?;
        Ok(())
    }

    async fn is_process_running(&self, bundle_id: &str) -> SimulatorResult<bool> {
        let apps = self.running_apps().await?;
        Ok(apps.iter().any(|(_, bundle)| bundle == bundle_id))
    }

    /// Resolves the accessibility root to an installed bundle. An unlabeled
    /// root or a label no installed app carries yields `None`.
    async fn foreground_app(&self) -> SimulatorResult<Option<String>> {
        let Some(label) = self.frontmost_label().await? else {
            return Ok(None);
        };
        let names = self.installed_app_names().await?;
        let bundle = names.get(&label).cloned();
        if bundle.is_none() {
            debug!(label = %label, "frontmost element matches no installed app");
        }
        Ok(bundle)
    }

    async fn is_home_screen_frontmost(&self) -> bool {
        match self.foreground_app().await {
            Ok(Some(_)) => false,
            Ok(None) => true,
            Err(err) => {
                debug!(error = %err, "foreground query failed, assuming home screen");
                true
            }
        }
    }

    async fn write_preference(
        &self,
        bundle_id: &str,
        key: &str,
        value: &PreferenceValue,
    ) -> SimulatorResult<()> {
        let [kind, literal] = value.defaults_args();
        self.simctl([
            "spawn".to_string(),
            self.udid.clone(),
            "defaults".to_string(),
            "write".to_string(),
            bundle_id.to_string(),
            key.to_string(),
            kind,
            literal,
        ])
        .await?;
        Ok(())
    }

    async fn write_credential_entry(
        &self,
        _bundle_id: &str,
        key: &str,
        _value: &str,
    ) -> SimulatorResult<()> {
        Err(SimulatorError::Unsupported(format!(
            "simctl cannot write keychain item {key}"
        )))
    }
}
