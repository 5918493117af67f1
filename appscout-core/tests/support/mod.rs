#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use appscout_core::config::{
    CaptureSection, LaunchSection, ScoutConfig, SettleSection,
};
use appscout_core::explore::{ExplorationSession, Prober, SceneFingerprinter};
use appscout_core::simulator::{
    DeviceDriver, DeviceProfile, PreferenceValue, SimulatorError, SimulatorResult,
};
use async_trait::async_trait;

pub const SPRINGBOARD: &str = "springboard";
/// Screen owned by an app other than the one under test.
pub const FOREIGN_SCREEN: &str = "foreign_app";
const TOLERANCE: f64 = 12.0;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Tap(f64, f64),
    Swipe((f64, f64), (f64, f64)),
    TypeText(String),
    Launch(String, Vec<String>),
    OpenUrl(String),
    Terminate(String),
    Preference(String),
    Credential(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaunchBehavior {
    Foreground,
    /// Process starts but the home screen stays in front.
    StayHome,
    /// Process exits right away.
    Crash,
    /// The launch command itself fails.
    Fail,
    /// The first launch command fails, later ones foreground the app.
    FailOnce,
    /// Launches that pass arguments leave the home screen in front.
    HomeWithArguments,
}

#[derive(Debug, Clone)]
struct TapRule {
    on: Option<String>,
    at: (f64, f64),
    to: String,
    push: bool,
}

/// Screens and the gestures that move between them.
#[derive(Debug, Clone)]
pub struct ScreenGraph {
    initial: String,
    taps: Vec<TapRule>,
    scrolls: HashMap<String, String>,
    pages: HashMap<String, String>,
    links: HashMap<String, String>,
}

impl ScreenGraph {
    pub fn new(initial: &str) -> Self {
        Self {
            initial: initial.to_string(),
            taps: Vec::new(),
            scrolls: HashMap::new(),
            pages: HashMap::new(),
            links: HashMap::new(),
        }
    }

    /// Tapping `at` from any app screen switches to `to`.
    pub fn tab(mut self, at: (f64, f64), to: &str) -> Self {
        self.taps.push(TapRule {
            on: None,
            at,
            to: to.to_string(),
            push: false,
        });
        self
    }

    /// Tapping `at` on `on` replaces the current screen.
    pub fn tap(mut self, on: &str, at: (f64, f64), to: &str) -> Self {
        self.taps.push(TapRule {
            on: Some(on.to_string()),
            at,
            to: to.to_string(),
            push: false,
        });
        self
    }

    /// Tapping `at` on `on` pushes a detail screen; back navigation pops it.
    pub fn push(mut self, on: &str, at: (f64, f64), to: &str) -> Self {
        self.taps.push(TapRule {
            on: Some(on.to_string()),
            at,
            to: to.to_string(),
            push: true,
        });
        self
    }

    pub fn scroll(mut self, on: &str, to: &str) -> Self {
        self.scrolls.insert(on.to_string(), to.to_string());
        self
    }

    pub fn page(mut self, on: &str, to: &str) -> Self {
        self.pages.insert(on.to_string(), to.to_string());
        self
    }

    pub fn link(mut self, url: &str, to: &str) -> Self {
        self.links.insert(url.to_string(), to.to_string());
        self
    }
}

struct DeviceState {
    stack: Vec<String>,
    running: bool,
    calls: Vec<Call>,
    launches: usize,
    captures: usize,
}

/// In-memory simulator. Each screen renders as a distinct byte string, so
/// fingerprints change exactly when the current screen does.
pub struct ScriptedDevice {
    bundle_id: String,
    graph: ScreenGraph,
    launch: LaunchBehavior,
    capture_broken: bool,
    animated: bool,
    foreign_app: Option<String>,
    answers_foreground_query: bool,
    state: Mutex<DeviceState>,
}

impl ScriptedDevice {
    pub fn new(bundle_id: &str, graph: ScreenGraph) -> Self {
        Self {
            bundle_id: bundle_id.to_string(),
            graph,
            launch: LaunchBehavior::Foreground,
            capture_broken: false,
            animated: false,
            foreign_app: None,
            answers_foreground_query: true,
            state: Mutex::new(DeviceState {
                stack: vec![SPRINGBOARD.to_string()],
                running: false,
                calls: Vec::new(),
                launches: 0,
                captures: 0,
            }),
        }
    }

    pub fn with_launch(mut self, launch: LaunchBehavior) -> Self {
        self.launch = launch;
        self
    }

    pub fn with_broken_capture(mut self) -> Self {
        self.capture_broken = true;
        self
    }

    /// Every capture differs, as if the screen never stops animating.
    pub fn with_animated_capture(mut self) -> Self {
        self.animated = true;
        self
    }

    /// Starts with `bundle_id` frontmost instead of the home screen.
    pub fn with_foreign_app(mut self, bundle_id: &str) -> Self {
        self.foreign_app = Some(bundle_id.to_string());
        self.state.get_mut().unwrap().stack = vec![FOREIGN_SCREEN.to_string()];
        self
    }

    /// The foreground query never names an app.
    pub fn without_foreground_query(mut self) -> Self {
        self.answers_foreground_query = false;
        self
    }

    pub fn current(&self) -> String {
        let state = self.state.lock().unwrap();
        state.stack.last().cloned().unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn taps(&self) -> Vec<(f64, f64)> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::Tap(x, y) => Some((x, y)),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.state.lock().unwrap().calls.push(call);
    }

    fn show(state: &mut DeviceState, screen: &str) {
        state.stack = vec![screen.to_string()];
    }
}

fn near(a: (f64, f64), b: (f64, f64)) -> bool {
    (a.0 - b.0).abs() <= TOLERANCE && (a.1 - b.1).abs() <= TOLERANCE
}

#[async_trait]
impl DeviceDriver for ScriptedDevice {
    async fn tap(&self, x: f64, y: f64) -> SimulatorResult<()> {
        self.log(Call::Tap(x, y));
        let profile = DeviceProfile::fallback();
        let back = profile.point(0.07, 0.075);
        let mut state = self.state.lock().unwrap();
        let current = state.stack.last().cloned().unwrap_or_default();
        if current == SPRINGBOARD {
            return Ok(());
        }
        if near((x, y), back) && state.stack.len() > 1 {
            state.stack.pop();
            return Ok(());
        }
        let rule = self.graph.taps.iter().find(|rule| {
            near((x, y), rule.at) && rule.on.as_deref().map_or(true, |on| on == current)
        });
        if let Some(rule) = rule {
            if rule.push {
                state.stack.push(rule.to.clone());
            } else {
                Self::show(&mut state, &rule.to);
            }
        }
        Ok(())
    }

    async fn swipe(&self, from: (f64, f64), to: (f64, f64)) -> SimulatorResult<()> {
        self.log(Call::Swipe(from, to));
        let mut state = self.state.lock().unwrap();
        let current = state.stack.last().cloned().unwrap_or_default();
        if current == SPRINGBOARD {
            return Ok(());
        }
        let (dx, dy) = (to.0 - from.0, to.1 - from.1);
        if from.0 < 1.0 && dx > 0.0 {
            if state.stack.len() > 1 {
                state.stack.pop();
            }
            return Ok(());
        }
        let next = if dy.abs() > dx.abs() && dy < 0.0 {
            self.graph.scrolls.get(&current)
        } else if dx.abs() > dy.abs() && dx < 0.0 {
            self.graph.pages.get(&current)
        } else {
            None
        };
        if let Some(next) = next.cloned() {
            *state.stack.last_mut().unwrap() = next;
        }
        Ok(())
    }

    async fn type_text(&self, text: &str) -> SimulatorResult<()> {
        self.log(Call::TypeText(text.to_string()));
        Ok(())
    }

    async fn capture_frame(&self, path: &Path) -> SimulatorResult<()> {
        if self.capture_broken {
            return Err(SimulatorError::Command("screenshot failed".to_string()));
        }
        let frame = {
            let mut state = self.state.lock().unwrap();
            state.captures += 1;
            let screen = state.stack.last().cloned().unwrap_or_default();
            if self.animated {
                format!("frame:{screen}:{}", state.captures)
            } else {
                format!("frame:{screen}")
            }
        };
        std::fs::write(path, frame)?;
        Ok(())
    }

    async fn launch(&self, bundle_id: &str, args: &[String]) -> SimulatorResult<()> {
        self.log(Call::Launch(bundle_id.to_string(), args.to_vec()));
        let mut state = self.state.lock().unwrap();
        state.launches += 1;
        let foreground = match self.launch {
            LaunchBehavior::Foreground => true,
            LaunchBehavior::StayHome => false,
            LaunchBehavior::HomeWithArguments => args.is_empty(),
            LaunchBehavior::Crash => {
                state.running = false;
                return Ok(());
            }
            LaunchBehavior::FailOnce if state.launches > 1 => true,
            LaunchBehavior::Fail | LaunchBehavior::FailOnce => {
                return Err(SimulatorError::Command(format!(
                    "simctl launch {bundle_id}: no such app"
                )))
            }
        };
        state.running = true;
        if foreground {
            Self::show(&mut state, &self.graph.initial);
        }
        Ok(())
    }

    async fn open_url(&self, url: &str) -> SimulatorResult<()> {
        self.log(Call::OpenUrl(url.to_string()));
        let mut state = self.state.lock().unwrap();
        if let Some(screen) = self.graph.links.get(url) {
            state.running = true;
            Self::show(&mut state, screen);
        }
        Ok(())
    }

    async fn terminate(&self, bundle_id: &str) -> SimulatorResult<()> {
        self.log(Call::Terminate(bundle_id.to_string()));
        let mut state = self.state.lock().unwrap();
        state.running = false;
        Self::show(&mut state, SPRINGBOARD);
        Ok(())
    }

    async fn is_process_running(&self, bundle_id: &str) -> SimulatorResult<bool> {
        Ok(bundle_id == self.bundle_id && self.state.lock().unwrap().running)
    }

    async fn foreground_app(&self) -> SimulatorResult<Option<String>> {
        if !self.answers_foreground_query {
            return Ok(None);
        }
        let state = self.state.lock().unwrap();
        let current = state.stack.last().map(String::as_str).unwrap_or(SPRINGBOARD);
        if current == FOREIGN_SCREEN {
            return Ok(self.foreign_app.clone());
        }
        if state.running && current != SPRINGBOARD {
            Ok(Some(self.bundle_id.clone()))
        } else {
            Ok(None)
        }
    }

    async fn is_home_screen_frontmost(&self) -> bool {
        self.current() == SPRINGBOARD
    }

    async fn write_preference(
        &self,
        _bundle_id: &str,
        key: &str,
        _value: &PreferenceValue,
    ) -> SimulatorResult<()> {
        self.log(Call::Preference(key.to_string()));
        Ok(())
    }

    async fn write_credential_entry(
        &self,
        _bundle_id: &str,
        key: &str,
        _value: &str,
    ) -> SimulatorResult<()> {
        self.log(Call::Credential(key.to_string()));
        Err(SimulatorError::Unsupported("keychain".to_string()))
    }
}

/// Defaults with every wait shrunk to a few virtual milliseconds.
pub fn fast_config() -> ScoutConfig {
    ScoutConfig {
        capture: CaptureSection {
            poll_attempts: 2,
            poll_interval_ms: 5,
        },
        settle: SettleSection {
            min_delay_ms: 0,
            poll_interval_ms: 10,
            max_wait_ms: 30,
        },
        launch: LaunchSection {
            max_attempts: 3,
            interval_ms: 10,
        },
        ..ScoutConfig::default()
    }
}

pub fn fingerprinter(device: &Arc<ScriptedDevice>, config: &ScoutConfig) -> Arc<SceneFingerprinter> {
    let driver: Arc<dyn DeviceDriver> = device.clone();
    Arc::new(
        SceneFingerprinter::new(driver, config.capture.clone(), config.settle.clone()).unwrap(),
    )
}

pub fn prober(device: &Arc<ScriptedDevice>, config: &ScoutConfig) -> Arc<Prober> {
    let driver: Arc<dyn DeviceDriver> = device.clone();
    Arc::new(Prober::new(
        driver,
        fingerprinter(device, config),
        DeviceProfile::fallback(),
    ))
}

pub async fn session(dir: &Path) -> ExplorationSession {
    ExplorationSession::create(dir).await.unwrap()
}

pub fn png_files(dir: &Path) -> Vec<String> {
    let mut files: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(".png"))
        .collect();
    files.sort();
    files
}

/// Screen-space point for fractional coordinates on the fallback profile.
pub fn at(fx: f64, fy: f64) -> (f64, f64) {
    DeviceProfile::fallback().point(fx, fy)
}

pub fn tab_point(count: usize, index: usize) -> (f64, f64) {
    DeviceProfile::fallback().tab_points(count)[index]
}
