pub mod config;
pub mod error;
pub mod explore;
pub mod simulator;

pub use config::{
    load_credentials, load_scout_config, BypassStrategy, Credentials, RunConfig, ScoutConfig,
};
pub use error::{ConfigError, Result};
pub use explore::{
    AppAnalysis, AppAnalyzer, ExplorationRun, ExplorationSession, LaunchState, PlistInspector,
    RunReport, SceneChange, ScreenFingerprint,
};
pub use simulator::{
    DeviceDriver, DeviceProfile, SimctlDriver, SimulatorError, SimulatorResult,
};
