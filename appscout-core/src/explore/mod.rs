mod analyzer;
mod bypass;
mod controller;
mod fingerprint;
mod launch;
mod probe;
mod runner;
mod session;

pub use analyzer::{
    generate_deep_links, AppAnalysis, AppAnalyzer, BundleInspector, PlistInspector,
    COMMON_SCREEN_KEYWORDS,
};
pub use bypass::{BypassPipeline, BypassReport, ExplicitLinkOutcome, StrategyAttempt, SKIP_POSITIONS};
pub use controller::{ExplorationController, ExplorationSummary, TabLayout, HEADER_POSITIONS};
pub use fingerprint::{Frame, SceneChange, SceneFingerprinter, ScreenFingerprint};
pub use launch::{ForegroundSignal, LaunchReport, LaunchState, LaunchVerifier};
pub use probe::{Interaction, ProbeOutcome, Prober, BACK_BUTTON};
pub use runner::{ExplorationRun, RunReport};
pub use session::{sanitize_label, ExplorationSession, ManifestEntry, MANIFEST_FILE, URLS_FILE};
