use std::path::{Path, PathBuf};
use std::sync::Arc;

use appscout_core::explore::{AppAnalysis, BundleInspector, RunReport};
use appscout_core::simulator::{DeviceDriver, DeviceProfile};
use appscout_core::{
    load_scout_config, AppAnalyzer, ExplorationRun, PlistInspector, ScoutConfig, SimctlDriver,
};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

pub mod commands;

use commands::{AnalyzeArgs, ExploreArgs};

pub type Result<T> = std::result::Result<T, AppError>;

const DEFAULT_CONFIG: &str = "configs/appscout.toml";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] appscout_core::ConfigError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("{0}")]
    Simulator(#[from] appscout_core::SimulatorError),
    #[error("failed to read credentials from {}: {source}", .path.display())]
    Credentials {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Explore iOS apps on a simulator and capture their screens", long_about = None)]
pub struct Cli {
    /// Path to appscout.toml; built-in defaults apply when absent
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,
    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a full exploration against a booted simulator
    Explore(ExploreArgs),
    /// Derive deep-link candidates from an app bundle without launching it
    Analyze(AnalyzeArgs),
    /// List the known device geometries
    Devices,
}

pub fn run(cli: Cli) -> Result<()> {
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;

    match &cli.command {
        Commands::Explore(args) => {
            let report = block_on(explore(&config, args))??;
            render(&report, cli.format)?;
        }
        Commands::Analyze(args) => {
            let analysis = block_on(analyze(&config, args))?;
            render(&analysis, cli.format)?;
        }
        Commands::Devices => {
            render(&DeviceProfile::all(), cli.format)?;
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// An explicit path must exist; otherwise the conventional location is tried
/// before falling back to defaults.
fn load_config(path: Option<&Path>) -> Result<ScoutConfig> {
    match path {
        Some(path) => Ok(load_scout_config(path)?),
        None if Path::new(DEFAULT_CONFIG).is_file() => Ok(load_scout_config(DEFAULT_CONFIG)?),
        None => {
            debug!("no config file found, using defaults");
            Ok(ScoutConfig::default())
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

async fn explore(config: &ScoutConfig, args: &ExploreArgs) -> Result<RunReport> {
    let run = args.run_config()?;
    let driver: Arc<dyn DeviceDriver> = Arc::new(SimctlDriver::new(&config.driver));
    let inspector: Arc<dyn BundleInspector> =
        Arc::new(PlistInspector::new(&config.driver.plutil_program));
    info!(bundle_id = %run.bundle_id, device = %run.device, "starting exploration");
    let report = ExplorationRun::new(driver, inspector, config.clone())
        .run(&run)
        .await?;
    Ok(report)
}

async fn analyze(config: &ScoutConfig, args: &AnalyzeArgs) -> AppAnalysis {
    let inspector = Arc::new(PlistInspector::new(&config.driver.plutil_program));
    AppAnalyzer::new(inspector)
        .analyze(&args.bundle_id, args.app_path.as_deref())
        .await
}

fn render<T>(value: &T, format: OutputFormat) -> Result<()>
where
    T: Serialize + DisplayFallback,
{
    match format {
        OutputFormat::Text => {
            println!("{}", value.display());
            Ok(())
        }
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value)?;
            println!("{}", json);
            Ok(())
        }
    }
}

trait DisplayFallback {
    fn display(&self) -> String;
}

impl DisplayFallback for RunReport {
    fn display(&self) -> String {
        let mut lines = vec![
            format!("Run {} for {} on {}", self.run_id, self.bundle_id, self.device.name),
            format!(
                "Started {} ({}s)",
                self.started_at.to_rfc3339(),
                self.duration_secs
            ),
        ];
        match &self.bypass.cleared_by {
            Some(strategy) => lines.push(format!("Onboarding cleared by {strategy}")),
            None => lines.push("Onboarding not cleared".to_string()),
        }
        match &self.exploration.tabs {
            Some(tabs) => lines.push(format!("Tabs: {}", tabs.count)),
            None => lines.push("Tabs: none detected".to_string()),
        }
        lines.push(format!(
            "Probes: {} ({} changed, {} unchanged, {} inconclusive)",
            self.metrics.probes, self.metrics.changed, self.metrics.unchanged, self.metrics.inconclusive
        ));
        lines.push(format!(
            "Screenshots: {} ({} duplicates skipped)",
            self.screenshots(),
            self.metrics.duplicates_skipped
        ));
        for entry in &self.manifest {
            lines.push(format!("  - {}", entry.path.display()));
        }
        for note in &self.notes {
            lines.push(format!("Note: {note}"));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for AppAnalysis {
    fn display(&self) -> String {
        if self.url_schemes.is_empty() {
            return format!("{}: no URL schemes declared", self.bundle_id);
        }
        let mut lines = vec![format!(
            "{}: schemes {}",
            self.bundle_id,
            self.url_schemes.join(", ")
        )];
        lines.push(format!("Deep link candidates ({}):", self.deep_link_candidates.len()));
        for link in &self.deep_link_candidates {
            lines.push(format!("  - {link}"));
        }
        lines.join("\n")
    }
}

impl DisplayFallback for Vec<DeviceProfile> {
    fn display(&self) -> String {
        self.iter()
            .map(|profile| {
                format!(
                    "{} | {}x{} | tab bar y={}",
                    profile.name, profile.width, profile.height, profile.tab_bar_y
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
