use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::{RunConfig, ScoutConfig};
use crate::simulator::{
    DeviceDriver, DeviceProfile, ExplorationMetrics, SimulatorError, SimulatorResult,
};

use super::analyzer::{AppAnalysis, AppAnalyzer, BundleInspector};
use super::bypass::{BypassPipeline, BypassReport};
use super::controller::{ExplorationController, ExplorationSummary};
use super::fingerprint::SceneFingerprinter;
use super::launch::{LaunchReport, LaunchVerifier};
use super::probe::Prober;
use super::session::{ExplorationSession, ManifestEntry};

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub bundle_id: String,
    pub device: DeviceProfile,
    pub started_at: DateTime<Utc>,
    pub duration_secs: u64,
    pub analysis: AppAnalysis,
    pub launch: LaunchReport,
    pub bypass: BypassReport,
    pub exploration: ExplorationSummary,
    pub manifest: Vec<ManifestEntry>,
    pub metrics: ExplorationMetrics,
    pub notes: Vec<String>,
}

impl RunReport {
    pub fn screenshots(&self) -> usize {
        self.manifest.len()
    }
}

/// One end-to-end run: analyze, launch, bypass, explore, write outputs.
pub struct ExplorationRun {
    driver: Arc<dyn DeviceDriver>,
    inspector: Arc<dyn BundleInspector>,
    config: ScoutConfig,
}

impl ExplorationRun {
    pub fn new(
        driver: Arc<dyn DeviceDriver>,
        inspector: Arc<dyn BundleInspector>,
        config: ScoutConfig,
    ) -> Self {
        Self {
            driver,
            inspector,
            config,
        }
    }

    /// Fails with [`SimulatorError::LaunchAborted`] when the app never reaches
    /// the foreground; only `urls.json` is written in that case.
    pub async fn run(&self, run: &RunConfig) -> SimulatorResult<RunReport> {
        let start = Instant::now();
        let started_at = Utc::now();
        let run_id = Uuid::new_v4();
        let profile = DeviceProfile::resolve(&run.device);
        info!(
            %run_id,
            bundle_id = %run.bundle_id,
            device = %profile.name,
            output = %run.output_dir.display(),
            "exploration run started"
        );

        let mut session = ExplorationSession::create(&run.output_dir).await?;
        let features = &self.config.features;

        let analysis = if features.enable_app_analysis {
            AppAnalyzer::new(Arc::clone(&self.inspector))
                .analyze(&run.bundle_id, run.app_path.as_deref())
                .await
        } else {
            AppAnalysis::empty(&run.bundle_id)
        };
        let analysis = Arc::new(analysis);

        let fingerprinter = Arc::new(SceneFingerprinter::new(
            Arc::clone(&self.driver),
            self.config.capture.clone(),
            self.config.settle.clone(),
        )?);
        let prober = Arc::new(Prober::new(
            Arc::clone(&self.driver),
            Arc::clone(&fingerprinter),
            profile.clone(),
        ));
        let pipeline = BypassPipeline::new(
            Arc::clone(&prober),
            run.bundle_id.clone(),
            Arc::clone(&analysis),
            run.credentials.clone(),
            features.clone(),
            self.config.bypass.clone(),
        );

        let baseline = fingerprinter.capture().await;
        let mut bypass = BypassReport::default();
        pipeline.prepare(&mut bypass).await;

        let fallback_url = analysis.primary_scheme().map(|scheme| format!("{scheme}://"));
        let mut verifier = LaunchVerifier::new(
            Arc::clone(&self.driver),
            Arc::clone(&fingerprinter),
            self.config.launch.clone(),
        );
        let launch = verifier
            .verify(&run.bundle_id, &[], fallback_url.as_deref(), baseline.as_ref())
            .await;
        if let Some(reason) = launch.state.abort_reason() {
            warn!(bundle_id = %run.bundle_id, reason, "exploration aborted before any capture");
            session.finish_aborted().await?;
            return Err(SimulatorError::LaunchAborted {
                bundle_id: run.bundle_id.clone(),
                reason: reason.to_string(),
            });
        }

        prober.snapshot(&mut session, "launch").await;
        pipeline.run(&mut session, &mut bypass).await;

        let controller = ExplorationController::new(
            Arc::clone(&prober),
            features.clone(),
            self.config.exploration.clone(),
        );
        let exploration = controller
            .explore(&mut session, &analysis, bypass.working_deep_link.as_deref())
            .await;

        session.set_capture_failures(fingerprinter.capture_failures());
        session.finish().await?;

        let report = RunReport {
            run_id,
            bundle_id: run.bundle_id.clone(),
            device: profile,
            started_at,
            duration_secs: start.elapsed().as_secs(),
            analysis: analysis.as_ref().clone(),
            launch,
            bypass,
            exploration,
            manifest: session.manifest().to_vec(),
            metrics: session.metrics().clone(),
            notes: session.notes().to_vec(),
        };
        info!(
            %run_id,
            screenshots = report.screenshots(),
            probes = report.metrics.probes,
            duplicates = report.metrics.duplicates_skipped,
            duration = report.duration_secs,
            "exploration run finished"
        );
        Ok(report)
    }
}
