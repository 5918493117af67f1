use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info};
use url::Url;

use crate::config::{ExplorationSection, FeaturesSection};
use crate::simulator::SwipeDirection;

use super::analyzer::AppAnalysis;
use super::probe::{Interaction, Prober, BACK_BUTTON};
use super::session::ExplorationSession;

/// Header chrome probed on every explored screen, as screen fractions.
pub const HEADER_POSITIONS: &[(&str, (f64, f64))] = &[
    ("nav_back", BACK_BUTTON),
    ("nav_menu", (0.93, 0.075)),
    ("nav_title", (0.50, 0.075)),
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TabLayout {
    pub count: usize,
    pub points: Vec<(f64, f64)>,
    pub unique_screens: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExplorationSummary {
    pub tabs: Option<TabLayout>,
    pub grid_discoveries: usize,
    pub scroll_screens: usize,
    pub chrome_screens: usize,
    pub deep_link_screens: usize,
}

pub struct ExplorationController {
    prober: Arc<Prober>,
    features: FeaturesSection,
    config: ExplorationSection,
}

impl ExplorationController {
    pub fn new(prober: Arc<Prober>, features: FeaturesSection, config: ExplorationSection) -> Self {
        Self {
            prober,
            features,
            config,
        }
    }

    /// Tabs first, then grid, scroll and header probing per tab, then deep-link
    /// navigation once a working link is known.
    pub async fn explore(
        &self,
        session: &mut ExplorationSession,
        analysis: &AppAnalysis,
        working_deep_link: Option<&str>,
    ) -> ExplorationSummary {
        let mut summary = ExplorationSummary {
            tabs: self.discover_tabs(session).await,
            ..Default::default()
        };

        let targets: Vec<Option<(f64, f64)>> = match &summary.tabs {
            Some(layout) => layout.points.iter().copied().map(Some).collect(),
            None => vec![None],
        };
        let mut grid_budget = self.features.max_grid_discoveries;
        for (index, target) in targets.into_iter().enumerate() {
            let prefix = match target {
                Some(point) => {
                    let label = format!("tab_{}", index + 1);
                    self.prober
                        .probe(session, &Interaction::tap(point), Some(&label))
                        .await;
                    format!("tab{}_", index + 1)
                }
                None => String::new(),
            };
            summary.grid_discoveries += self.probe_grid(session, &prefix, &mut grid_budget).await;
            summary.scroll_screens += self.probe_scroll(session, &prefix).await;
            summary.chrome_screens += self.probe_navigation_chrome(session, &prefix).await;
        }

        if self.features.enable_deep_link_discovery {
            if let Some(scheme) = working_deep_link.and_then(|link| link_scheme(link, analysis)) {
                summary.deep_link_screens = self.navigate_deep_links(session, &scheme).await;
            }
        }

        info!(
            tabs = summary.tabs.as_ref().map(|layout| layout.count),
            grid = summary.grid_discoveries,
            scroll = summary.scroll_screens,
            chrome = summary.chrome_screens,
            deep_links = summary.deep_link_screens,
            "exploration finished"
        );
        summary
    }

    /// Tries each candidate tab count in order and commits to the first one
    /// that surfaces at least one new screen.
    pub async fn discover_tabs(&self, session: &mut ExplorationSession) -> Option<TabLayout> {
        let profile = self.prober.profile();
        for &count in &self.features.tab_candidate_counts {
            let points = profile.tab_points(count);
            let mut unique_screens = 0usize;
            for (index, point) in points.iter().enumerate() {
                let label = format!("tab_{}", index + 1);
                let outcome = self
                    .prober
                    .probe(session, &Interaction::tap(*point), Some(&label))
                    .await;
                if outcome.is_novel() {
                    unique_screens += 1;
                }
            }
            debug!(count, unique_screens, "tab candidate probed");
            if unique_screens > 0 {
                info!(count, unique_screens, "tab layout accepted");
                return Some(TabLayout {
                    count,
                    points,
                    unique_screens,
                });
            }
        }
        info!("no tab layout detected");
        None
    }

    /// Tap centers of the content grid, excluding the header and tab bar bands.
    pub fn grid_points(&self) -> Vec<(usize, usize, (f64, f64))> {
        let profile = self.prober.profile();
        let rows = self.config.grid_rows;
        let columns = self.config.grid_columns;
        let top = self.config.top_margin;
        let span = 1.0 - self.config.top_margin - self.config.bottom_margin;
        let mut points = Vec::with_capacity(rows * columns);
        for row in 0..rows {
            let fy = top + span * (2 * row + 1) as f64 / (2 * rows) as f64;
            for column in 0..columns {
                let fx = (2 * column + 1) as f64 / (2 * columns) as f64;
                points.push((row + 1, column + 1, profile.point(fx, fy)));
            }
        }
        points
    }

    /// Probes grid cells until `budget` new screens have been found. Each hit
    /// is reverted with back navigation before the next cell.
    pub async fn probe_grid(
        &self,
        session: &mut ExplorationSession,
        prefix: &str,
        budget: &mut usize,
    ) -> usize {
        let mut found = 0usize;
        for (row, column, point) in self.grid_points() {
            if *budget == 0 {
                debug!("grid discovery cap reached");
                break;
            }
            let label = format!("{prefix}grid_r{row}c{column}");
            let outcome = self
                .prober
                .probe(session, &Interaction::tap(point), Some(&label))
                .await;
            if outcome.is_novel() {
                *budget -= 1;
                found += 1;
                if self.config.scroll_discovered_screens && *budget > 0 {
                    let swipe = Interaction::swipe(SwipeDirection::Down, self.prober.profile());
                    let scrolled = format!("{label}_scrolled");
                    if self
                        .prober
                        .probe(session, &swipe, Some(&scrolled))
                        .await
                        .is_novel()
                    {
                        *budget -= 1;
                        found += 1;
                    }
                }
            }
            if outcome.change.is_changed() {
                self.prober.navigate_back(session).await;
            }
        }
        found
    }

    pub async fn probe_scroll(&self, session: &mut ExplorationSession, prefix: &str) -> usize {
        let profile = self.prober.profile();
        let down = Interaction::swipe(SwipeDirection::Down, profile);
        let mut found = 0usize;
        for index in 0..self.config.scroll_down_swipes {
            let label = format!("{prefix}scroll_{}", index + 1);
            if self.prober.probe(session, &down, Some(&label)).await.is_novel() {
                found += 1;
            }
        }
        let up = Interaction::swipe(SwipeDirection::Up, profile);
        for _ in 0..self.config.scroll_up_swipes {
            if let Err(err) = self.prober.perform(&up).await {
                debug!(error = %err, "scroll back up failed");
            }
        }
        found
    }

    pub async fn probe_navigation_chrome(
        &self,
        session: &mut ExplorationSession,
        prefix: &str,
    ) -> usize {
        let profile = self.prober.profile();
        let mut found = 0usize;
        for (name, (fx, fy)) in HEADER_POSITIONS {
            let label = format!("{prefix}{name}");
            let outcome = self
                .prober
                .probe(session, &Interaction::tap(profile.point(*fx, *fy)), Some(&label))
                .await;
            if outcome.is_novel() {
                found += 1;
            }
            if outcome.change.is_changed() {
                self.prober.navigate_back(session).await;
            }
        }
        found
    }

    /// Opens `scheme://keyword` for each secondary keyword. Deep links replace
    /// the current screen, so nothing is reverted.
    pub async fn navigate_deep_links(&self, session: &mut ExplorationSession, scheme: &str) -> usize {
        let mut found = 0usize;
        for keyword in self
            .config
            .deep_link_keywords
            .iter()
            .take(self.config.max_deep_link_navigations)
        {
            let url = format!("{scheme}://{keyword}");
            let label = format!("deeplink_{keyword}");
            let outcome = self
                .prober
                .probe(session, &Interaction::OpenUrl(url), Some(&label))
                .await;
            session.record_deep_link();
            if outcome.is_novel() {
                found += 1;
            }
        }
        found
    }
}

fn link_scheme(link: &str, analysis: &AppAnalysis) -> Option<String> {
    Url::parse(link)
        .ok()
        .map(|url| url.scheme().to_string())
        .or_else(|| link.split_once("://").map(|(scheme, _)| scheme.to_string()))
        .filter(|scheme| !scheme.is_empty())
        .or_else(|| analysis.primary_scheme().map(str::to_string))
}
