mod support;

use std::sync::Arc;

use appscout_core::explore::ExplorationController;
use appscout_core::simulator::{DeviceDriver, DeviceProfile};
use tempfile::tempdir;

use support::{
    at, fast_config, png_files, prober, session, tab_point, Call, ScreenGraph, ScriptedDevice,
};

const BUNDLE: &str = "com.example.shop";

fn three_tab_graph() -> ScreenGraph {
    ScreenGraph::new("home")
        .tab(tab_point(3, 0), "home")
        .tab(tab_point(3, 1), "search")
        .tab(tab_point(3, 2), "profile")
}

async fn launched(graph: ScreenGraph) -> Arc<ScriptedDevice> {
    let device = Arc::new(ScriptedDevice::new(BUNDLE, graph));
    device.launch(BUNDLE, &[]).await.unwrap();
    device
}

fn tab_bar_taps(device: &ScriptedDevice) -> Vec<(f64, f64)> {
    let tab_bar_y = DeviceProfile::fallback().tab_bar_y as f64;
    device
        .taps()
        .into_iter()
        .filter(|(_, y)| *y == tab_bar_y)
        .collect()
}

#[tokio::test(start_paused = true)]
async fn tab_discovery_settles_on_first_productive_count() {
    let device = launched(three_tab_graph()).await;
    let config = fast_config();
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let layout = controller.discover_tabs(&mut session).await.unwrap();

    assert_eq!(layout.count, 3);
    assert_eq!(layout.unique_screens, 2);
    let profile = DeviceProfile::fallback();
    let mut expected = profile.tab_points(4);
    expected.extend(profile.tab_points(3));
    assert_eq!(tab_bar_taps(&device), expected);
    assert_eq!(png_files(dir.path()), vec!["01_tab_2.png", "02_tab_3.png"]);
}

#[tokio::test(start_paused = true)]
async fn tab_discovery_gives_up_after_every_candidate() {
    let device = launched(ScreenGraph::new("home")).await;
    let config = fast_config();
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    assert!(controller.discover_tabs(&mut session).await.is_none());
    assert_eq!(tab_bar_taps(&device).len(), 4 + 3 + 5);
    assert_eq!(session.sequence(), 0);
}

#[tokio::test(start_paused = true)]
async fn grid_probing_stops_at_discovery_cap() {
    let config = {
        let mut config = fast_config();
        config.features.max_grid_discoveries = 2;
        config
    };
    let probe_controller = ExplorationController::new(
        prober(&launched(ScreenGraph::new("home")).await, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let cells = probe_controller.grid_points();
    assert_eq!(cells.len(), 6);

    let graph = cells
        .iter()
        .fold(ScreenGraph::new("home"), |graph, (row, column, point)| {
            graph.push("home", *point, &format!("detail_{row}_{column}"))
        });
    let device = launched(graph).await;
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let mut budget = config.features.max_grid_discoveries;
    let found = controller.probe_grid(&mut session, "", &mut budget).await;

    assert_eq!(found, 2);
    assert_eq!(budget, 0);
    assert_eq!(
        png_files(dir.path()),
        vec!["01_grid_r1c1.png", "02_grid_r1c2.png"]
    );
    let grid_taps: Vec<_> = device
        .taps()
        .into_iter()
        .filter(|tap| cells.iter().any(|(_, _, point)| point == tap))
        .collect();
    assert_eq!(grid_taps.len(), 2);
    assert_eq!(device.current(), "home");
    assert_eq!(session.metrics().back_navigations, 2);
}

#[tokio::test(start_paused = true)]
async fn scrolled_discoveries_count_against_grid_cap() {
    let mut config = fast_config();
    config.features.max_grid_discoveries = 3;
    config.exploration.scroll_discovered_screens = true;
    let reference = ExplorationController::new(
        prober(&launched(ScreenGraph::new("home")).await, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let cells = reference.grid_points();
    let graph = cells
        .iter()
        .fold(ScreenGraph::new("home"), |graph, (row, column, point)| {
            let detail = format!("detail_{row}_{column}");
            graph
                .push("home", *point, &detail)
                .scroll(&detail, &format!("{detail}_more"))
        });
    let device = launched(graph).await;
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let mut budget = config.features.max_grid_discoveries;
    let found = controller.probe_grid(&mut session, "", &mut budget).await;

    assert_eq!(found, 3);
    assert_eq!(budget, 0);
    assert_eq!(
        png_files(dir.path()),
        vec![
            "01_grid_r1c1.png",
            "02_grid_r1c1_scrolled.png",
            "03_grid_r1c2.png",
        ]
    );
    let scrolls = device
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Swipe(from, to) if to.1 < from.1))
        .count();
    assert_eq!(scrolls, 1);
    assert_eq!(device.current(), "home");
}

#[tokio::test(start_paused = true)]
async fn grid_cap_is_shared_across_tabs() {
    let mut config = fast_config();
    config.features.max_grid_discoveries = 4;
    config.features.enable_deep_link_discovery = false;
    let reference = ExplorationController::new(
        prober(&launched(ScreenGraph::new("home")).await, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let mut graph = three_tab_graph();
    for tab in ["home", "search", "profile"] {
        for (row, column, point) in reference.grid_points() {
            graph = graph.push(tab, point, &format!("{tab}_detail_{row}_{column}"));
        }
    }
    let device = launched(graph).await;
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;
    let analysis = appscout_core::AppAnalysis::empty(BUNDLE);

    let summary = controller.explore(&mut session, &analysis, None).await;

    assert_eq!(summary.tabs.as_ref().map(|layout| layout.count), Some(3));
    assert_eq!(summary.grid_discoveries, 4);
    let grid_files = png_files(dir.path())
        .into_iter()
        .filter(|name| name.contains("grid"))
        .count();
    assert_eq!(grid_files, 4);
}

#[tokio::test(start_paused = true)]
async fn scroll_probe_records_new_content_and_scrolls_back() {
    let device = launched(ScreenGraph::new("home").scroll("home", "home_more")).await;
    let config = fast_config();
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let found = controller.probe_scroll(&mut session, "tab1_").await;

    assert_eq!(found, 1);
    assert_eq!(png_files(dir.path()), vec!["01_tab1_scroll_1.png"]);
    let swipes = device
        .calls()
        .into_iter()
        .filter(|call| matches!(call, Call::Swipe(..)))
        .count();
    assert_eq!(
        swipes,
        config.exploration.scroll_down_swipes + config.exploration.scroll_up_swipes
    );
}

#[tokio::test(start_paused = true)]
async fn header_chrome_hits_are_reverted() {
    let device = launched(ScreenGraph::new("home").push("home", at(0.93, 0.075), "menu")).await;
    let config = fast_config();
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let found = controller.probe_navigation_chrome(&mut session, "").await;

    assert_eq!(found, 1);
    assert_eq!(png_files(dir.path()), vec!["01_nav_menu.png"]);
    assert_eq!(device.current(), "home");
}

#[tokio::test(start_paused = true)]
async fn deep_link_navigation_is_capped() {
    let graph = ScreenGraph::new("home")
        .link("shop://feed", "feed")
        .link("shop://orders", "orders")
        .link("shop://help", "help");
    let device = launched(graph).await;
    let config = fast_config();
    let controller = ExplorationController::new(
        prober(&device, &config),
        config.features.clone(),
        config.exploration.clone(),
    );
    let dir = tempdir().unwrap();
    let mut session = session(dir.path()).await;

    let found = controller.navigate_deep_links(&mut session, "shop").await;

    // "help" sits past the navigation cap.
    assert_eq!(found, 2);
    let opened: Vec<String> = device
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            Call::OpenUrl(url) => Some(url),
            _ => None,
        })
        .collect();
    assert_eq!(opened.len(), config.exploration.max_deep_link_navigations);
    assert!(!opened.contains(&"shop://help".to_string()));
    assert_eq!(session.metrics().deep_links_opened, 8);
    assert_eq!(
        png_files(dir.path()),
        vec!["01_deeplink_feed.png", "02_deeplink_orders.png"]
    );
}
