use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::simulator::{CommandExecutor, SimulatorError, SimulatorResult, SystemCommandExecutor};

/// Guesswork vocabulary for plausible in-app routes.
pub const COMMON_SCREEN_KEYWORDS: &[&str] = &[
    "home",
    "profile",
    "settings",
    "search",
    "messages",
    "notifications",
    "feed",
    "explore",
    "account",
    "cart",
];

const CANONICAL_SUFFIXES: &[&str] = &["", "main", "home", "dashboard"];
const PRIORITY_ROUTES: &[&str] = &["home", "main", "dashboard"];

/// Navigation surface derived from static metadata before the app is touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppAnalysis {
    pub bundle_id: String,
    pub app_path: Option<PathBuf>,
    pub url_schemes: Vec<String>,
    pub common_screen_keywords: Vec<String>,
    pub deep_link_candidates: Vec<String>,
}

impl AppAnalysis {
    pub fn empty(bundle_id: &str) -> Self {
        Self::from_schemes(bundle_id, None, Vec::new(), COMMON_SCREEN_KEYWORDS)
    }

    pub fn from_schemes<K: AsRef<str>>(
        bundle_id: &str,
        app_path: Option<PathBuf>,
        url_schemes: Vec<String>,
        keywords: &[K],
    ) -> Self {
        let deep_link_candidates = generate_deep_links(&url_schemes, keywords);
        Self {
            bundle_id: bundle_id.to_string(),
            app_path,
            url_schemes,
            common_screen_keywords: keywords.iter().map(|k| k.as_ref().to_string()).collect(),
            deep_link_candidates,
        }
    }

    pub fn primary_scheme(&self) -> Option<&str> {
        self.url_schemes.first().map(String::as_str)
    }

    /// Candidates whose route looks like a landing screen, in generation order.
    pub fn priority_deep_links(&self) -> Vec<&str> {
        self.deep_link_candidates
            .iter()
            .filter(|link| {
                let route = link.split_once("://").map(|(_, route)| route).unwrap_or("");
                PRIORITY_ROUTES.iter().any(|keyword| route.contains(keyword))
            })
            .map(String::as_str)
            .collect()
    }
}

/// `schemes × keywords` followed, per scheme, by the four canonical routes.
/// Duplicates are kept; retrying a link is cheap.
pub fn generate_deep_links<S: AsRef<str>, K: AsRef<str>>(
    schemes: &[S],
    keywords: &[K],
) -> Vec<String> {
    let mut links = Vec::with_capacity(schemes.len() * (keywords.len() + CANONICAL_SUFFIXES.len()));
    for scheme in schemes {
        let scheme = scheme.as_ref();
        for keyword in keywords {
            links.push(format!("{scheme}://{}", keyword.as_ref()));
        }
        for suffix in CANONICAL_SUFFIXES {
            links.push(format!("{scheme}://{suffix}"));
        }
    }
    links
}

#[async_trait]
pub trait BundleInspector: Send + Sync {
    /// Never fails; unreadable metadata yields an empty list.
    async fn read_declared_url_schemes(&self, app_path: &Path) -> Vec<String>;
}

/// Reads `CFBundleURLTypes` out of an app's `Info.plist`.
pub struct PlistInspector {
    plutil: PathBuf,
    executor: Arc<dyn CommandExecutor>,
}

impl PlistInspector {
    pub fn new(plutil: impl Into<PathBuf>) -> Self {
        Self {
            plutil: plutil.into(),
            executor: Arc::new(SystemCommandExecutor),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn CommandExecutor>) -> Self {
        self.executor = executor;
        self
    }

    async fn load_plist(&self, plist: &Path) -> SimulatorResult<Value> {
        let raw = tokio::fs::read(plist).await?;
        if raw.iter().find(|byte| !byte.is_ascii_whitespace()) == Some(&b'{') {
            return Ok(serde_json::from_slice(&raw)?);
        }
        let args = vec![
            "-convert".to_string(),
            "json".to_string(),
            "-o".to_string(),
            "-".to_string(),
            plist.to_string_lossy().into_owned(),
        ];
        let output = self.executor.run(&self.plutil, &args).await?;
        if !output.status.success() {
            return Err(SimulatorError::Command(format!(
                "plutil failed for {}: {}",
                plist.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[async_trait]
impl BundleInspector for PlistInspector {
    async fn read_declared_url_schemes(&self, app_path: &Path) -> Vec<String> {
        let Some(plist) = locate_info_plist(app_path) else {
            debug!(path = %app_path.display(), "no Info.plist found");
            return Vec::new();
        };
        match self.load_plist(&plist).await {
            Ok(value) => parse_url_schemes(&value),
            Err(err) => {
                debug!(path = %plist.display(), error = %err, "Info.plist unreadable");
                Vec::new()
            }
        }
    }
}

/// Accepts the plist itself, an `.app` directory, or an extraction directory
/// containing one.
pub(crate) fn locate_info_plist(app_path: &Path) -> Option<PathBuf> {
    if app_path.is_file() {
        return Some(app_path.to_path_buf());
    }
    if !app_path.is_dir() {
        return None;
    }
    let direct = app_path.join("Info.plist");
    if direct.is_file() {
        return Some(direct);
    }
    WalkDir::new(app_path)
        .max_depth(3)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .is_some_and(|extension| extension == "app")
        })
        .map(|entry| entry.path().join("Info.plist"))
        .find(|candidate| candidate.is_file())
}

pub(crate) fn parse_url_schemes(plist: &Value) -> Vec<String> {
    let mut schemes = Vec::new();
    let Some(url_types) = plist.get("CFBundleURLTypes").and_then(Value::as_array) else {
        return schemes;
    };
    for url_type in url_types {
        let Some(declared) = url_type.get("CFBundleURLSchemes").and_then(Value::as_array) else {
            continue;
        };
        for scheme in declared.iter().filter_map(Value::as_str) {
            let scheme = scheme.trim().trim_end_matches("://");
            if !scheme.is_empty() && !schemes.iter().any(|known| known == scheme) {
                schemes.push(scheme.to_string());
            }
        }
    }
    schemes
}

pub struct AppAnalyzer {
    inspector: Arc<dyn BundleInspector>,
    keywords: Vec<String>,
}

impl AppAnalyzer {
    pub fn new(inspector: Arc<dyn BundleInspector>) -> Self {
        Self {
            inspector,
            keywords: COMMON_SCREEN_KEYWORDS.iter().map(|k| k.to_string()).collect(),
        }
    }

    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    pub async fn analyze(&self, bundle_id: &str, app_path: Option<&Path>) -> AppAnalysis {
        let schemes = match app_path {
            Some(path) => self.inspector.read_declared_url_schemes(path).await,
            None => Vec::new(),
        };
        let analysis = AppAnalysis::from_schemes(
            bundle_id,
            app_path.map(Path::to_path_buf),
            schemes,
            &self.keywords,
        );
        info!(
            bundle_id,
            schemes = analysis.url_schemes.len(),
            deep_links = analysis.deep_link_candidates.len(),
            "app analysis completed"
        );
        analysis
    }
}
