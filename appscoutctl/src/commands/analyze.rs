use std::path::PathBuf;

use clap::Args;

/// Reads declared URL schemes from an app bundle and prints deep-link candidates.
#[derive(Args, Debug, Clone)]
pub struct AnalyzeArgs {
    /// Bundle identifier used to label the analysis
    #[arg(long)]
    pub bundle_id: String,

    /// Path to Info.plist, an .app bundle, or a directory containing one; the
    /// analysis is empty without it
    #[arg(long, value_name = "PATH")]
    pub app_path: Option<PathBuf>,
}
