use std::path::PathBuf;

use appscout_core::{load_credentials, Credentials, RunConfig};
use clap::Args;

use crate::{AppError, Result};

/// Launches an app on a booted simulator and captures every reachable screen.
#[derive(Args, Debug, Clone)]
pub struct ExploreArgs {
    /// Bundle identifier of the installed app
    #[arg(long)]
    pub bundle_id: String,

    /// Simulator model name, used to pick screen geometry
    #[arg(long, default_value = "iPhone 15 Pro")]
    pub device: String,

    /// Path to the .app bundle or its extraction directory, for URL scheme analysis
    #[arg(long, value_name = "PATH")]
    pub app_path: Option<PathBuf>,

    /// Directory receiving screenshots, urls.json and manifest.json
    #[arg(short, long, default_value = "screenshots")]
    pub output_dir: PathBuf,

    /// JSON file with email, password, skipButtonText and deepLink fields
    #[arg(long, value_name = "FILE")]
    pub credentials: Option<PathBuf>,

    /// Login email; overrides the credentials file
    #[arg(long)]
    pub email: Option<String>,

    /// Login password; overrides the credentials file
    #[arg(long)]
    pub password: Option<String>,

    /// Label of the onboarding skip button; overrides the credentials file
    #[arg(long)]
    pub skip_button_text: Option<String>,

    /// Deep link opened once bypass finishes; overrides the credentials file
    #[arg(long)]
    pub deep_link: Option<String>,
}

impl ExploreArgs {
    /// Merges the credentials file with command-line overrides. Returns `None`
    /// when nothing was supplied.
    pub fn resolve_credentials(&self) -> Result<Option<Credentials>> {
        let mut credentials = match &self.credentials {
            Some(path) => load_credentials(path).map_err(|source| AppError::Credentials {
                path: path.clone(),
                source,
            })?,
            None => Credentials::default(),
        };
        let overrides = [
            (&mut credentials.email, &self.email),
            (&mut credentials.password, &self.password),
            (&mut credentials.skip_button_text, &self.skip_button_text),
            (&mut credentials.deep_link, &self.deep_link),
        ];
        for (slot, value) in overrides {
            if let Some(value) = value {
                *slot = Some(value.clone());
            }
        }
        Ok((!credentials.is_empty()).then_some(credentials))
    }

    pub fn run_config(&self) -> Result<RunConfig> {
        Ok(RunConfig {
            device: self.device.clone(),
            bundle_id: self.bundle_id.clone(),
            app_path: self.app_path.clone(),
            credentials: self.resolve_credentials()?,
            output_dir: self.output_dir.clone(),
        })
    }
}
