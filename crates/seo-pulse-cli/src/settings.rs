use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::Deserialize;
use seo_pulse_core::OutputFormat;

/// CLI settings merged from an optional config file, `SEO_PULSE_*`
/// environment variables and command-line flags, in increasing precedence.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Settings {
    #[serde(default = "default_reports_dir")]
    pub reports_dir: PathBuf,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("./reports")
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            reports_dir: default_reports_dir(),
            client_id: None,
            format: OutputFormat::default(),
        }
    }
}

impl Settings {
    const ENV_PREFIX: &'static str = "SEO_PULSE";

    /// Load settings from `config_path` (when given) and the environment.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }
        builder = builder.add_source(Environment::with_prefix(Self::ENV_PREFIX));
        let config = builder.build().with_context(|| match config_path {
            Some(path) => format!("failed to load configuration from {}", path.display()),
            None => "failed to load configuration from environment".to_string(),
        })?;
        let mut settings: Self = config
            .try_deserialize()
            .context("invalid seo-pulse configuration")?;
        settings.client_id = settings.client_id.filter(|id| !id.trim().is_empty());
        Ok(settings)
    }

    /// Apply command-line overrides on top of loaded settings.
    pub fn with_overrides(
        mut self,
        reports_dir: Option<PathBuf>,
        client_id: Option<String>,
        format: Option<OutputFormat>,
    ) -> Self {
        if let Some(dir) = reports_dir {
            self.reports_dir = dir;
        }
        if let Some(id) = client_id {
            self.client_id = Some(id);
        }
        if let Some(format) = format {
            self.format = format;
        }
        self
    }
}
