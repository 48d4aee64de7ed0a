use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "config.yaml";
const REDACTED: &str = "<redacted>";

#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct Config {
    pub analysis: AnalysisOptions,
    pub report_path: Option<PathBuf>,
}

impl Config {
    /// Load the config file given on the command line, or `config.yaml` when none was given.
    /// Only a missing default file falls back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if !path.exists() {
                    warn!("{DEFAULT_CONFIG_PATH} not found, using default settings");
                    return Ok(Self::default());
                }
                path
            }
        };
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.to_string_lossy()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.to_string_lossy()))
    }
}

/// Settings handed to the analysis capability. A run works on its own copy.
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AnalysisOptions {
    pub backend_url: String,
    pub token: Option<String>,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    pub syft_path: PathBuf,
    pub syft_config_path: Option<PathBuf>,
    pub image_platform: Option<String>,
    pub image_os: Option<String>,
    pub image_arch: Option<String>,
    pub image_variant: Option<String>,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            backend_url: String::from("http://localhost:8080"),
            token: None,
            request_timeout: Duration::from_secs(600),
            syft_path: PathBuf::from("syft"),
            syft_config_path: None,
            image_platform: None,
            image_os: None,
            image_arch: None,
            image_variant: None,
        }
    }
}

impl AnalysisOptions {
    /// Platform used for images whose `FROM` line doesn't name one.
    pub fn default_platform(&self) -> Option<String> {
        if let Some(platform) = self.image_platform.as_deref().filter(|p| !p.is_empty()) {
            return Some(platform.to_owned());
        }
        let os = self.image_os.as_deref().filter(|v| !v.is_empty())?;
        let arch = self.image_arch.as_deref().filter(|v| !v.is_empty())?;
        match self.image_variant.as_deref().filter(|v| !v.is_empty()) {
            Some(variant) => Some(format!("{os}/{arch}/{variant}")),
            None => Some(format!("{os}/{arch}")),
        }
    }

    /// Flat key/value view of the options that are set, with the token redacted.
    pub fn entries(&self) -> BTreeMap<&'static str, String> {
        let mut entries = BTreeMap::new();
        entries.insert("backend_url", self.backend_url.clone());
        entries.insert(
            "request_timeout",
            humantime::format_duration(self.request_timeout).to_string(),
        );
        entries.insert("syft_path", self.syft_path.to_string_lossy().to_string());
        if self.token.is_some() {
            entries.insert("token", REDACTED.to_owned());
        }
        if let Some(path) = &self.syft_config_path {
            entries.insert("syft_config_path", path.to_string_lossy().to_string());
        }
        let optional = [
            ("image_platform", &self.image_platform),
            ("image_os", &self.image_os),
            ("image_arch", &self.image_arch),
            ("image_variant", &self.image_variant),
        ];
        for (key, value) in optional {
            if let Some(value) = value {
                entries.insert(key, value.clone());
            }
        }
        entries
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about)]
/// dia collects the base images referenced by a Dockerfile, generates a software bill of
/// materials for each of them and submits those to a dependency analysis service. The HTML report
/// returned by the service is written to a file or printed to stdout.
pub struct Cli {
    /// Path to the config file [default: config.yaml, skipped when missing]
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Where to write the report, overrides `report_path` from the config file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Dockerfile to analyze
    pub manifest: PathBuf,
}
