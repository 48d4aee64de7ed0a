use anyhow::{ensure, Context, Result};
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::{config::AnalysisOptions, manifest::ImageReference};

/// Platform to scan for: the image's own, falling back to the configured default.
pub fn effective_platform(image: &ImageReference, options: &AnalysisOptions) -> Option<String> {
    if image.platform.is_empty() {
        options.default_platform()
    } else {
        Some(image.platform.clone())
    }
}

fn syft_command(image: &ImageReference, options: &AnalysisOptions) -> Command {
    let mut command = Command::new(&options.syft_path);
    command
        .arg("scan")
        .arg("--quiet") // Supress non-error output
        .arg("-o")
        .arg("cyclonedx-json");

    if let Some(platform) = effective_platform(image, options) {
        command.arg("--platform").arg(platform);
    }
    if let Some(config_path) = &options.syft_config_path {
        command.arg("-c").arg(config_path);
    }

    command.arg(&image.image);
    command
}

/// Call syft for a single image and return its CycloneDX SBOM.
/// Syft doesn't take multiple inputs at once, so callers loop over the images.
#[tracing::instrument(skip(options))]
pub async fn create_sbom(image: &ImageReference, options: &AnalysisOptions) -> Result<Value> {
    debug!("running syft against image");
    let output = syft_command(image, options)
        .output()
        .await
        .with_context(|| format!("failed to run {}", options.syft_path.to_string_lossy()))?;

    ensure!(
        output.status.success(),
        "syft failed for {image} ({}): {}",
        output.status,
        String::from_utf8_lossy(&output.stderr).trim()
    );

    debug!("parsing sbom for further processing");
    let sbom = serde_json::from_slice(&output.stdout)
        .with_context(|| format!("syft produced an unreadable sbom for {image}"))?;
    Ok(sbom)
}
