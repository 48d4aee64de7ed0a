use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use itertools::Itertools;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::{
    config::AnalysisOptions,
    manifest::ImageReference,
    sbom::{create_sbom, effective_platform},
};

const BATCH_ANALYSIS_PATH: &str = "api/v4/batch-analysis";
const CYCLONEDX_JSON: &str = "application/vnd.cyclonedx+json";

/// Produces a dependency report for a set of base images.
#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn analyze(&self, images: Vec<ImageReference>, options: AnalysisOptions)
        -> Result<String>;
}

/// Generates an SBOM per image with syft and submits them to the analysis service, which answers
/// with an HTML report.
#[derive(Clone, Debug, Default)]
pub struct BackendAnalyzer {
    client: reqwest::Client,
}

impl BackendAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ImageAnalyzer for BackendAnalyzer {
    async fn analyze(
        &self,
        images: Vec<ImageReference>,
        options: AnalysisOptions,
    ) -> Result<String> {
        ensure!(!images.is_empty(), "manifest has no analyzable base images");
        info!(
            "Analyzing {}",
            images.iter().map(ToString::to_string).join(", ")
        );

        let mut sboms = Map::new();
        for (key, image) in scan_targets(&images, &options) {
            let sbom = create_sbom(image, &options).await?;
            sboms.insert(key, sbom);
        }

        submit(&self.client, &Value::Object(sboms), &options).await
    }
}

/// Key under which an image's SBOM is submitted.
fn batch_key(image: &ImageReference, options: &AnalysisOptions) -> String {
    match effective_platform(image, options) {
        Some(platform) => format!("{}@{platform}", image.image),
        None => image.image.clone(),
    }
}

/// Images to scan, keyed for submission. Images resolving to the same key share one SBOM.
fn scan_targets<'a>(
    images: &'a [ImageReference],
    options: &AnalysisOptions,
) -> Vec<(String, &'a ImageReference)> {
    images
        .iter()
        .map(|image| (batch_key(image, options), image))
        .unique_by(|(key, _)| key.clone())
        .collect()
}

fn batch_url(options: &AnalysisOptions) -> String {
    format!(
        "{}/{BATCH_ANALYSIS_PATH}",
        options.backend_url.trim_end_matches('/')
    )
}

#[tracing::instrument(skip_all)]
async fn submit(
    client: &reqwest::Client,
    body: &Value,
    options: &AnalysisOptions,
) -> Result<String> {
    let url = batch_url(options);
    debug!(%url, "submitting sboms to analysis service");

    let mut request = client
        .post(&url)
        .timeout(options.request_timeout)
        .header(ACCEPT, "text/html")
        .header(CONTENT_TYPE, CYCLONEDX_JSON)
        .body(serde_json::to_vec(body)?);
    if let Some(token) = &options.token {
        request = request.bearer_auth(token);
    }

    let response = request
        .send()
        .await
        .with_context(|| format!("failed to reach analysis service at {url}"))?;
    let status = response.status();
    let text = response
        .text()
        .await
        .context("failed to read analysis report")?;
    ensure!(
        status.is_success(),
        "analysis service answered {status}: {}",
        text.trim()
    );

    debug!(bytes = text.len(), "received analysis report");
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_url_joins_path() {
        let mut options = AnalysisOptions {
            backend_url: "https://analysis.example.com/".into(),
            ..Default::default()
        };
        assert_eq!(
            batch_url(&options),
            "https://analysis.example.com/api/v4/batch-analysis"
        );
        options.backend_url = "https://analysis.example.com".into();
        assert_eq!(
            batch_url(&options),
            "https://analysis.example.com/api/v4/batch-analysis"
        );
    }

    #[test]
    fn scan_targets_are_keyed_by_reference_and_platform() {
        let options = AnalysisOptions {
            image_os: Some("linux".into()),
            image_arch: Some("amd64".into()),
            ..Default::default()
        };
        let images = [
            ImageReference::new("alpine:3.18", "linux/arm64"),
            ImageReference::new("ubuntu:22.04", ""),
        ];
        let keys: Vec<_> = scan_targets(&images, &options)
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        assert_eq!(keys, ["alpine:3.18@linux/arm64", "ubuntu:22.04@linux/amd64"]);
    }

    #[test]
    fn images_resolving_to_one_key_are_scanned_once() {
        let options = AnalysisOptions {
            image_platform: Some("linux/amd64".into()),
            ..Default::default()
        };
        let images = [
            ImageReference::new("alpine", ""),
            ImageReference::new("alpine", "linux/amd64"),
            ImageReference::new("alpine", "linux/arm64"),
            ImageReference::new("alpine", ""),
        ];
        let targets = scan_targets(&images, &options);
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0], ("alpine@linux/amd64".to_owned(), &images[0]));
        assert_eq!(targets[1], ("alpine@linux/arm64".to_owned(), &images[2]));
    }

    #[tokio::test]
    async fn rejects_empty_image_list() {
        let err = BackendAnalyzer::new()
            .analyze(Vec::new(), AnalysisOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no analyzable base images"));
    }
}
