//! Drives one analysis run: parse the manifest, hand its images to the analysis capability and
//! forward the outcome to the progress and report sinks.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, error, warn};

use crate::{
    analysis::ImageAnalyzer,
    config::AnalysisOptions,
    error::{Error, Result},
    manifest::{read_manifest, ImageReference},
    progress::{ProgressPhase, ProgressSink, ReportSink, ERROR_MARKER},
};

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Parsing,
    AwaitingAnalysis,
    Success,
    Failure,
}

/// A single analysis run for one manifest. Build a fresh one per run.
#[derive(Debug)]
pub struct ImageAnalysis {
    manifest_path: PathBuf,
    options: AnalysisOptions,
    images: Vec<ImageReference>,
    state: RunState,
}

impl ImageAnalysis {
    /// Takes a snapshot of `options`; later changes to them don't affect this run.
    pub fn new(manifest_path: impl Into<PathBuf>, options: &AnalysisOptions) -> Self {
        Self {
            manifest_path: manifest_path.into(),
            options: options.clone(),
            images: Vec::new(),
            state: RunState::Idle,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn images(&self) -> &[ImageReference] {
        &self.images
    }

    /// Run the analysis and return the report.
    ///
    /// The analysis call runs on its own task, so dropping this future doesn't abort it.
    /// Failures of the call or of showing the report are reported as [`ProgressPhase::Failure`];
    /// showing an error to the user is left to the caller.
    pub async fn run(
        &mut self,
        analyzer: Arc<dyn ImageAnalyzer>,
        progress: &dyn ProgressSink,
        report: &dyn ReportSink,
    ) -> Result<String> {
        self.state = RunState::Parsing;
        self.images = match read_manifest(&self.manifest_path).await {
            Ok(images) => images,
            Err(e) => {
                self.state = RunState::Failure;
                return Err(e);
            }
        };

        self.state = RunState::AwaitingAnalysis;
        progress.report(ProgressPhase::Analyzing);
        debug!(
            images = self.images.len(),
            options = ?self.options.entries(),
            "starting image analysis"
        );

        let images = self.images.clone();
        let options = self.options.clone();
        let call = tokio::spawn(async move { analyzer.analyze(images, options).await });

        let payload = match call.await {
            Ok(Ok(payload)) => payload,
            Ok(Err(e)) => return Err(self.fail(progress, Error::Analysis(e))),
            Err(e) => return Err(self.fail(progress, Error::Unexpected(e.to_string()))),
        };

        progress.report(ProgressPhase::GeneratingOutput);
        if let Err(e) = report.display(&payload) {
            return Err(self.fail(progress, Error::Unexpected(format!("{e:#}"))));
        }
        progress.report(ProgressPhase::Success);
        self.state = RunState::Success;
        Ok(payload)
    }

    fn fail(&mut self, progress: &dyn ProgressSink, error: Error) -> Error {
        progress.report(ProgressPhase::Failure);
        self.state = RunState::Failure;
        error
    }
}

/// Analyze the base images of the manifest at `manifest_path`.
///
/// Every failure shows [`ERROR_MARKER`] on `report` exactly once and is then returned.
pub async fn execute_image_analysis(
    manifest_path: &Path,
    options: &AnalysisOptions,
    analyzer: Arc<dyn ImageAnalyzer>,
    progress: &dyn ProgressSink,
    report: &dyn ReportSink,
) -> Result<String> {
    let mut analysis = ImageAnalysis::new(manifest_path, options);
    let result = analysis.run(analyzer, progress, report).await;
    if let Err(e) = &result {
        error!(error = %e, "image analysis of {} failed", manifest_path.to_string_lossy());
        if let Err(display_error) = report.display(ERROR_MARKER) {
            warn!("failed to show error marker: {display_error:#}");
        }
    }
    result
}
