use std::{fmt::Display, path::PathBuf};

use anyhow::{Context, Result};
use tracing::{error, info};

/// Payload handed to a [`ReportSink`] when a run fails.
pub const ERROR_MARKER: &str = "error";

#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum ProgressPhase {
    Analyzing,
    GeneratingOutput,
    Success,
    Failure,
}

impl ProgressPhase {
    pub fn message(self) -> &'static str {
        match self {
            ProgressPhase::Analyzing => "analyzing dependencies",
            ProgressPhase::GeneratingOutput => "generating output",
            ProgressPhase::Success => "success",
            ProgressPhase::Failure => "failure",
        }
    }
}

impl Display for ProgressPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Receives status updates while an analysis runs.
pub trait ProgressSink: Send + Sync {
    fn report(&self, phase: ProgressPhase);
}

/// Receives the final report, or [`ERROR_MARKER`] when the run failed.
pub trait ReportSink: Send + Sync {
    fn display(&self, payload: &str) -> Result<()>;
}

/// Progress sink that logs every phase.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn report(&self, phase: ProgressPhase) {
        match phase {
            ProgressPhase::Failure => error!("image analysis: {phase}"),
            _ => info!("image analysis: {phase}"),
        }
    }
}

/// Report sink writing the payload to a file, or to stdout without a path.
#[derive(Clone, Debug, Default)]
pub struct FileReport {
    pub path: Option<PathBuf>,
}

impl FileReport {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl ReportSink for FileReport {
    fn display(&self, payload: &str) -> Result<()> {
        let Some(path) = self.path.as_deref() else {
            println!("{payload}");
            return Ok(());
        };
        std::fs::write(path, payload)
            .with_context(|| format!("failed to write report to {}", path.to_string_lossy()))?;
        info!("wrote report to {}", path.to_string_lossy());
        Ok(())
    }
}
