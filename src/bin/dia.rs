use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use dockerfile_image_analysis::{
    analysis::BackendAnalyzer,
    config::{Cli, Config},
    orchestrator::execute_image_analysis,
    progress::{FileReport, TracingProgress},
};
use tracing::info;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // stdout carries the report
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let cli = Cli::parse();

    info!("Reading config");
    let config = Config::load(cli.config.as_deref())?;

    let report = FileReport::new(cli.output.or(config.report_path));
    let analyzer = Arc::new(BackendAnalyzer::new());

    info!("Analyzing base images of {}", cli.manifest.to_string_lossy());
    execute_image_analysis(
        &cli.manifest,
        &config.analysis,
        analyzer,
        &TracingProgress,
        &report,
    )
    .await?;

    Ok(())
}
