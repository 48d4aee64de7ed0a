use std::path::PathBuf;

use thiserror::Error;

/// Failure kinds of a single image analysis run.
#[derive(Error, Debug)]
pub enum Error {
    /// The manifest could not be read as UTF-8 text.
    #[error("failed to read manifest {}", path.to_string_lossy())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The analysis capability rejected the request.
    #[error("image analysis failed")]
    Analysis(#[source] anyhow::Error),
    /// Anything else that went wrong, such as a crashed analysis task or an unwritable report.
    #[error("unexpected failure during image analysis: {0}")]
    Unexpected(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
