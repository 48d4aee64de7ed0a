pub mod analysis;
pub mod config;
pub mod error;
pub mod manifest;
pub mod orchestrator;
pub mod progress;
pub mod sbom;

pub use error::{Error, Result};
