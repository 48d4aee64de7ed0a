//! Extraction of base image references from Dockerfile-style manifests.
//!
//! Only `ARG` and `FROM` lines are interpreted. Every other instruction is ignored, and no
//! attempt is made to validate the manifest beyond what is needed to find its base images.

use std::{collections::HashMap, fmt::Display, path::Path, sync::OnceLock};

use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

/// Name of the empty synthetic base image, which has nothing to analyze.
pub const SCRATCH_IMAGE: &str = "scratch";

static ARG_LINE: OnceLock<Regex> = OnceLock::new();
static FROM_LINE: OnceLock<Regex> = OnceLock::new();
static PLATFORM_FLAG: OnceLock<Regex> = OnceLock::new();
static STAGE_ALIAS: OnceLock<Regex> = OnceLock::new();
static VARIABLE: OnceLock<Regex> = OnceLock::new();

fn arg_line() -> &'static Regex {
    ARG_LINE.get_or_init(|| Regex::new(r"(?i)^\s*ARG\s+(.*)$").expect("valid ARG regex"))
}

fn from_line() -> &'static Regex {
    FROM_LINE.get_or_init(|| Regex::new(r"(?i)^\s*FROM\s+(.*)$").expect("valid FROM regex"))
}

fn platform_flag() -> &'static Regex {
    PLATFORM_FLAG
        .get_or_init(|| Regex::new(r"--platform=(\S*)").expect("valid platform flag regex"))
}

fn stage_alias() -> &'static Regex {
    STAGE_ALIAS
        .get_or_init(|| Regex::new(r"(?i)\s+AS\s+\S+\s*$").expect("valid stage alias regex"))
}

fn variable() -> &'static Regex {
    VARIABLE.get_or_init(|| Regex::new(r"\$\{([^{}]*)\}").expect("valid variable regex"))
}

/// A base image named by a `FROM` line, after substitution and cleanup.
#[derive(Clone, Debug, Hash, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageReference {
    pub image: String,
    /// Value of the `--platform` flag, empty when the line has none.
    #[serde(default)]
    pub platform: String,
}

impl ImageReference {
    pub fn new(image: impl Into<String>, platform: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            platform: platform.into(),
        }
    }
}

impl Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.platform.is_empty() {
            write!(f, "{}", self.image)
        } else {
            write!(f, "{} ({})", self.image, self.platform)
        }
    }
}

/// Build arguments seen so far while walking a manifest top to bottom.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArgumentTable {
    values: HashMap<String, String>,
}

impl ArgumentTable {
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Later assignments for the same name replace earlier ones.
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Replace every `${name}` with its current value, or nothing when unknown.
    pub fn substitute(&self, text: &str) -> String {
        variable()
            .replace_all(text, |caps: &Captures| {
                self.get(&caps[1]).unwrap_or_default().to_owned()
            })
            .into_owned()
    }

    /// Record the assignment of an `ARG` instruction body such as `VERSION=1.0`.
    ///
    /// Declarations without a value leave the table untouched.
    fn assign(&mut self, declaration: &str) {
        let Some((name, value)) = declaration.split_once('=') else {
            return;
        };
        let name = name.trim();
        if name.is_empty() {
            return;
        }
        self.set(name, unquote(value.trim()));
    }
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if let Some(inner) = value
            .strip_prefix(quote)
            .and_then(|rest| rest.strip_suffix(quote))
        {
            return inner;
        }
    }
    value
}

/// Interpret a single manifest line.
///
/// `ARG` lines update `args`. `FROM` lines produce the image they name, resolved against the
/// arguments known at this point. Scratch images and lines naming nothing produce `None`.
/// Both keywords are anchored at the start of the line, so at most one of them applies.
pub fn interpret_line(line: &str, args: &mut ArgumentTable) -> Option<ImageReference> {
    let line = line.strip_suffix('\r').unwrap_or(line);

    if let Some(caps) = arg_line().captures(line) {
        args.assign(&caps[1]);
        return None;
    }

    let caps = from_line().captures(line)?;
    let platform = platform_flag()
        .captures(line)
        .map(|caps| caps[1].to_owned())
        .unwrap_or_default();

    let substituted = args.substitute(&caps[1]);
    let without_platform = platform_flag().replace_all(&substituted, "");
    let without_alias = stage_alias().replace(&without_platform, "");
    let image = without_alias.trim();

    if image.is_empty() || image == SCRATCH_IMAGE {
        return None;
    }

    Some(ImageReference::new(image, platform))
}

/// Collect the base images of a manifest in document order, duplicates included.
pub fn collect_images(text: &str) -> Vec<ImageReference> {
    let mut args = ArgumentTable::default();
    text.split('\n')
        .filter_map(|line| interpret_line(line, &mut args))
        .collect()
}

/// Read a manifest from disk and collect its base images.
#[tracing::instrument]
pub async fn read_manifest(path: &Path) -> Result<Vec<ImageReference>> {
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| Error::Read {
            path: path.to_owned(),
            source,
        })?;
    let images = collect_images(&text);
    debug!(count = images.len(), "collected base images");
    Ok(images)
}
