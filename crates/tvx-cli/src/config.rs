//! JSON options files.
//!
//! A file may hold any subset of the sections below; missing sections and
//! fields take their defaults. Command-line flags are applied on top.
//!
//! ```json
//! {
//!   "ingest": { "fractional": "round" },
//!   "expose": { "overlap": { "priority": [2, 1] }, "grace": { "default": 30 } },
//!   "event": { "kind": "recurring" }
//! }
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tvx_ingest::IngestOptions;
use tvx_model::{EventOptions, ExposeOptions, MergeOptions};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RunConfig {
    pub ingest: IngestOptions,
    pub expose: ExposeOptions,
    pub merge: MergeOptions,
    pub event: EventOptions,
}

impl RunConfig {
    /// Defaults, or the contents of `path` when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        let config: Self = serde_json::from_str(&text)
            .with_context(|| format!("parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded options file");
        Ok(config)
    }
}
