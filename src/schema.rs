//! Suite configuration schema.
//!
//! `b2test.yaml` in the cases directory supplies defaults for a run.
//! Command line flags take precedence over every field here.

use crate::variant::Category;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Suite-level configuration loaded from `b2test.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SuiteConfig {
    /// PHP interpreter to use instead of searching `PATH`.
    #[serde(default)]
    pub php: Option<PathBuf>,

    /// Executable name of the JS precompiler.
    #[serde(default)]
    pub js_precompiler: Option<String>,

    /// Categories to run (all when empty).
    #[serde(default)]
    pub categories: Vec<Category>,

    /// Directory for case sandboxes. When not set, uses the system temp directory.
    #[serde(default)]
    pub sandbox_dir: Option<PathBuf>,

    /// Run the cases of each category in parallel (default: false).
    #[serde(default)]
    pub parallel: bool,
}
