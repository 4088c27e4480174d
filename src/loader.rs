//! Case file and suite config loader.
//!
//! Finds `.test` files for each category and reads the optional suite
//! configuration from disk.

use crate::case::{CaseFile, ParseError, parse_case};
use crate::schema::SuiteConfig;
use crate::variant::Category;
use std::path::{Path, PathBuf};

/// Error type for loading operations.
#[derive(Debug)]
pub enum LoadError {
    /// Failed to read the file.
    Io(std::io::Error),
    /// Failed to parse YAML.
    Yaml(serde_yaml::Error),
    /// The case file is structurally broken.
    Parse(ParseError),
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Io(e) => write!(f, "failed to read file: {e}"),
            LoadError::Yaml(e) => write!(f, "invalid YAML: {e}"),
            LoadError::Parse(e) => write!(f, "malformed case file: {e}"),
        }
    }
}

impl std::error::Error for LoadError {}

/// The name of the suite configuration file.
pub const SUITE_CONFIG_FILENAME: &str = "b2test.yaml";

/// Extension of case files.
pub const CASE_EXTENSION: &str = "test";

/// Load and parse a case file.
pub fn load_case(path: &Path) -> Result<CaseFile, LoadError> {
    let contents = std::fs::read_to_string(path).map_err(LoadError::Io)?;
    parse_case(&contents).map_err(LoadError::Parse)
}

/// Load suite configuration from the cases directory.
///
/// Looks for `b2test.yaml` in the given directory.
/// Returns `None` if the file doesn't exist, `Err` if it exists but is invalid.
pub fn load_suite_config(dir: &Path) -> Result<Option<SuiteConfig>, LoadError> {
    let config_path = dir.join(SUITE_CONFIG_FILENAME);

    if !config_path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&config_path).map_err(LoadError::Io)?;
    let config: SuiteConfig = serde_yaml::from_str(&contents).map_err(LoadError::Yaml)?;
    Ok(Some(config))
}

/// Find the case files of `category` under `cases_dir`, sorted by path.
///
/// A missing category directory has no cases.
pub fn find_cases(cases_dir: &Path, category: Category) -> Result<Vec<PathBuf>, std::io::Error> {
    let dir = cases_dir.join(category.case_dir());
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let mut cases = Vec::new();
    for entry in std::fs::read_dir(&dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == CASE_EXTENSION) {
            cases.push(path);
        }
    }
    cases.sort();
    Ok(cases)
}
