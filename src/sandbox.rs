//! Per-case scratch directories.
//!
//! A [`Sandbox`] owns a fresh temporary directory holding one case's files.
//! The directory and everything in it is removed when the sandbox is dropped,
//! so every exit path out of a case cleans up.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Error type for sandbox preparation.
#[derive(Debug)]
pub struct SandboxError {
    /// What was being written or created.
    pub path: PathBuf,
    pub source: std::io::Error,
}

impl std::fmt::Display for SandboxError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to prepare sandbox at {}: {}", self.path.display(), self.source)
    }
}

impl std::error::Error for SandboxError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// An exclusively owned temporary directory populated with case files.
#[derive(Debug)]
pub struct Sandbox {
    dir: tempfile::TempDir,
}

impl Sandbox {
    /// Create a sandbox under `root` (or the system temp dir) and write `files` into it.
    pub fn create(files: &BTreeMap<String, String>, root: Option<&Path>) -> Result<Self, SandboxError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("b2test-");
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root).map_err(|source| SandboxError {
                    path: root.to_path_buf(),
                    source,
                })?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        }
        .map_err(|source| SandboxError {
            path: root.map_or_else(std::env::temp_dir, Path::to_path_buf),
            source,
        })?;

        let sandbox = Self { dir };
        for (name, contents) in files {
            sandbox.write_file(name, contents)?;
        }
        Ok(sandbox)
    }

    /// The sandbox directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    fn write_file(&self, name: &str, contents: &str) -> Result<(), SandboxError> {
        let path = self.path().join(name);
        if let Some(parent) = path.parent()
            && parent != self.path()
        {
            std::fs::create_dir_all(parent).map_err(|source| SandboxError {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        std::fs::write(&path, contents).map_err(|source| SandboxError { path, source })
    }
}

/// Run `body` inside a sandbox holding `files`.
///
/// The sandbox is removed once `body` returns or unwinds.
pub fn with_sandbox<T>(
    files: &BTreeMap<String, String>,
    root: Option<&Path>,
    body: impl FnOnce(&Path) -> T,
) -> Result<T, SandboxError> {
    let sandbox = Sandbox::create(files, root)?;
    Ok(body(sandbox.path()))
}
