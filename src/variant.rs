//! Toolchain variants.
//!
//! Each [`Category`] of cases targets one build artifact. A [`Variant`] is a
//! category whose tools have been located, and knows how to turn a case into
//! a command line.

use crate::case::{MAIN_PHP, MAIN_TEMPLATE};
use serde::{Deserialize, Serialize};
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};

/// Default executable name of the JS precompiler.
pub const DEFAULT_JS_PRECOMPILER: &str = "b2-js-precompiler";

/// Executable name of the AST printer.
const AST_PRINT: &str = "ast_print";

/// Category of a case, fixed by the directory its file lives in.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    /// AST dumps from `ast_print`.
    Parser,
    /// Scripts run through PHP with the extension loaded.
    PhpBinding,
    /// Output of the JS precompiler.
    JsPrecompiler,
}

impl Category {
    /// All categories, in run order.
    pub const ALL: [Category; 3] = [
        Category::Parser,
        Category::PhpBinding,
        Category::JsPrecompiler,
    ];

    /// Subdirectory of the cases directory holding this category's `.test` files.
    pub fn case_dir(self) -> &'static str {
        match self {
            Category::Parser => "parser",
            Category::PhpBinding => "php_binding",
            Category::JsPrecompiler => "js_precompiler",
        }
    }

    /// Files every case of this category must provide.
    pub fn required_files(self) -> &'static [&'static str] {
        match self {
            Category::Parser | Category::JsPrecompiler => &[MAIN_TEMPLATE],
            Category::PhpBinding => &[MAIN_TEMPLATE, MAIN_PHP],
        }
    }

    /// Name used in reports.
    pub fn name(self) -> &'static str {
        match self {
            Category::Parser => "parser",
            Category::PhpBinding => "php-binding",
            Category::JsPrecompiler => "js-precompiler",
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Error returned when a required tool cannot be found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryError {
    /// What was being looked for.
    pub what: String,
    /// Every path that was checked, in order.
    pub searched: Vec<PathBuf>,
}

impl std::fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "couldn't find {}", self.what)?;
        if self.searched.is_empty() {
            return write!(f, " (nothing to search)");
        }
        write!(f, "; searched:")?;
        for path in &self.searched {
            write!(f, "\n  {}", path.display())?;
        }
        Ok(())
    }
}

impl std::error::Error for DiscoveryError {}

/// Inputs to tool discovery beyond the build directory.
#[derive(Debug, Clone)]
pub struct DiscoveryOptions {
    /// Explicit PHP interpreter; searched for on the search path otherwise.
    pub php: Option<PathBuf>,
    /// Executable name of the JS precompiler.
    pub js_precompiler: String,
    /// Search path used when a tool is not in the build directory.
    pub search_path: Option<OsString>,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            php: None,
            js_precompiler: DEFAULT_JS_PRECOMPILER.to_string(),
            search_path: std::env::var_os("PATH"),
        }
    }
}

/// The resolved tool a category invokes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Tool {
    /// A standalone executable taking `-t <basepath> ... <template>`.
    Executable(PathBuf),
    /// A PHP interpreter plus the extension it must load.
    Php {
        interpreter: PathBuf,
        extension: PathBuf,
    },
}

/// A category with its tools located.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    pub category: Category,
    pub tool: Tool,
}

impl Variant {
    /// Locate the tools `category` needs under `build_path`.
    pub fn discover(
        category: Category,
        build_path: &Path,
        options: &DiscoveryOptions,
    ) -> Result<Self, DiscoveryError> {
        let src = build_path.join("src");
        let search_path = options.search_path.as_deref();
        let tool = match category {
            Category::Parser => {
                Tool::Executable(find_executable(AST_PRINT, &src.join("ast_print"), search_path)?)
            }
            Category::JsPrecompiler => Tool::Executable(find_executable(
                &options.js_precompiler,
                &src.join("js_precompiler"),
                search_path,
            )?),
            Category::PhpBinding => {
                let extension = find_file(&php_extension_names(), &src.join("php"))?;
                let interpreter = match &options.php {
                    Some(php) if is_executable(php) => php.clone(),
                    Some(php) => {
                        return Err(DiscoveryError {
                            what: "the configured PHP interpreter".to_string(),
                            searched: vec![php.clone()],
                        });
                    }
                    None => find_on_path("php", search_path)?,
                };
                Tool::Php {
                    interpreter,
                    extension,
                }
            }
        };
        Ok(Self { category, tool })
    }

    /// Command line running a case whose files live in `sandbox`.
    pub fn command_line(&self, sandbox: &Path, arguments: &[String]) -> Vec<OsString> {
        let mut argv: Vec<OsString> = Vec::with_capacity(arguments.len() + 5);
        match &self.tool {
            Tool::Executable(exe) => {
                argv.push(exe.into());
                argv.push("-t".into());
                argv.push(sandbox.into());
                argv.extend(arguments.iter().map(OsString::from));
                argv.push(sandbox.join(MAIN_TEMPLATE).into());
            }
            Tool::Php {
                interpreter,
                extension,
            } => {
                let mut extension_arg = OsString::from("extension=");
                extension_arg.push(extension);
                argv.push(interpreter.into());
                argv.push("-d".into());
                argv.push(extension_arg);
                argv.push("-f".into());
                argv.push(sandbox.join(MAIN_PHP).into());
                argv.extend(arguments.iter().map(OsString::from));
            }
        }
        argv
    }

    /// Paths of the tools this variant runs, for diagnostics.
    pub fn describe(&self) -> String {
        match &self.tool {
            Tool::Executable(exe) => exe.display().to_string(),
            Tool::Php {
                interpreter,
                extension,
            } => format!("{} (extension {})", interpreter.display(), extension.display()),
        }
    }
}

/// Candidate file names of the PHP extension, the current platform's first.
pub fn php_extension_names() -> Vec<&'static str> {
    let native = if cfg!(target_os = "macos") {
        "libb2_php.dylib"
    } else if cfg!(windows) {
        "b2_php.dll"
    } else {
        "libb2_php.so"
    };
    let mut names = vec![native];
    names.extend(
        ["libb2_php.dylib", "libb2_php.so", "b2_php.dll"]
            .into_iter()
            .filter(|name| *name != native),
    );
    names
}

/// Return the first of `names` that exists as a file in `dir`.
pub fn find_file(names: &[&str], dir: &Path) -> Result<PathBuf, DiscoveryError> {
    let candidates: Vec<PathBuf> = names.iter().map(|name| dir.join(name)).collect();
    match candidates.iter().find(|path| path.is_file()) {
        Some(found) => Ok(found.clone()),
        None => Err(DiscoveryError {
            what: format!("any of {names:?}"),
            searched: candidates,
        }),
    }
}

/// Look for executable `name` in `dir`, then on `search_path`.
pub fn find_executable(
    name: &str,
    dir: &Path,
    search_path: Option<&OsStr>,
) -> Result<PathBuf, DiscoveryError> {
    let local = dir.join(executable_name(name));
    if is_executable(&local) {
        return Ok(local);
    }
    find_on_path(name, search_path).map_err(|mut err| {
        err.searched.insert(0, local);
        err
    })
}

fn find_on_path(name: &str, search_path: Option<&OsStr>) -> Result<PathBuf, DiscoveryError> {
    let file_name = executable_name(name);
    let candidates: Vec<PathBuf> = search_path
        .map(|paths| {
            std::env::split_paths(paths)
                .filter(|dir| !dir.as_os_str().is_empty())
                .map(|dir| dir.join(&file_name))
                .collect()
        })
        .unwrap_or_default();
    match candidates.iter().find(|path| is_executable(path)) {
        Some(found) => Ok(found.clone()),
        None => Err(DiscoveryError {
            what: format!("executable {name:?}"),
            searched: candidates,
        }),
    }
}

fn executable_name(name: &str) -> String {
    format!("{name}{}", std::env::consts::EXE_SUFFIX)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path).is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}
