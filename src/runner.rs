//! Case execution engine.
//!
//! Runs each case in its own sandbox, captures the combined transcript of
//! the tool under test and compares it against the expectation.

use crate::case::{CaseSpec, InvalidCase};
use crate::loader::{self, LoadError};
use crate::sandbox::{SandboxError, with_sandbox};
use crate::variant::{Category, Variant};
use std::ffi::OsString;
use std::fmt::Write as _;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

/// Transcript prefix a tool prints to ask for its case to be skipped.
pub const SKIP_MARKER: &str = "SKIP_TEST";

/// Settings shared by every case in a run.
#[derive(Debug, Clone)]
pub struct RunSettings {
    /// Where sandboxes are created; system temp dir when unset.
    pub sandbox_dir: Option<PathBuf>,
    /// Treat a leading `SKIP_TEST` in the transcript as a skip request.
    pub allow_skipping: bool,
    /// Run the cases of a category on separate threads.
    pub parallel: bool,
    /// Log command lines to stderr.
    pub verbose: bool,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            sandbox_dir: None,
            allow_skipping: true,
            parallel: false,
            verbose: false,
        }
    }
}

/// Result of running a single case.
#[derive(Debug, serde::Serialize)]
pub struct CaseResult {
    pub name: String,
    pub file: PathBuf,
    pub category: Category,
    #[serde(flatten)]
    pub outcome: Outcome,
    #[serde(serialize_with = "serialize_duration")]
    pub duration: Duration,
}

impl CaseResult {
    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, Outcome::Failed(_))
    }
}

fn serialize_duration<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_f64(duration.as_secs_f64())
}

/// How a case ended.
#[derive(Debug, serde::Serialize)]
#[serde(tag = "status", content = "message", rename_all = "snake_case")]
pub enum Outcome {
    Passed,
    Failed(Failure),
    Skipped(String),
}

/// Why a case failed.
#[derive(Debug)]
pub enum Failure {
    /// The case file could not be read or parsed.
    Load(LoadError),
    /// The case is incomplete for its category.
    Invalid(InvalidCase),
    /// The tool was found but could not be run.
    Spawn(String),
    /// The tool exited with the wrong status.
    ExitCode {
        command: String,
        actual: Option<i32>,
        signal: Option<i32>,
        expected: i32,
        output: String,
    },
    /// The transcript differs from `EXPECTED`.
    OutputMismatch { expected: String, actual: String },
}

impl std::fmt::Display for Failure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Failure::Load(e) => write!(f, "failed to load case: {e}"),
            Failure::Invalid(e) => write!(f, "invalid case: {e}"),
            Failure::Spawn(e) => write!(f, "{e}"),
            Failure::ExitCode {
                command,
                actual,
                signal,
                expected,
                output,
            } => {
                let status = match (actual, signal) {
                    (Some(code), _) => format!("exit status {code}"),
                    (None, Some(signal)) => format!("termination by signal {signal}"),
                    (None, None) => "termination without an exit status".to_string(),
                };
                write!(
                    f,
                    "command {command} returned {status}, expected {expected}. Output:\n{output}"
                )
            }
            Failure::OutputMismatch { expected, actual } => {
                writeln!(f, "output differs from EXPECTED (-expected +actual):")?;
                if expected == actual {
                    writeln!(f, "(output is not valid UTF-8; shown with replacement characters)")?;
                }
                f.write_str(&render_diff(expected, actual))
            }
        }
    }
}

impl serde::Serialize for Failure {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

/// Line diff of two transcripts, one marker character per line.
pub fn render_diff(expected: &str, actual: &str) -> String {
    let changeset = difference::Changeset::new(expected, actual, "\n");
    let mut out = String::new();
    for diff in &changeset.diffs {
        let (marker, text) = match diff {
            difference::Difference::Same(text) => (' ', text),
            difference::Difference::Rem(text) => ('-', text),
            difference::Difference::Add(text) => ('+', text),
        };
        for line in text.split('\n') {
            let _ = writeln!(out, "{marker} {line:?}");
        }
    }
    out
}

/// What a finished process left behind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code if the process exited normally.
    pub exit_code: Option<i32>,
    /// Signal number if the process was killed by one (unix only).
    pub signal: Option<i32>,
    /// Standard output and standard error, interleaved as written.
    pub transcript: Vec<u8>,
}

/// Run `argv` to completion with stdout and stderr merged into one pipe.
pub fn run_command(argv: &[OsString]) -> Result<CommandOutput, String> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| "empty command line".to_string())?;

    let (mut reader, writer) =
        std::io::pipe().map_err(|e| format!("Failed to create pipe: {e}"))?;
    let stderr = writer
        .try_clone()
        .map_err(|e| format!("Failed to create pipe: {e}"))?;

    // The command owns our copies of the write end; it must be gone before
    // reading or the pipe never reaches EOF.
    let mut child = {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(writer)
            .stderr(stderr);
        cmd.spawn()
            .map_err(|e| format!("Failed to spawn {}: {e}", program.to_string_lossy()))?
    };

    let mut raw = Vec::new();
    let read = reader.read_to_end(&mut raw);
    let status = child
        .wait()
        .map_err(|e| format!("Failed to wait: {e}"))?;
    read.map_err(|e| format!("Failed to read output: {e}"))?;

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        status.signal()
    };
    #[cfg(not(unix))]
    let signal = None;

    Ok(CommandOutput {
        exit_code: status.code(),
        signal,
        transcript: raw,
    })
}

/// The skip reason carried by `transcript`, if it is a skip request.
///
/// The marker must stand alone or be followed by `:` or whitespace, so
/// `SKIP_TESTING` is ordinary output.
pub fn skip_reason(transcript: &str) -> Option<&str> {
    let trimmed = transcript.trim();
    let rest = trimmed.strip_prefix(SKIP_MARKER)?;
    if !(rest.is_empty() || rest.starts_with(':') || rest.starts_with(char::is_whitespace)) {
        return None;
    }
    Some(match trimmed.strip_prefix("SKIP_TEST: ") {
        Some(reason) => reason,
        None => rest.trim_start_matches(|c: char| c == ':' || c.is_whitespace()),
    })
}

/// Judge a finished process against a case.
pub fn evaluate(
    spec: &CaseSpec,
    command: &str,
    output: &CommandOutput,
    allow_skipping: bool,
) -> Outcome {
    if output.exit_code != Some(spec.expected_return_code) {
        return Outcome::Failed(Failure::ExitCode {
            command: command.to_string(),
            actual: output.exit_code,
            signal: output.signal,
            expected: spec.expected_return_code,
            output: String::from_utf8_lossy(&output.transcript).into_owned(),
        });
    }

    if allow_skipping
        && let Ok(text) = std::str::from_utf8(&output.transcript)
        && let Some(reason) = skip_reason(text)
    {
        return Outcome::Skipped(reason.to_string());
    }

    // Byte comparison; lossy text is only for display.
    if output.transcript != spec.expected_output.as_bytes() {
        return Outcome::Failed(Failure::OutputMismatch {
            expected: spec.expected_output.clone(),
            actual: String::from_utf8_lossy(&output.transcript).into_owned(),
        });
    }

    Outcome::Passed
}

/// Display name of a case file (its stem).
pub fn case_name(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn display_command(argv: &[OsString]) -> String {
    argv.iter()
        .map(|arg| arg.to_string_lossy())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Load, validate and run one case file.
///
/// Only sandbox preparation errors escape; everything else is an outcome.
pub fn run_case(
    path: &Path,
    variant: &Variant,
    settings: &RunSettings,
) -> Result<CaseResult, SandboxError> {
    let start = Instant::now();

    let outcome = match prepare_case(path, variant.category) {
        Err(failure) => Outcome::Failed(failure),
        Ok(spec) => with_sandbox(&spec.files, settings.sandbox_dir.as_deref(), |dir| {
            let argv = variant.command_line(dir, &spec.arguments);
            let command = display_command(&argv);
            if settings.verbose {
                eprintln!("[{}] {command}", variant.category);
                if !spec.extra_sections.is_empty() {
                    let names: Vec<_> = spec.extra_sections.keys().map(String::as_str).collect();
                    eprintln!("  ignoring sections: {}", names.join(", "));
                }
            }
            match run_command(&argv) {
                Ok(output) => evaluate(&spec, &command, &output, settings.allow_skipping),
                Err(e) => Outcome::Failed(Failure::Spawn(e)),
            }
        })?,
    };

    Ok(CaseResult {
        name: case_name(path),
        file: path.to_path_buf(),
        category: variant.category,
        outcome,
        duration: start.elapsed(),
    })
}

fn prepare_case(path: &Path, category: Category) -> Result<CaseSpec, Failure> {
    let case = loader::load_case(path).map_err(Failure::Load)?;
    CaseSpec::new(case, category).map_err(Failure::Invalid)
}

/// Run every case of one category, returning results in input order.
pub fn run_category(
    variant: &Variant,
    cases: &[PathBuf],
    settings: &RunSettings,
) -> Result<Vec<CaseResult>, SandboxError> {
    if !settings.parallel {
        return cases
            .iter()
            .map(|path| run_case(path, variant, settings))
            .collect();
    }

    thread::scope(|s| {
        let handles: Vec<_> = cases
            .iter()
            .map(|path| s.spawn(move || run_case(path, variant, settings)))
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().expect("Case thread panicked"))
            .collect()
    })
}
