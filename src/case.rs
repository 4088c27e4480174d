//! Case file parsing.
//!
//! A case file is a flat sequence of sections, each introduced by a
//! `--NAME--` marker line. [`parse_case`] turns the text into a [`CaseFile`]
//! without judging completeness; [`CaseSpec::new`] checks a parsed file
//! against the requirements of a [`Category`].

use crate::variant::Category;
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Component, Path};
use std::sync::LazyLock;

/// File key the `TEMPLATE` section is stored under.
pub const MAIN_TEMPLATE: &str = "main.tpl";

/// File key of the PHP entry script.
pub const MAIN_PHP: &str = "main.php";

static SECTION_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^--([^-]+)--\n").expect("section marker regex is valid"));

/// `FILE[name]` at the start of a section name; anything after the closing
/// bracket is ignored.
static FILE_SECTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^FILE\[([^\[]+)\]").expect("file section regex is valid"));

/// Error type for structurally broken case files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// `EXPECTED_RETCODE` did not hold an integer.
    InvalidReturnCode(String),
    /// A `FILE[]` marker with nothing between the brackets.
    EmptyFileName,
}

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ParseError::InvalidReturnCode(text) => {
                write!(f, "EXPECTED_RETCODE is not an integer: {text:?}")
            }
            ParseError::EmptyFileName => write!(f, "FILE[] section without a file name"),
        }
    }
}

impl std::error::Error for ParseError {}

/// A recognised section header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section<'a> {
    Template,
    File(&'a str),
    Arguments,
    Expected,
    ExpectedRetcode,
    Other(&'a str),
}

impl<'a> Section<'a> {
    fn from_name(name: &'a str) -> Result<Self, ParseError> {
        let section = match name {
            "TEMPLATE" => Section::Template,
            "ARGUMENTS" => Section::Arguments,
            "EXPECTED" => Section::Expected,
            "EXPECTED_RETCODE" => Section::ExpectedRetcode,
            _ if name.starts_with("FILE[]") => return Err(ParseError::EmptyFileName),
            _ => match FILE_SECTION.captures(name).and_then(|caps| caps.get(1)) {
                Some(file) => Section::File(file.as_str()),
                None => Section::Other(name),
            },
        };
        Ok(section)
    }
}

/// The raw contents of a case file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaseFile {
    /// Files to place in the sandbox, keyed by relative name.
    pub files: BTreeMap<String, String>,
    /// Extra command line arguments for the tool under test.
    pub arguments: Vec<String>,
    /// Expected transcript, if the file has an `EXPECTED` section.
    pub expected: Option<String>,
    /// Expected exit status (0 unless `EXPECTED_RETCODE` says otherwise).
    pub expected_retcode: i32,
    /// Sections the runner does not interpret.
    pub extra_sections: BTreeMap<String, String>,
}

/// Parse case file text.
///
/// Text before the first marker is ignored. Repeated sections overwrite
/// earlier ones.
pub fn parse_case(text: &str) -> Result<CaseFile, ParseError> {
    let mut case = CaseFile::default();
    let markers: Vec<_> = SECTION_MARKER.captures_iter(text).collect();

    for (i, caps) in markers.iter().enumerate() {
        let (Some(marker), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map_or(text.len(), |m| m.start());
        let contents = &text[marker.end()..end];

        match Section::from_name(name.as_str())? {
            Section::Template => {
                case.files
                    .insert(MAIN_TEMPLATE.to_string(), contents.to_string());
            }
            Section::File(file) => {
                case.files.insert(file.to_string(), contents.to_string());
            }
            Section::Arguments => case.arguments = split_arguments(contents),
            Section::Expected => case.expected = Some(contents.to_string()),
            Section::ExpectedRetcode => {
                let trimmed = contents.trim();
                case.expected_retcode = trimmed
                    .parse()
                    .map_err(|_| ParseError::InvalidReturnCode(trimmed.to_string()))?;
            }
            Section::Other(other) => {
                case.extra_sections
                    .insert(other.to_string(), contents.to_string());
            }
        }
    }

    Ok(case)
}

fn split_arguments(contents: &str) -> Vec<String> {
    let trimmed = contents.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }
    trimmed.split(' ').map(String::from).collect()
}

/// Why a parsed case cannot run in its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvalidCase {
    /// No `EXPECTED` section.
    MissingExpected,
    /// A file the category needs was not provided.
    MissingFile(&'static str),
    /// A file name that would land outside the sandbox.
    UnsafeFileName(String),
    /// One file would have to be a directory holding the other.
    ConflictingFileNames(String, String),
}

impl std::fmt::Display for InvalidCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidCase::MissingExpected => write!(f, "case has no EXPECTED section"),
            InvalidCase::MissingFile(name) => write!(f, "case does not provide {name}"),
            InvalidCase::UnsafeFileName(name) => {
                write!(f, "file name escapes the sandbox: {name}")
            }
            InvalidCase::ConflictingFileNames(file, nested) => {
                write!(f, "{file} is both a file and the directory of {nested}")
            }
        }
    }
}

impl std::error::Error for InvalidCase {}

/// A case that is complete for its category and ready to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaseSpec {
    pub files: BTreeMap<String, String>,
    pub arguments: Vec<String>,
    pub expected_output: String,
    pub expected_return_code: i32,
    pub extra_sections: BTreeMap<String, String>,
}

impl CaseSpec {
    /// Validate a parsed case file against `category`.
    pub fn new(case: CaseFile, category: Category) -> Result<Self, InvalidCase> {
        let expected_output = case.expected.ok_or(InvalidCase::MissingExpected)?;

        for required in category.required_files() {
            if !case.files.contains_key(*required) {
                return Err(InvalidCase::MissingFile(*required));
            }
        }

        if let Some(name) = case.files.keys().find(|name| !is_sandbox_relative(name)) {
            return Err(InvalidCase::UnsafeFileName(name.clone()));
        }

        for file in case.files.keys() {
            if let Some(nested) = case
                .files
                .keys()
                .find(|other| *other != file && Path::new(other).starts_with(file))
            {
                return Err(InvalidCase::ConflictingFileNames(file.clone(), nested.clone()));
            }
        }

        Ok(Self {
            files: case.files,
            arguments: case.arguments,
            expected_output,
            expected_return_code: case.expected_retcode,
            extra_sections: case.extra_sections,
        })
    }
}

fn is_sandbox_relative(name: &str) -> bool {
    let path = Path::new(name);
    path.components().next().is_some()
        && path
            .components()
            .all(|component| matches!(component, Component::Normal(_)))
}
