//! End-to-end tests driving the b2test binary against a fake build tree.
//!
//! The fake tools treat the case's `main.tpl` (or `main.php`) as a shell
//! script, so each case decides what its tool prints and how it exits.
#![cfg(unix)]

use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn b2test_cmd() -> Command {
    Command::new(env!("CARGO_BIN_EXE_b2test"))
}

/// `<tool> -t <dir> [args...] <dir>/main.tpl`: prints each extra argument, then runs the template.
const FAKE_TEMPLATE_TOOL: &str = r#"#!/bin/sh
[ "$1" = "-t" ] || { echo "expected -t, got $1"; exit 90; }
dir="$2"
shift 2
for last; do :; done
[ "$last" = "$dir/main.tpl" ] || { echo "unexpected template path $last"; exit 91; }
for a; do [ "$a" = "$last" ] || printf 'arg:%s\n' "$a"; done
. "$last"
"#;

/// `php -d extension=<ext> -f <dir>/main.php [args...]`: runs main.php with the extra arguments.
const FAKE_PHP: &str = r#"#!/bin/sh
[ "$1" = "-d" ] || { echo "expected -d"; exit 90; }
ext="${2#extension=}"
[ -f "$ext" ] || { echo "missing extension $ext"; exit 91; }
[ "$3" = "-f" ] || { echo "expected -f"; exit 92; }
script="$4"
shift 4
. "$script"
"#;

fn write_executable(path: &Path, contents: &str) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

struct Fixture {
    root: TempDir,
}

impl Fixture {
    fn new() -> Self {
        let root = TempDir::new().unwrap();
        fs::create_dir_all(root.path().join("build")).unwrap();
        fs::create_dir_all(root.path().join("cases")).unwrap();
        Self { root }
    }

    /// A fixture with all three artifacts present.
    fn complete() -> Self {
        let fixture = Self::new();
        fixture.with_ast_print().with_php_extension().with_js_precompiler();
        write_executable(&fixture.bin().join("php"), FAKE_PHP);
        fixture
    }

    fn build(&self) -> PathBuf {
        self.root.path().join("build")
    }

    fn cases(&self) -> PathBuf {
        self.root.path().join("cases")
    }

    fn bin(&self) -> PathBuf {
        self.root.path().join("bin")
    }

    fn with_ast_print(&self) -> &Self {
        write_executable(&self.build().join("src/ast_print/ast_print"), FAKE_TEMPLATE_TOOL);
        self
    }

    fn with_js_precompiler(&self) -> &Self {
        write_executable(
            &self.build().join("src/js_precompiler/b2-js-precompiler"),
            FAKE_TEMPLATE_TOOL,
        );
        self
    }

    fn with_php_extension(&self) -> &Self {
        let dir = self.build().join("src/php");
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("libb2_php.so"), "").unwrap();
        self
    }

    fn case(&self, category_dir: &str, name: &str, contents: &str) -> &Self {
        let dir = self.cases().join(category_dir);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(format!("{name}.test")), contents).unwrap();
        self
    }

    fn command(&self) -> Command {
        let mut cmd = b2test_cmd();
        let path = format!(
            "{}:{}",
            self.bin().display(),
            std::env::var("PATH").unwrap_or_default()
        );
        cmd.env("PATH", path)
            .arg(self.build())
            .arg("--cases")
            .arg(self.cases());
        cmd
    }

    fn run(&self, extra: &[&str]) -> Output {
        self.command().args(extra).output().unwrap()
    }
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn describe(output: &Output) -> String {
    format!("stdout: {}\nstderr: {}", stdout(output), stderr(output))
}

#[test]
fn all_categories_pass() {
    let fixture = Fixture::complete();
    fixture
        .case(
            "parser",
            "print",
            "--TEMPLATE--\necho 'PrintBlock(x)'\n--EXPECTED--\nPrintBlock(x)\n",
        )
        .case(
            "php_binding",
            "render",
            "--TEMPLATE--\nunused\n--FILE[main.php]--\necho \"rendered $1\"\n--ARGUMENTS--\nfoo\n--EXPECTED--\nrendered foo\n",
        )
        .case(
            "js_precompiler",
            "compile",
            "--TEMPLATE--\necho 'function(){}'\n--ARGUMENTS--\n-x -y\n--EXPECTED--\narg:-x\narg:-y\nfunction(){}\n",
        );

    let output = fixture.run(&[]);
    assert!(output.status.success(), "{}", describe(&output));

    let text = stdout(&output);
    assert!(text.contains("✓ print"), "{text}");
    assert!(text.contains("✓ render"), "{text}");
    assert!(text.contains("✓ compile"), "{text}");
    assert!(text.contains("3 passed, 0 failed, 0 skipped"), "{text}");
}

#[test]
fn output_mismatch_fails_the_run() {
    let fixture = Fixture::complete();
    fixture.case(
        "parser",
        "newline",
        "--TEMPLATE--\nprintf Hello\n--EXPECTED--\nHello\n",
    );

    let output = fixture.run(&[]);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));

    let text = stdout(&output);
    assert!(text.contains("✗ newline"), "{text}");
    assert!(text.contains("0 passed, 1 failed, 0 skipped"), "{text}");
}

#[test]
fn exit_code_expectations() {
    let fixture = Fixture::complete();
    fixture
        .case(
            "parser",
            "expected_error",
            "--TEMPLATE--\necho 'Syntax error'; exit 1\n--EXPECTED--\nSyntax error\n--EXPECTED_RETCODE--\n1\n",
        )
        .case(
            "parser",
            "unexpected_error",
            "--TEMPLATE--\necho 'crashed' >&2; exit 3\n--EXPECTED--\n\n",
        );

    let output = fixture.run(&["--category", "parser"]);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));

    let text = stdout(&output);
    assert!(text.contains("✓ expected_error"), "{text}");
    assert!(text.contains("✗ unexpected_error"), "{text}");
    assert!(text.contains("returned exit status 3, expected 0"), "{text}");
    assert!(text.contains("crashed"), "{text}");
}

#[test]
fn skipped_cases_do_not_fail_the_run() {
    let fixture = Fixture::complete();
    fixture
        .case(
            "php_binding",
            "needs_php7",
            "--TEMPLATE--\nx\n--FILE[main.php]--\necho 'SKIP_TEST: need php7'\n--EXPECTED--\nnever compared\n",
        )
        .case(
            "parser",
            "lookalike",
            "--TEMPLATE--\necho SKIP_TESTING\n--EXPECTED--\nSKIP_TESTING\n",
        );

    let output = fixture.run(&[]);
    assert!(output.status.success(), "{}", describe(&output));

    let text = stdout(&output);
    assert!(text.contains("- needs_php7 (skipped: need php7)"), "{text}");
    assert!(text.contains("✓ lookalike"), "{text}");
    assert!(text.contains("1 passed, 0 failed, 1 skipped"), "{text}");
}

#[test]
fn no_skip_compares_literally() {
    let fixture = Fixture::complete();
    fixture.case(
        "parser",
        "literal",
        "--TEMPLATE--\necho 'SKIP_TEST: whatever'\n--EXPECTED--\nsomething else\n",
    );

    let output = fixture.run(&["--no-skip"]);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    assert!(stdout(&output).contains("✗ literal"));
}

#[test]
fn invalid_cases_fail_without_stopping_the_suite() {
    let fixture = Fixture::complete();
    fixture
        .case("php_binding", "no_script", "--TEMPLATE--\nx\n--EXPECTED--\nx\n")
        .case("parser", "no_expected", "--TEMPLATE--\necho hi\n")
        .case("parser", "ok", "--TEMPLATE--\necho hi\n--EXPECTED--\nhi\n");

    let output = fixture.run(&[]);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));

    let text = stdout(&output);
    assert!(text.contains("case does not provide main.php"), "{text}");
    assert!(text.contains("case has no EXPECTED section"), "{text}");
    assert!(text.contains("1 passed, 2 failed, 0 skipped"), "{text}");
}

#[test]
fn missing_artifacts_abort_before_any_case() {
    let fixture = Fixture::new();
    fixture.case("parser", "print", "--TEMPLATE--\necho x\n--EXPECTED--\nx\n");

    let output = b2test_cmd()
        .env("PATH", "")
        .arg(fixture.build())
        .arg("--cases")
        .arg(fixture.cases())
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(stderr(&output).contains("couldn't find"), "{}", describe(&output));
    assert!(stderr(&output).contains("ast_print"), "{}", describe(&output));
    assert!(!stdout(&output).contains("passed"), "{}", describe(&output));
}

#[test]
fn missing_php_is_fatal_even_with_extension() {
    let fixture = Fixture::new();
    fixture.with_ast_print().with_php_extension().with_js_precompiler();

    let output = b2test_cmd()
        .env("PATH", fixture.bin())
        .arg(fixture.build())
        .arg("--cases")
        .arg(fixture.cases())
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    assert!(stderr(&output).contains("\"php\""), "{}", describe(&output));
    assert!(stdout(&output).is_empty());
}

#[test]
fn category_selection_skips_discovery_of_others() {
    let fixture = Fixture::new();
    fixture.with_ast_print();
    fixture.case("parser", "print", "--TEMPLATE--\necho x\n--EXPECTED--\nx\n");

    let output = fixture.run(&["-c", "parser"]);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(stdout(&output).contains("1 passed, 0 failed, 0 skipped"));
}

#[test]
fn suite_config_selects_categories_and_php() {
    let fixture = Fixture::new();
    fixture.with_php_extension();
    let php = fixture.root.path().join("tools/php-custom");
    write_executable(&php, FAKE_PHP);
    fs::write(
        fixture.cases().join("b2test.yaml"),
        format!("categories: [php-binding]\nphp: {}\n", php.display()),
    )
    .unwrap();
    fixture.case(
        "php_binding",
        "render",
        "--TEMPLATE--\nx\n--FILE[main.php]--\necho ok\n--EXPECTED--\nok\n",
    );

    let output = fixture.run(&[]);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(stdout(&output).contains("✓ render"));
}

#[test]
fn invalid_suite_config_is_fatal() {
    let fixture = Fixture::complete();
    fs::write(fixture.cases().join("b2test.yaml"), "categories: [nope]\n").unwrap();

    let output = fixture.run(&[]);
    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Error loading suite config"));
}

#[test]
fn sandboxes_are_removed() {
    let fixture = Fixture::complete();
    let boxes = fixture.root.path().join("boxes");
    fixture
        .case("parser", "pass", "--TEMPLATE--\necho x\n--EXPECTED--\nx\n")
        .case("parser", "fail", "--TEMPLATE--\necho x\n--EXPECTED--\ny\n")
        .case(
            "parser",
            "skip",
            "--TEMPLATE--\necho SKIP_TEST\n--EXPECTED--\nx\n",
        );

    let output = fixture.run(&["--sandbox-dir", boxes.to_str().unwrap()]);
    assert_eq!(output.status.code(), Some(1), "{}", describe(&output));
    assert_eq!(fs::read_dir(&boxes).unwrap().count(), 0);
}

#[test]
fn filter_by_case_name() {
    let fixture = Fixture::complete();
    fixture
        .case("parser", "include_basic", "--TEMPLATE--\necho a\n--EXPECTED--\na\n")
        .case("parser", "print_basic", "--TEMPLATE--\necho b\n--EXPECTED--\nwrong\n");

    let output = fixture.run(&["--filter", "include"]);
    assert!(output.status.success(), "{}", describe(&output));
    assert!(!stdout(&output).contains("print_basic"));
}

#[test]
fn json_output() {
    let fixture = Fixture::complete();
    fixture.case("parser", "print", "--TEMPLATE--\necho x\n--EXPECTED--\nx\n");

    let output = fixture.run(&["--output", "json"]);
    assert!(output.status.success(), "{}", describe(&output));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["passed"], 1);
    assert_eq!(json["failed"], 0);
    assert_eq!(json["results"][0]["category"], "parser");
    assert_eq!(json["results"][0]["cases"][0]["status"], "passed");
}

#[test]
fn junit_output() {
    let fixture = Fixture::complete();
    fixture.case("parser", "print", "--TEMPLATE--\necho x\n--EXPECTED--\ny\n");

    let output = fixture.run(&["--output", "junit"]);
    assert_eq!(output.status.code(), Some(1));

    let xml = stdout(&output);
    assert!(xml.starts_with("<?xml"), "{xml}");
    assert!(xml.contains("<testsuite name=\"parser\""), "{xml}");
    assert!(xml.contains("<failure message="), "{xml}");
}

#[test]
fn parallel_run_reports_in_order() {
    let fixture = Fixture::complete();
    for i in 0..6 {
        fixture.case(
            "parser",
            &format!("case{i}"),
            &format!("--TEMPLATE--\necho {i}\n--EXPECTED--\n{i}\n"),
        );
    }

    let output = fixture.run(&["--parallel", "-c", "parser"]);
    assert!(output.status.success(), "{}", describe(&output));

    let text = stdout(&output);
    let positions: Vec<_> = (0..6)
        .map(|i| text.find(&format!("✓ case{i}")).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]), "{text}");
}

#[test]
fn wrong_argument_count_is_a_usage_error() {
    let output = b2test_cmd().output().unwrap();
    assert_eq!(output.status.code(), Some(2));

    let output = b2test_cmd().args(["a", "b"]).output().unwrap();
    assert_eq!(output.status.code(), Some(2));
}
