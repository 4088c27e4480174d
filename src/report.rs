//! Result reporting.
//!
//! Renders the results of a run as human-readable text, JSON, or JUnit XML.

use crate::runner::{CaseResult, Outcome};
use crate::variant::Category;
use chrono::{DateTime, Local};
use std::fmt::Write as _;
use std::time::Duration;

/// Failure messages longer than this are cut short unless verbose.
const FAILURE_PREVIEW_LINES: usize = 20;

/// The results of one category.
#[derive(Debug)]
pub struct CategoryReport {
    pub category: Category,
    pub cases: Vec<CaseResult>,
}

impl CategoryReport {
    fn total_time(&self) -> Duration {
        self.cases.iter().map(|c| c.duration).sum()
    }
}

/// Aggregate counts over a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Totals {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl Totals {
    pub fn of(reports: &[CategoryReport]) -> Self {
        let mut totals = Self::default();
        for case in reports.iter().flat_map(|r| &r.cases) {
            match case.outcome {
                Outcome::Passed => totals.passed += 1,
                Outcome::Failed(_) => totals.failed += 1,
                Outcome::Skipped(_) => totals.skipped += 1,
            }
        }
        totals
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.skipped
    }
}

/// Human-readable output with checkmarks.
pub fn format_human(reports: &[CategoryReport], verbose: bool) -> String {
    let mut out = String::new();
    for report in reports {
        let _ = writeln!(out, "\n{}", report.category);
        if report.cases.is_empty() {
            out.push_str("  (no cases)\n");
        }
        for case in &report.cases {
            match &case.outcome {
                Outcome::Passed => {
                    let _ = writeln!(out, "  ✓ {} ({:.2?})", case.name, case.duration);
                }
                Outcome::Skipped(reason) if reason.is_empty() => {
                    let _ = writeln!(out, "  - {} (skipped)", case.name);
                }
                Outcome::Skipped(reason) => {
                    let _ = writeln!(out, "  - {} (skipped: {reason})", case.name);
                }
                Outcome::Failed(failure) => {
                    let _ = writeln!(out, "  ✗ {} ({:.2?})", case.name, case.duration);
                    push_indented(&mut out, &failure.to_string(), verbose);
                }
            }
        }
    }

    let totals = Totals::of(reports);
    let _ = writeln!(
        out,
        "\n{} passed, {} failed, {} skipped",
        totals.passed, totals.failed, totals.skipped
    );
    out
}

fn push_indented(out: &mut String, message: &str, verbose: bool) {
    let lines: Vec<&str> = message.lines().collect();
    let shown = if verbose {
        lines.len()
    } else {
        lines.len().min(FAILURE_PREVIEW_LINES)
    };
    for line in &lines[..shown] {
        let _ = writeln!(out, "    {line}");
    }
    if shown < lines.len() {
        let _ = writeln!(
            out,
            "    ... {} more lines (use --verbose to see all)",
            lines.len() - shown
        );
    }
}

/// Machine-readable JSON output.
pub fn format_json(reports: &[CategoryReport]) -> serde_json::Value {
    let totals = Totals::of(reports);
    let results: Vec<_> = reports
        .iter()
        .map(|r| {
            serde_json::json!({
                "category": r.category,
                "cases": r.cases,
            })
        })
        .collect();
    serde_json::json!({
        "passed": totals.passed,
        "failed": totals.failed,
        "skipped": totals.skipped,
        "results": results,
    })
}

/// Format results as JUnit XML, one test suite per category.
pub fn format_junit_xml(
    reports: &[CategoryReport],
    total_time: Duration,
    timestamp: DateTime<Local>,
) -> String {
    let mut xml = String::new();
    xml.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let totals = Totals::of(reports);
    let _ = writeln!(
        xml,
        "<testsuites tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{:.3}\">",
        totals.total(),
        totals.failed,
        totals.skipped,
        total_time.as_secs_f64()
    );

    let stamp = timestamp.format("%Y-%m-%dT%H:%M:%S");
    for report in reports {
        let counts = Totals::of(std::slice::from_ref(report));
        let _ = writeln!(
            xml,
            "  <testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" skipped=\"{}\" time=\"{:.3}\" timestamp=\"{stamp}\">",
            report.category,
            counts.total(),
            counts.failed,
            counts.skipped,
            report.total_time().as_secs_f64()
        );

        for case in &report.cases {
            let _ = writeln!(
                xml,
                "    <testcase name=\"{}\" classname=\"{}\" file=\"{}\" time=\"{:.3}\">",
                escape_xml(&case.name),
                report.category,
                escape_xml(&case.file.display().to_string()),
                case.duration.as_secs_f64()
            );

            match &case.outcome {
                Outcome::Passed => {}
                Outcome::Skipped(reason) => {
                    let _ = writeln!(xml, "      <skipped message=\"{}\"/>", escape_xml(reason));
                }
                Outcome::Failed(failure) => {
                    let text = failure.to_string();
                    let message = text.lines().next().unwrap_or("Case failed");
                    let _ = writeln!(xml, "      <failure message=\"{}\">", escape_xml(message));
                    let _ = writeln!(xml, "{}", escape_xml(&text));
                    xml.push_str("      </failure>\n");
                }
            }

            xml.push_str("    </testcase>\n");
        }

        xml.push_str("  </testsuite>\n");
    }

    xml.push_str("</testsuites>\n");
    xml
}

/// Escape special XML characters.
fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
