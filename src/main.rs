mod case;
mod loader;
mod report;
mod runner;
mod sandbox;
mod schema;
mod variant;

use clap::{Parser, ValueEnum};
use report::CategoryReport;
use runner::RunSettings;
use std::path::PathBuf;
use variant::{Category, DEFAULT_JS_PRECOMPILER, DiscoveryOptions, Variant};

#[derive(Clone, Copy, Default, ValueEnum)]
enum OutputFormat {
    /// Human-readable output with checkmarks
    #[default]
    Human,
    /// Machine-readable JSON output
    Json,
    /// JUnit XML output for CI systems
    Junit,
}

#[derive(Parser)]
#[command(name = "b2test")]
#[command(about = "Conformance test runner for the b2 template toolchain")]
#[command(version)]
struct Cli {
    /// Build output directory containing src/ast_print, src/php and src/js_precompiler
    build_path: PathBuf,
    /// Directory holding the parser/, php_binding/ and js_precompiler/ case directories
    #[arg(long, default_value = "tests")]
    cases: PathBuf,
    /// Only run these categories (repeatable)
    #[arg(short, long = "category", value_name = "CATEGORY")]
    categories: Vec<Category>,
    /// Filter cases by file name (substring match)
    #[arg(short, long)]
    filter: Option<String>,
    /// Output format
    #[arg(short, long, default_value = "human")]
    output: OutputFormat,
    /// Show verbose output (tool paths, command lines, full failure text)
    #[arg(short, long)]
    verbose: bool,
    /// PHP interpreter to use instead of searching PATH
    #[arg(long)]
    php: Option<PathBuf>,
    /// Executable name of the JS precompiler
    #[arg(long)]
    js_precompiler: Option<String>,
    /// Directory for case sandboxes (overrides suite config)
    #[arg(long)]
    sandbox_dir: Option<PathBuf>,
    /// Run the cases of each category in parallel
    #[arg(long)]
    parallel: bool,
    /// Compare SKIP_TEST output literally instead of skipping the case
    #[arg(long)]
    no_skip: bool,
}

fn main() {
    let cli = Cli::parse();

    // Load suite config if present
    let suite_config = match loader::load_suite_config(&cli.cases) {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            eprintln!("Error loading suite config: {e}");
            std::process::exit(1);
        }
    };

    // CLI flags override suite config
    let categories = if !cli.categories.is_empty() {
        cli.categories.clone()
    } else if !suite_config.categories.is_empty() {
        suite_config.categories.clone()
    } else {
        Category::ALL.to_vec()
    };
    let discovery = DiscoveryOptions {
        php: cli.php.clone().or(suite_config.php),
        js_precompiler: cli
            .js_precompiler
            .clone()
            .or(suite_config.js_precompiler)
            .unwrap_or_else(|| DEFAULT_JS_PRECOMPILER.to_string()),
        ..DiscoveryOptions::default()
    };
    let settings = RunSettings {
        sandbox_dir: cli.sandbox_dir.clone().or(suite_config.sandbox_dir),
        allow_skipping: !cli.no_skip,
        parallel: cli.parallel || suite_config.parallel,
        verbose: cli.verbose,
    };

    // Locate every tool before running anything; a missing one aborts the run
    let mut variants = Vec::with_capacity(Category::ALL.len());
    for category in Category::ALL {
        if !categories.contains(&category) {
            continue;
        }
        match Variant::discover(category, &cli.build_path, &discovery) {
            Ok(variant) => {
                if cli.verbose {
                    eprintln!("{category}: using {}", variant.describe());
                }
                variants.push(variant);
            }
            Err(e) => {
                eprintln!("Error: {category}: {e}");
                std::process::exit(1);
            }
        }
    }

    if cli.verbose && let Some(ref f) = cli.filter {
        eprintln!("Filtering cases by: {f:?}");
    }

    let run_start = std::time::Instant::now();
    let mut reports = Vec::with_capacity(variants.len());
    for variant in &variants {
        let mut cases = match loader::find_cases(&cli.cases, variant.category) {
            Ok(cases) => cases,
            Err(e) => {
                eprintln!("Error finding {} cases: {e}", variant.category);
                std::process::exit(1);
            }
        };
        if let Some(ref f) = cli.filter {
            cases.retain(|path| runner::case_name(path).contains(f.as_str()));
        }

        match runner::run_category(variant, &cases, &settings) {
            Ok(results) => reports.push(CategoryReport {
                category: variant.category,
                cases: results,
            }),
            Err(e) => {
                eprintln!("Error: {e}");
                std::process::exit(1);
            }
        }
    }
    let total_time = run_start.elapsed();

    match cli.output {
        OutputFormat::Human => print!("{}", report::format_human(&reports, cli.verbose)),
        OutputFormat::Json => {
            let output = report::format_json(&reports);
            println!(
                "{}",
                serde_json::to_string_pretty(&output).expect("Failed to serialize")
            );
        }
        OutputFormat::Junit => {
            print!(
                "{}",
                report::format_junit_xml(&reports, total_time, chrono::Local::now())
            );
        }
    }

    if reports
        .iter()
        .flat_map(|r| &r.cases)
        .any(runner::CaseResult::is_failure)
    {
        std::process::exit(1);
    }
}
