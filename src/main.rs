//! HeartRisk - heart-attack risk report over a health survey table
//!
//! A CLI tool that loads the survey CSV once, runs the study cases over it
//! and writes a Markdown or JSON report.
//!
//! Exit codes:
//!   0 - Success (including a degraded report without --fail-on-unavailable)
//!   1 - Runtime error (config, schema wiring, output write, etc.)
//!   2 - Dataset unavailable and --fail-on-unavailable set

mod analysis;
mod cases;
mod cli;
mod config;
mod dataset;
mod error;
mod models;
mod normalize;
mod report;

use analysis::Filter;
use anyhow::{bail, Context, Result};
use cases::{CaseSettings, StudyCase};
use chrono::Utc;
use cli::{Args, OutputFormat};
use config::{Config, CONFIG_FILE};
use dataset::LoadOptions;
use models::{Report, ReportMetadata};
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};
use tracing_subscriber::FmtSubscriber;

fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config and --list-cases early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }
    if args.list_cases {
        handle_list_cases();
        return Ok(());
    }

    let mut config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            std::process::exit(1);
        }
    };
    config.merge_with_args(&args);
    if let Err(e) = config.validate() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    // Initialize logging
    init_logging(log_level(&args, &config));

    info!("HeartRisk v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);
    debug!("Configuration: {:?}", config);

    match run_report(&args, &config) {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Report failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .heartrisk.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content).with_context(|| format!("Failed to write {}", CONFIG_FILE))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE);
    println!("   Edit it to point at your dataset and tune the report.");
    Ok(())
}

/// Handle --list-cases: print the case catalog.
fn handle_list_cases() {
    println!("Available study cases:\n");
    for case in cases::catalog() {
        println!("  {:>2}  {:<18} {}", case.number, case.slug, case.title);
    }
}

/// Quiet wins over any verbose setting; the config may turn verbose on.
fn log_level(args: &Args, config: &Config) -> tracing::Level {
    if !args.quiet && config.general.verbose {
        tracing::Level::DEBUG
    } else {
        args.log_level()
    }
}

/// Initialize logging at the given level.
fn init_logging(level: tracing::Level) {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
    }
}

/// Run the complete report workflow. Returns exit code (0 or 2).
fn run_report(args: &Args, config: &Config) -> Result<i32> {
    let start_time = Instant::now();

    let filters = config.dataset.parsed_filters()?;
    let selected = select_cases(args.case.as_deref(), config, &filters)?;
    info!("Selected {} case(s)", selected.len());

    // Step 1: Load the dataset once
    if !args.quiet {
        println!("📥 Loading dataset: {}", config.dataset.path.display());
    }
    let options = LoadOptions {
        show_progress: !args.quiet,
        ..LoadOptions::from(&config.dataset)
    };
    let loader = dataset::install(config.dataset.path.clone(), options);
    let handle = loader.load();

    if let Some(warning) = handle.warning() {
        eprintln!("⚠️  {}", warning);
    }

    // Step 2: Run the cases
    if !args.quiet {
        println!("🔬 Running {} study case(s)...", selected.len());
    }
    let settings = CaseSettings::from(&config.report);
    let case_reports = cases::run_cases(&selected, handle, &settings)
        .context("Study case wiring does not match the dataset")?;

    // Step 3: Build the report
    let metadata = ReportMetadata {
        generated_at: Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        cases_run: case_reports.len(),
        duration_seconds: start_time.elapsed().as_secs_f64(),
    };

    let mut overview = handle.overview(loader.source(), config.dataset.outcome_label());
    overview.filters = filters.iter().map(ToString::to_string).collect();

    let report = Report {
        metadata,
        dataset: overview,
        cases: case_reports,
    };

    // Step 4: Render and save
    let output = match args.format {
        OutputFormat::Json => report::generate_json_report(&report)?,
        OutputFormat::Markdown => report::generate_markdown_report(&report),
    };

    let output_path = output_path(args, config);
    std::fs::write(&output_path, &output)
        .with_context(|| format!("Failed to write report to {}", output_path.display()))?;

    // Print summary
    if !args.quiet {
        println!("\n📊 Report Summary:");
        println!("   Records: {}", report.dataset.rows);
        println!("   Cases run: {}", report.metadata.cases_run);
        let findings: usize = report.cases.iter().map(|c| c.findings.len()).sum();
        println!("   Findings: {}", findings);
        if report.degraded_cases() > 0 {
            println!("   Cases without data: {}", report.degraded_cases());
        }
        println!("   Duration: {:.2}s", report.metadata.duration_seconds);
        println!("\n✅ Report saved to: {}", output_path.display());
    }

    if args.fail_on_unavailable && !handle.is_available() {
        eprintln!("\n⛔ Dataset unavailable. Failing (exit code 2).");
        return Ok(2);
    }

    Ok(0)
}

/// Resolves `--case` selectors against the catalog, applying the
/// configured outcome definition and record filters.
fn select_cases(
    selectors: Option<&[String]>,
    config: &Config,
    filters: &[Filter],
) -> Result<Vec<StudyCase>> {
    let mut selected: Vec<StudyCase> = match selectors {
        None => cases::catalog(),
        Some(selectors) => {
            let mut picked: Vec<StudyCase> = Vec::new();
            for selector in selectors {
                let Some(case) = cases::find(selector) else {
                    bail!(
                        "Unknown case '{}'. Use --list-cases to see the available cases.",
                        selector
                    );
                };
                if !picked.iter().any(|p| p.number == case.number) {
                    picked.push(case);
                }
            }
            picked
        }
    };

    for case in &mut selected {
        let mut aggregation = case
            .aggregation
            .clone()
            .outcome(&config.dataset.outcome_field, &config.dataset.positive_value);
        for filter in filters {
            aggregation = aggregation.filter(filter.clone());
        }
        case.aggregation = aggregation;
    }

    Ok(selected)
}

/// Output path, switching the default extension for JSON output.
fn output_path(args: &Args, config: &Config) -> PathBuf {
    let path = PathBuf::from(&config.general.output);
    let is_default = args.output.is_none();
    if is_default && args.format == OutputFormat::Json && path.extension().is_some_and(|e| e == "md") {
        path.with_extension("json")
    } else {
        path
    }
}

/// Load configuration from file or use defaults.
fn load_config(args: &Args) -> Result<Config> {
    // Try explicit config path
    if let Some(ref config_path) = args.config {
        return Config::load(config_path);
    }

    // Try default location
    Ok(Config::load_default()?.unwrap_or_default())
}
