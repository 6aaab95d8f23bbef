//! CLI entry point for co-appearance based noise detection.

use anyhow::{Result, anyhow};
use clap::Parser;
use dotenv::dotenv;
use lex_noise::cam::{estimated_cells, estimated_dense_bytes};
use lex_noise::config::DEFAULT_DENSE_CELL_LIMIT;
use lex_noise::{
    DetectionReport, DetectionResult, DomainGeneralizer, Pipeline, PipelineConfig,
    ReportGenerator, ZeroBinPolicy,
};
use polars::io::csv::read::CsvReadOptions;
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Co-appearance based noisy value detection",
    long_about = "Flags values that rarely co-appear with the other values of their record.\n\n\
                  EXAMPLES:\n  \
                  # Null out noisy values\n  \
                  lex-noise -i data.csv\n\n  \
                  # Keep values, add a Noisy column, stricter threshold\n  \
                  lex-noise -i data.csv --indicator --lambda 0.5\n\n  \
                  # Integer-coded categories and a fixed category list\n  \
                  lex-noise -i data.csv --nominal zip --declare smoker=no,yes\n\n  \
                  # Show domains and matrix size without scoring\n  \
                  lex-noise -i data.csv --dry-run"
)]
struct Args {
    /// Path to the CSV file to process
    #[arg(short, long)]
    input: String,

    /// Output directory for results
    #[arg(short, long, default_value = "./outputs")]
    output: String,

    /// Custom output file name (without extension)
    ///
    /// If not specified, uses "<input name>_denoised"
    #[arg(long)]
    output_name: Option<String>,

    /// Coappearance threshold tau, in (0, 1]
    #[arg(long, default_value = "0.8")]
    tau: f64,

    /// Coappearance score threshold lambda, in (0, 1]
    #[arg(long, default_value = "0.3")]
    lambda: f64,

    /// Keep noisy values and prepend a record-level indicator column
    #[arg(long)]
    indicator: bool,

    /// Name of the indicator column
    #[arg(long, default_value = "Noisy")]
    indicator_column: String,

    /// Treat a column as nominal regardless of its type (repeatable)
    #[arg(long, value_delimiter = ',')]
    nominal: Vec<String>,

    /// Declare the category list of a column as COLUMN=a,b,c (repeatable)
    #[arg(long, value_name = "COLUMN=LABELS")]
    declare: Vec<String>,

    /// Fail on numeric/date columns whose range yields zero bins
    /// instead of collapsing them to a single bin
    #[arg(long)]
    reject_zero_range: bool,

    /// Upper bound on the bin count of numeric/date columns
    #[arg(long)]
    max_bins: Option<usize>,

    /// Co-appearance cells up to which dense storage is used
    #[arg(long, default_value_t = DEFAULT_DENSE_CELL_LIMIT)]
    dense_cell_limit: usize,

    /// Write the noisy-cell matrix as <name>_noisy_cells.csv
    #[arg(short = 'm', long)]
    emit_matrix: bool,

    /// Write a JSON report as <name>_report.json
    #[arg(short = 'r', long)]
    emit_report: bool,

    /// Output JSON to stdout instead of human-readable summary
    ///
    /// Disables all logs; only the final JSON report (or error) is printed.
    #[arg(long)]
    json: bool,

    /// Print the generalized domains and matrix footprint without scoring
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show warnings, errors and the final result)
    #[arg(short, long)]
    quiet: bool,
}

/// Initialize the tracing subscriber.
///
/// Nothing is installed for `--json` so stdout carries only the report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);
    dotenv().ok();

    if !Path::new(&args.input).exists() {
        return Err(anyhow!("Input file not found: {}", args.input));
    }

    let config = build_config(&args)?;

    info!("Loading dataset from: {}", args.input);
    let data = load_csv(&args.input)?;
    info!("Dataset loaded successfully: {:?}", data.shape());

    if args.dry_run {
        return run_dry_run(&args, &config, &data);
    }

    run_detection(&args, config, data)
}

/// Map CLI flags onto the configuration builder.
fn build_config(args: &Args) -> Result<PipelineConfig> {
    let mut builder = PipelineConfig::builder()
        .coappearance_threshold(args.tau)
        .coappearance_score_threshold(args.lambda)
        .make_noisy_missing(!args.indicator)
        .indicator_column(&args.indicator_column)
        .dense_cell_limit(args.dense_cell_limit);

    if args.reject_zero_range {
        builder = builder.zero_bin_policy(ZeroBinPolicy::Reject);
    }
    if let Some(bins) = args.max_bins {
        builder = builder.max_bins(bins);
    }
    for column in &args.nominal {
        builder = builder.nominal_column(column.trim());
    }
    for declaration in &args.declare {
        let (column, labels) = parse_declaration(declaration)?;
        builder = builder.declared_domain(column, labels);
    }

    Ok(builder.build()?)
}

/// Parse `COLUMN=a,b,c` into a column name and its labels.
fn parse_declaration(declaration: &str) -> Result<(String, Vec<String>)> {
    let (column, labels) = declaration
        .split_once('=')
        .ok_or_else(|| anyhow!("Invalid --declare '{}': expected COLUMN=a,b,c", declaration))?;

    let column = column.trim();
    if column.is_empty() {
        return Err(anyhow!("Invalid --declare '{}': empty column name", declaration));
    }

    let labels = labels
        .split(',')
        .map(str::trim)
        .filter(|label| !label.is_empty())
        .map(String::from)
        .collect();

    Ok((column.to_string(), labels))
}

/// Preview the generalized domains and matrix size.
///
/// Uses `println!` on purpose: this output is the point of `--dry-run` and
/// must show regardless of the log level.
fn run_dry_run(args: &Args, config: &PipelineConfig, data: &DataFrame) -> Result<()> {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of noise detection");
    println!("{}\n", "=".repeat(80));

    println!("DATASET OVERVIEW");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.input);
    println!("  Records: {}", data.height());
    println!("  Attributes: {}", data.width());
    println!();

    println!("ATTRIBUTE DOMAINS");
    println!("{}", "-".repeat(40));

    let generalized = DomainGeneralizer::new(config).generalize(data)?;
    let dataset = &generalized.dataset;

    println!("{:<24} {:<12} {:<8} Labels", "Column", "Kind", "Size");
    println!("{}", "-".repeat(70));
    for domain in dataset.domains() {
        println!(
            "{:<24} {:<12} {:<8} {}",
            truncate_str(&domain.name, 23),
            domain.kind.as_str(),
            domain.size,
            preview_labels(&domain.labels, 4)
        );
    }
    println!();

    if !generalized.warnings.is_empty() {
        println!("WARNINGS");
        println!("{}", "-".repeat(40));
        for warning in &generalized.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    let sizes = dataset.domain_sizes();
    let cells = estimated_cells(&sizes);
    println!("CO-APPEARANCE MATRIX");
    println!("{}", "-".repeat(40));
    println!("  Cells: {}", cells);
    println!(
        "  Dense footprint: {:.1} MB",
        estimated_dense_bytes(&sizes) as f64 / (1024.0 * 1024.0)
    );
    println!(
        "  Storage: {}",
        if cells <= config.dense_cell_limit {
            "dense"
        } else {
            "sparse (above --dense-cell-limit)"
        }
    );
    println!();

    println!("SCORING");
    println!("{}", "-".repeat(40));
    println!("  tau = {}, lambda = {}", config.coappearance_threshold, config.coappearance_score_threshold);
    if config.make_noisy_missing {
        println!("  Mode: noisy values replaced with missing values");
    } else {
        println!("  Mode: indicator column '{}' prepended", config.indicator_column);
    }
    println!();

    let generator = ReportGenerator::new(PathBuf::from(&args.output), args.output_name.clone());
    let base = generator.base_name(&extract_file_stem(&args.input));
    println!("OUTPUT FILES (will be created)");
    println!("{}", "-".repeat(40));
    println!("  - {}/{}.csv", args.output, base);
    if args.emit_matrix {
        println!("  - {}/{}_noisy_cells.csv", args.output, base);
    }
    if args.emit_report {
        println!("  - {}/{}_report.json", args.output, base);
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To run detection, run without --dry-run");
    println!("{}", "=".repeat(80));

    Ok(())
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

fn run_detection(args: &Args, config: PipelineConfig, data: DataFrame) -> Result<()> {
    let pipeline = build_pipeline(args, config.clone())?;

    info!("{}", "=".repeat(80));
    info!("Starting noise detection...");
    info!("{}", "=".repeat(80));

    let mut result = match pipeline.process(data) {
        Ok(result) => result,
        Err(e) => {
            if args.json {
                println!("{}", serde_json::json!({ "error": e }));
            }
            error!("Detection failed: {}", e);
            return Err(anyhow!("Detection failed: {}", e));
        }
    };

    let generator = ReportGenerator::new(PathBuf::from(&args.output), args.output_name.clone());
    let base = generator.base_name(&extract_file_stem(&args.input));

    let output_path = generator.save_output_csv(&mut result.output, &base)?;
    let matrix_path = if args.emit_matrix {
        Some(generator.write_matrix_csv(&result, &base)?)
    } else {
        None
    };

    let output_file = output_path.to_string_lossy().to_string();
    let matrix_file = matrix_path.map(|p| p.to_string_lossy().to_string());
    let report = ReportGenerator::build_report(
        &args.input,
        Some(&output_file),
        matrix_file.as_deref(),
        &config,
        &result,
    );

    if args.emit_report {
        let report_path = generator.write_report(&report, &base)?;
        debug!("Report written to: {}", report_path.display());
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    print_human_readable_summary(&report, &result);
    Ok(())
}

/// Print a human-readable summary of the run.
fn print_human_readable_summary(report: &DetectionReport, result: &DetectionResult) {
    let summary = &report.summary;

    println!();
    println!("{}", "=".repeat(80));
    println!("NOISE DETECTION COMPLETE");
    println!("{}", "=".repeat(80));
    println!();

    println!(
        "Input:  {} ({} records x {} attributes)",
        report.input_file, summary.records, summary.attributes
    );
    if let Some(ref output_file) = report.output_file {
        println!(
            "Output: {} ({} records x {} columns)",
            output_file,
            result.output.height(),
            result.output.width()
        );
    }
    if let Some(ref matrix_file) = report.matrix_file {
        println!("Matrix: {}", matrix_file);
    }
    println!();

    println!("Detection Summary:");
    println!("  Duration: {}ms", summary.duration_ms);
    println!(
        "  Thresholds: tau = {}, lambda = {}",
        summary.coappearance_threshold, summary.coappearance_score_threshold
    );
    println!(
        "  Noisy records: {} ({:.1}%)",
        summary.noisy_records,
        summary.noisy_record_percentage()
    );
    println!(
        "  Noisy cells: {} ({:.2}%)",
        summary.noisy_cells,
        summary.noisy_cell_percentage()
    );
    println!(
        "  Co-appearance matrix: {} cells ({:?} storage)",
        summary.cam_cells, summary.cam_storage
    );
    println!();

    println!("{:<24} {:<12} {:<8} {:<8}", "Attribute", "Kind", "Domain", "Noisy");
    println!("{}", "-".repeat(56));
    for attribute in &summary.attribute_summaries {
        println!(
            "{:<24} {:<12} {:<8} {:<8}",
            truncate_str(&attribute.name, 23),
            attribute.kind.as_str(),
            attribute.domain_size,
            attribute.noisy_cells
        );
    }
    println!();

    if !summary.warnings.is_empty() {
        println!("Warnings:");
        for warning in &summary.warnings {
            println!("  ! {}", warning);
        }
        println!();
    }

    println!("Use --json for machine-readable output");
    println!("Use --emit-report to save a JSON report, --emit-matrix for the noisy-cell matrix");
    println!("{}", "=".repeat(80));
}

/// Load a CSV, parsing date columns where possible.
///
/// Falls back to plain string columns when date parsing fails.
fn load_csv(path: &str) -> Result<DataFrame> {
    let parse_options = CsvParseOptions::default()
        .with_quote_char(Some(b'"'))
        .with_try_parse_dates(true);

    match CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .with_parse_options(parse_options)
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
    {
        Ok(df) => return Ok(df),
        Err(e) => debug!("Loading with date parsing failed: {}", e),
    }

    CsvReadOptions::default()
        .with_infer_schema_length(Some(100))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()
        .map_err(|e| anyhow!("Failed to read {}: {}", path, e))
}

/// Extract the file stem (name without extension) from a path.
fn extract_file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("output")
        .to_string()
}

/// Truncate a string to `max_len` characters with an ellipsis.
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

/// First `limit` labels joined by commas, with a count of the rest.
fn preview_labels(labels: &[String], limit: usize) -> String {
    let shown = labels
        .iter()
        .take(limit)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if labels.len() > limit {
        format!("{} ... (+{})", shown, labels.len() - limit)
    } else {
        shown
    }
}
