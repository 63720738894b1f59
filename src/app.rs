//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads the run spec
//! - runs the analysis pipeline per trace
//! - prints summaries and writes artifacts

use std::fs;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{BatchArgs, Command, CommonArgs, FieldArgs, FitArgs};
use crate::domain::AnalysisConfig;
use crate::error::{AppError, ErrorKind};
use crate::io::run_spec::{read_run_spec, RunSpec};

pub mod pipeline;

/// Entry point for the `mapfit` binary.
pub fn run() -> Result<(), AppError> {
    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Fit(args) => handle_fit(args),
        Command::Batch(args) => handle_batch(args),
        Command::Field(args) => handle_field(args),
    }
}

fn handle_fit(args: FitArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.common);
    let spec = read_run_spec(&args.common.spec)?;

    let output = pipeline::run_analysis(&args.trace, &spec, &config)?;
    println!("{}", crate::report::format_summary(&output));

    if config.save {
        let written = write_artifacts(&output, &config)?;
        for path in written {
            println!("Saved {}", path.display());
        }
    }

    Ok(())
}

fn handle_batch(args: BatchArgs) -> Result<(), AppError> {
    let config = analysis_config_from_args(&args.common);
    let spec = read_run_spec(&args.common.spec)?;
    let traces = read_trace_list(&args.list)?;

    let total = traces.len();
    let mut succeeded = 0usize;
    for trace in &traces {
        match run_one(trace, &spec, &config) {
            Ok(()) => succeeded += 1,
            // Configuration problems affect every file; stop immediately.
            Err(err) if err.kind() == ErrorKind::Config => return Err(err),
            Err(err) => {
                log::warn!("Skipping '{}': {err}", trace.display());
            }
        }
    }

    println!("Batch finished: {succeeded}/{total} traces analyzed.");
    if succeeded == 0 {
        return Err(AppError::data(format!(
            "All {total} trace files in '{}' failed.",
            args.list.display()
        )));
    }
    Ok(())
}

fn run_one(trace: &Path, spec: &RunSpec, config: &AnalysisConfig) -> Result<(), AppError> {
    let output = pipeline::run_analysis(trace, spec, config)?;
    println!("{}", crate::report::format_summary(&output));
    if config.save {
        for path in write_artifacts(&output, config)? {
            println!("Saved {}", path.display());
        }
    }
    Ok(())
}

fn handle_field(args: FieldArgs) -> Result<(), AppError> {
    let spec = read_run_spec(&args.spec)?;
    let magnet = spec.magnet_geometry()?;
    let fit = crate::field::fit_field_gradient(&magnet)?;

    println!(
        "Magnet: {} ({})",
        magnet.name.as_deref().unwrap_or("(unnamed)"),
        magnet.grade.display_name()
    );
    let (z_low, z_high) = magnet.sensing_window();
    println!(
        "Sensing window: [{}, {}] mm",
        z_low / crate::domain::MM_TO_M,
        z_high / crate::domain::MM_TO_M
    );
    println!("{}", fit.equation());
    println!("a = {} T/m", fit.slope);
    Ok(())
}

/// Read the batch list file: one trace path per line, `#` comments allowed.
fn read_trace_list(path: &Path) -> Result<Vec<PathBuf>, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::config(format!("Failed to read list file '{}': {e}", path.display()))
    })?;

    let traces: Vec<PathBuf> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(PathBuf::from)
        .collect();

    if traces.is_empty() {
        return Err(AppError::config(format!(
            "List file '{}' names no trace files.",
            path.display()
        )));
    }
    Ok(traces)
}

pub fn analysis_config_from_args(args: &CommonArgs) -> AnalysisConfig {
    AnalysisConfig {
        out_dir: args.out_dir.clone(),
        model_kind: args.model,
        trailing_n: args.trailing_n,
        adjust: !args.no_adjust,
        min_index_guard: args.min_guard,
        smoothing_window: args.window,
        poly_order: args.poly_order,
        chi_guesses: args.chi_guesses,
        chi_guess_min: args.chi_guess_min,
        chi_guess_max: args.chi_guess_max,
        r_guesses: args.r_guesses,
        r_guess_min: args.r_guess_min,
        r_guess_max: args.r_guess_max,
        r_lower: args.r_lower,
        r_upper: args.r_upper,
        chi_lower: args.chi_lower,
        chi_upper: args.chi_upper,
        metrics: args.metrics.clone(),
        max_guesses: args.max_guesses,
        deadline_secs: args.deadline_secs,
        patience: args.patience,
        plot: !args.no_plot,
        save: !args.dry_run,
    }
}

/// Write the per-trace artifacts and return their paths.
fn write_artifacts(
    output: &pipeline::RunOutput,
    config: &AnalysisConfig,
) -> Result<Vec<PathBuf>, AppError> {
    fs::create_dir_all(&config.out_dir).map_err(|e| {
        AppError::config(format!(
            "Failed to create output directory '{}': {e}",
            config.out_dir.display()
        ))
    })?;

    let stem = output
        .trace_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "trace".to_string());

    let mut written = Vec::new();

    let report_path = config.out_dir.join(format!("{stem}-fit.txt"));
    let report = crate::report::format_report(output, config);
    crate::io::export::write_report(&report_path, &report)?;
    written.push(report_path);

    let csv_path = config.out_dir.join(format!("{stem}-fits.csv"));
    crate::io::export::write_audit_csv(&csv_path, output)?;
    written.push(csv_path);

    let json_path = config.out_dir.join(format!("{stem}-fit.json"));
    crate::io::export::write_results_json(&json_path, output)?;
    written.push(json_path);

    if config.plot {
        let svg_path = config.out_dir.join(format!("{stem}-fit.svg"));
        crate::plot::render_diagnostic_svg(&svg_path, output)?;
        written.push(svg_path);
    }

    Ok(written)
}
