//! Command-line parsing for the MAP decay-fit toolkit.
//!
//! The goal of this module is to keep **argument parsing** and **command
//! dispatch** separate from the modeling/math code.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::domain::{Metric, ModelKind};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(name = "mapfit", version, about = "Magnetophotometer decay-model fitting toolkit")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Analyze one trace file: calibrate, shift, fit, report.
    Fit(FitArgs),
    /// Analyze every trace listed in a file, continuing past per-file errors.
    Batch(BatchArgs),
    /// Print the field-gradient fit for the magnet in a run spec.
    Field(FieldArgs),
}

#[derive(Debug, Parser)]
pub struct FitArgs {
    /// Trace file: whitespace-delimited `(time_seconds, intensity_lux)`.
    pub trace: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct BatchArgs {
    /// List file with one trace path per line (`#` comments allowed).
    pub list: PathBuf,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Debug, Parser)]
pub struct FieldArgs {
    /// Run spec JSON with the magnet section.
    #[arg(long, value_name = "JSON")]
    pub spec: PathBuf,
}

/// Options shared by `fit` and `batch`.
#[derive(Debug, Parser, Clone)]
pub struct CommonArgs {
    /// Run spec JSON with sample and magnet metadata.
    #[arg(long, value_name = "JSON")]
    pub spec: PathBuf,

    /// Output directory for reports, tables, and plots.
    #[arg(long, default_value = "analysis")]
    pub out_dir: PathBuf,

    /// Which decay model to fit.
    #[arg(long, value_enum, default_value_t = ModelKind::RadiusChi)]
    pub model: ModelKind,

    /// Trailing samples averaged into the calibration reference.
    #[arg(long, default_value_t = 20)]
    pub trailing_n: usize,

    /// Fit the full trace instead of shifting to the inflection point.
    #[arg(long)]
    pub no_adjust: bool,

    /// Minimum sample index for the inflection search.
    #[arg(long, default_value_t = 20)]
    pub min_guard: usize,

    /// Savitzky-Golay smoothing window (odd number of samples).
    #[arg(long, default_value_t = 51)]
    pub window: usize,

    /// Savitzky-Golay polynomial order.
    #[arg(long, default_value_t = 3)]
    pub poly_order: usize,

    /// Susceptibility guess count (log-spaced axis).
    #[arg(long, default_value_t = 50)]
    pub chi_guesses: usize,

    /// Susceptibility guess range minimum.
    #[arg(long, default_value_t = 1e-6)]
    pub chi_guess_min: f64,

    /// Susceptibility guess range maximum.
    #[arg(long, default_value_t = 1e3)]
    pub chi_guess_max: f64,

    /// Radius guess count. The axis is log-spaced over the range below, or
    /// lin-spaced across `known ± std` when the run spec has a known radius.
    #[arg(long, default_value_t = 50)]
    pub r_guesses: usize,

    /// Radius guess range minimum (meters).
    #[arg(long, default_value_t = 1e-10)]
    pub r_guess_min: f64,

    /// Radius guess range maximum (meters).
    #[arg(long, default_value_t = 1e-4)]
    pub r_guess_max: f64,

    /// Override the radius lower bound (meters).
    #[arg(long)]
    pub r_lower: Option<f64>,

    /// Override the radius upper bound (meters).
    #[arg(long)]
    pub r_upper: Option<f64>,

    /// Override the susceptibility lower bound.
    #[arg(long)]
    pub chi_lower: Option<f64>,

    /// Override the susceptibility upper bound.
    #[arg(long)]
    pub chi_upper: Option<f64>,

    /// Best-fit criteria to track (default: all applicable).
    #[arg(long, value_enum, value_delimiter = ',')]
    pub metrics: Vec<Metric>,

    /// Guess budget: stop generating fits after this many grid entries.
    #[arg(long)]
    pub max_guesses: Option<usize>,

    /// Wall-clock deadline for the grid search, in seconds.
    #[arg(long)]
    pub deadline_secs: Option<u64>,

    /// Solver evaluation budget per guess.
    #[arg(long, default_value_t = 200)]
    pub patience: usize,

    /// Skip the SVG diagnostic plot.
    #[arg(long)]
    pub no_plot: bool,

    /// Print results without writing any artifact files.
    #[arg(long)]
    pub dry_run: bool,
}
