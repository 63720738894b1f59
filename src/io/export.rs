//! Result exports.
//!
//! Three artifacts per analyzed trace:
//! - the human-readable report (text, content built by `report::format`)
//! - the full per-guess audit table (CSV, easy to open in a spreadsheet)
//! - a machine-readable results file (JSON) for downstream comparisons

use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use chrono::Local;
use serde::Serialize;

use crate::app::pipeline::RunOutput;
use crate::domain::{
    FitContext, GuessFit, MagnetGeometry, Metric, ModelKind, ParamEstimate, SampleProperties,
};
use crate::error::AppError;
use crate::field::FieldFit;
use crate::fit::{Bound, GuessGrid};
use crate::prep::{Calibration, Inflection};

fn create(path: &Path, what: &str) -> Result<File, AppError> {
    File::create(path)
        .map_err(|e| AppError::config(format!("Failed to create {what} '{}': {e}", path.display())))
}

/// Write the formatted report text.
pub fn write_report(path: &Path, content: &str) -> Result<(), AppError> {
    let mut file = create(path, "report")?;
    file.write_all(content.as_bytes())
        .map_err(|e| AppError::config(format!("Failed to write report '{}': {e}", path.display())))
}

/// Write the full per-guess audit table as CSV.
pub fn write_audit_csv(path: &Path, output: &RunOutput) -> Result<(), AppError> {
    let mut file = create(path, "audit CSV")?;
    let fail = |e: std::io::Error| {
        AppError::config(format!("Failed to write audit CSV '{}': {e}", path.display()))
    };

    match output.grid.model {
        ModelKind::RadiusChi => {
            writeln!(
                file,
                "guess_index,guess_r,guess_chi,r,chi,se_r,se_chi,corr,r_squared,mse,fit_std_error,cov_00,cov_01,cov_10,cov_11,radius_distance"
            )
            .map_err(fail)?;
            for fit in &output.selection.table {
                let radius = fit.radius.unwrap_or(ParamEstimate {
                    value: f64::NAN,
                    std_error: f64::NAN,
                });
                writeln!(
                    file,
                    "{},{:.10e},{:.10e},{:.10e},{:.10e},{:.10e},{:.10e},{},{:.12},{:.10e},{:.10e},{:.10e},{:.10e},{:.10e},{:.10e},{}",
                    fit.guess_index,
                    fit.seed_radius.unwrap_or(f64::NAN),
                    fit.seed_chi,
                    radius.value,
                    fit.chi.value,
                    radius.std_error,
                    fit.chi.std_error,
                    fit.correlation.map(|c| format!("{c:.10e}")).unwrap_or_default(),
                    fit.r_squared,
                    fit.mse,
                    fit.fit_std_error,
                    fit.covariance[0],
                    fit.covariance[1],
                    fit.covariance[2],
                    fit.covariance[3],
                    fit.radius_distance
                        .map(|d| format!("{d:.10e}"))
                        .unwrap_or_default(),
                )
                .map_err(fail)?;
            }
        }
        ModelKind::ChiOnly => {
            writeln!(
                file,
                "guess_index,guess_chi,chi,se_chi,r_squared,mse,fit_std_error,cov_00"
            )
            .map_err(fail)?;
            for fit in &output.selection.table {
                writeln!(
                    file,
                    "{},{:.10e},{:.10e},{:.10e},{:.12},{:.10e},{:.10e},{:.10e}",
                    fit.guess_index,
                    fit.seed_chi,
                    fit.chi.value,
                    fit.chi.std_error,
                    fit.r_squared,
                    fit.mse,
                    fit.fit_std_error,
                    fit.covariance[0],
                )
                .map_err(fail)?;
            }
        }
    }

    Ok(())
}

/// Machine-readable results schema.
#[derive(Serialize)]
struct ResultsFile<'a> {
    tool: &'static str,
    version: &'static str,
    analyzed_at: String,
    trace_file: String,
    model: &'static str,
    sample: &'a SampleProperties,
    magnet: &'a MagnetGeometry,
    field: &'a FieldFit,
    context: &'a FitContext,
    calibration: &'a Calibration,
    inflection: Option<&'a Inflection>,
    grid: &'a GuessGrid,
    bounds: &'a [Bound],
    guesses_attempted: usize,
    guesses_failed: usize,
    guesses_truncated: Option<usize>,
    deadline_hit: bool,
    fit_seconds: f64,
    best: &'a BTreeMap<Metric, GuessFit>,
}

/// Write the machine-readable results JSON.
pub fn write_results_json(path: &Path, output: &RunOutput) -> Result<(), AppError> {
    let file = create(path, "results JSON")?;

    let results = ResultsFile {
        tool: "mapfit",
        version: env!("CARGO_PKG_VERSION"),
        analyzed_at: Local::now().to_rfc3339(),
        trace_file: output.trace_path.display().to_string(),
        model: output.grid.model.display_name(),
        sample: &output.sample,
        magnet: &output.magnet,
        field: &output.field,
        context: &output.context,
        calibration: &output.calibration,
        inflection: output.inflection.as_ref(),
        grid: &output.grid,
        bounds: &output.bounds,
        guesses_attempted: output.selection.attempted,
        guesses_failed: output.selection.failed,
        guesses_truncated: output.selection.truncated,
        deadline_hit: output.selection.deadline_hit,
        fit_seconds: output.fit_seconds,
        best: &output.selection.best,
    };

    serde_json::to_writer_pretty(file, &results).map_err(|e| {
        AppError::config(format!("Failed to write results JSON '{}': {e}", path.display()))
    })
}
