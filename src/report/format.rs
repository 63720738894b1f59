//! Formatted report content.
//!
//! `format_report` produces the full per-file analysis report saved next to
//! the other artifacts; `format_summary` is the compact terminal view. The
//! report deliberately echoes everything needed to reproduce the run: sample
//! and magnet metadata, the field fit, guess ranges, bounds, processing
//! settings, the per-metric winners, and the full per-guess table.

use chrono::Local;

use crate::app::pipeline::RunOutput;
use crate::domain::{AnalysisConfig, GuessFit, Metric, ModelKind, ParamEstimate, MM_TO_M};

fn file_label(output: &RunOutput) -> String {
    output
        .trace_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| output.trace_path.display().to_string())
}

fn fit_table_header(kind: ModelKind) -> &'static str {
    match kind {
        ModelKind::RadiusChi => {
            "metric\tchi\tr\tmse\tr_sq\tguess_r\tguess_chi\tcov_00\tcov_01\tcov_10\tcov_11\tse_r\tse_chi\tcorr"
        }
        ModelKind::ChiOnly => "metric\tchi\tmse\tr_sq\tguess_chi\tcov_00\tse_chi",
    }
}

fn fit_table_row(label: &str, fit: &GuessFit, kind: ModelKind) -> String {
    match kind {
        ModelKind::RadiusChi => {
            let radius = fit.radius.unwrap_or(ParamEstimate {
                value: f64::NAN,
                std_error: f64::NAN,
            });
            format!(
                "{label}\t{chi:0.8e}\t{r:0.8e}\t{mse:0.8e}\t{r_sq:0.12}\t{guess_r:0.8e}\t{guess_chi:0.8e}\t{c00:0.8e}\t{c01:0.8e}\t{c10:0.8e}\t{c11:0.8e}\t{se_r:0.8e}\t{se_chi:0.8e}\t{corr:0.8e}",
                chi = fit.chi.value,
                r = radius.value,
                mse = fit.mse,
                r_sq = fit.r_squared,
                guess_r = fit.seed_radius.unwrap_or(f64::NAN),
                guess_chi = fit.seed_chi,
                c00 = fit.covariance[0],
                c01 = fit.covariance[1],
                c10 = fit.covariance[2],
                c11 = fit.covariance[3],
                se_r = radius.std_error,
                se_chi = fit.chi.std_error,
                corr = fit.correlation.unwrap_or(f64::NAN),
            )
        }
        ModelKind::ChiOnly => format!(
            "{label}\t{chi:0.8e}\t{mse:0.8e}\t{r_sq:0.12}\t{guess_chi:0.8e}\t{c00:0.8e}\t{se_chi:0.8e}",
            chi = fit.chi.value,
            mse = fit.mse,
            r_sq = fit.r_squared,
            guess_chi = fit.seed_chi,
            c00 = fit.covariance[0],
            se_chi = fit.chi.std_error,
        ),
    }
}

/// Full analysis report, one string, ready to save.
pub fn format_report(output: &RunOutput, config: &AnalysisConfig) -> String {
    let kind = output.grid.model;
    let now = Local::now();
    let mut out = String::new();
    let mut line = |s: String| {
        out.push_str(&s);
        out.push('\n');
    };

    line(file_label(output));

    line("\n--- Analysis Information ---".to_string());
    line(format!(
        "Analyzed on {} at {}",
        now.format("%Y.%m.%d"),
        now.format("%H:%M")
    ));
    line(format!("Analyzed with mapfit ver {}", env!("CARGO_PKG_VERSION")));
    line(format!("Fit model: {}", kind.display_name()));
    line(format!(
        "Fit params: {}",
        match kind {
            ModelKind::RadiusChi => "r, chi_p",
            ModelKind::ChiOnly => "chi_p",
        }
    ));

    line("\n--- File Information ---".to_string());
    line(format!("File: {}", output.trace_path.display()));
    line(format!(
        "Samples: {} ({} header lines skipped)",
        output.trace.len(),
        output.trace.header_lines
    ));

    line("\n--- Sample + Test Information ---".to_string());
    line(format!("Type: {}", output.sample.material));
    line(format!("\tDensity: {} kg/m^3", output.sample.density));
    match output.sample.known_radius {
        Some(kr) => line(format!("\tRadius: {:0.6e} m (std {:0.6e} m)", kr.value, kr.std)),
        None => line("\tRadius: unknown".to_string()),
    }
    line(format!(
        "Initial concentration: {} mg/mL",
        output.sample.initial_concentration
    ));
    line(format!("Solvent: {}", output.sample.solvent.display_name()));
    line(format!(
        "\tDynamic viscosity: {} Pa·s",
        output.sample.solvent.viscosity()
    ));
    line(format!(
        "\tMagnetic susceptibility: {}",
        output.sample.solvent.susceptibility()
    ));

    let magnet = &output.magnet;
    line(format!(
        "Magnet: {}",
        magnet.name.as_deref().unwrap_or("(unnamed)")
    ));
    line(format!(
        "\tSize: {:.3}\" x {:.3}\" x {:.3}\"",
        magnet.length / crate::domain::IN_TO_M,
        magnet.width / crate::domain::IN_TO_M,
        magnet.thickness / crate::domain::IN_TO_M
    ));
    line(format!("\tGrade: {}", magnet.grade.display_name()));
    line(format!(
        "Distance to optical path: {} mm",
        magnet.distance / MM_TO_M
    ));
    let (z_low, z_high) = magnet.sensing_window();
    line(format!(
        "\tWindow: [{}, {}] mm",
        z_low / MM_TO_M,
        z_high / MM_TO_M
    ));
    line(format!("Magnetic field fit:\n{}", output.field.equation()));

    line("\n--- Fit Parameters ---".to_string());
    line("Guess ranges:".to_string());
    line(output.grid.describe());
    line("Fit bounds:".to_string());
    match kind {
        ModelKind::RadiusChi => {
            line(format!("\tr: {}", output.bounds[0].describe()));
            line(format!("\tchi: {}", output.bounds[1].describe()));
        }
        ModelKind::ChiOnly => line(format!("\tchi: {}", output.bounds[0].describe())),
    }

    line("\n--- File Processing Information ---".to_string());
    line(format!(
        "Calibrated with {} negative concentration values.",
        output.calibration.negative_count
    ));
    match &output.inflection {
        Some(inf) => {
            line(format!(
                "Smoothed with Savitzky-Golay filter with window size of {} and poly_order of {}.",
                config.smoothing_window, config.poly_order
            ));
            line(format!(
                "Global min timepoint (after min {} values) is {} s.",
                config.min_index_guard, inf.time_at
            ));
        }
        None => line("Data unadjusted.".to_string()),
    }

    line("\n--- Model Results ---".to_string());
    line(format!("Time to fit: {} s", output.fit_seconds));
    line(format!(
        "Guesses attempted: {} ({} failed)",
        output.selection.attempted, output.selection.failed
    ));
    if let Some(dropped) = output.selection.truncated {
        line(format!("Guess budget dropped {dropped} grid entries."));
    }
    if output.selection.deadline_hit {
        line("Deadline expired before the grid finished.".to_string());
    }

    line("\nFINAL RESULTS".to_string());
    line(fit_table_header(kind).to_string());
    for (metric, fit) in &output.selection.best {
        line(fit_table_row(metric.display_name(), fit, kind));
    }

    line("\nFULL RESULTS".to_string());
    line(fit_table_header(kind).to_string());
    for fit in &output.selection.table {
        line(fit_table_row(&fit.guess_index.to_string(), fit, kind));
    }

    out
}

/// Compact terminal summary.
pub fn format_summary(output: &RunOutput) -> String {
    let kind = output.grid.model;
    let mut out = String::new();

    out.push_str("=== mapfit - two-phase decay fit ===\n");
    out.push_str(&format!("File: {}\n", file_label(output)));
    out.push_str(&format!(
        "Samples: {} | negative calibration values: {}\n",
        output.trace.len(),
        output.calibration.negative_count
    ));
    match &output.inflection {
        Some(inf) => out.push_str(&format!(
            "Inflection: t = {} s (sample {})\n",
            inf.time_at, inf.index
        )),
        None => out.push_str("Inflection: disabled (full trace fitted)\n"),
    }
    out.push_str(&format!(
        "Field gradient: a = {:0.6} T/m (r^2 = {:0.4})\n",
        output.field.slope, output.field.r_squared
    ));
    out.push_str(&format!(
        "Guesses: {} attempted, {} failed, {:.1} s\n",
        output.selection.attempted, output.selection.failed, output.fit_seconds
    ));

    out.push_str("\nBest fits:\n");
    for (metric, fit) in &output.selection.best {
        let radius = match (kind, fit.radius) {
            (ModelKind::RadiusChi, Some(r)) => format!(" r={:0.6e}", r.value),
            _ => String::new(),
        };
        let distance = match (*metric, fit.radius_distance) {
            (Metric::RadiusDistance, Some(d)) => format!(" dist={d:0.4e}"),
            _ => String::new(),
        };
        out.push_str(&format!(
            "  {:<16} chi={:0.6e}{radius} r_sq={:0.8} mse={:0.4e}{distance}\n",
            metric.display_name(),
            fit.chi.value,
            fit.r_squared,
            fit.mse,
        ));
    }

    out
}
