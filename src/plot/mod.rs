//! Diagnostic plot rendering.
//!
//! One SVG per analyzed trace: the calibrated concentration with the
//! per-metric fitted curves overlaid, and (when the two-phase shift is
//! active) the smoothed derivative with the inflection marker underneath.
//! Content over styling; the numbers worth reading are in the report.

use std::path::Path;

use plotters::coord::Shift;
use plotters::prelude::*;

use crate::app::pipeline::RunOutput;
use crate::domain::Metric;
use crate::error::AppError;
use crate::model::DecayModel;

const DATA_COLOR: RGBColor = RGBColor(0xee, 0x77, 0x33);
const MARKER_COLOR: RGBColor = RGBColor(0x99, 0x99, 0x99);

fn metric_color(metric: Metric) -> RGBColor {
    match metric {
        Metric::RSquared => RGBColor(0x86, 0x45, 0xa3),
        Metric::Mse => RGBColor(0x00, 0x99, 0x88),
        Metric::StandardError => RGBColor(0x33, 0xbb, 0xee),
        Metric::RadiusDistance => RGBColor(0xcc, 0x33, 0x11),
    }
}

fn plot_err(e: impl std::fmt::Display) -> AppError {
    AppError::config(format!("Failed to render plot: {e}"))
}

fn finite_bounds(values: impl Iterator<Item = f64>) -> Option<(f64, f64)> {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for v in values.filter(|v| v.is_finite()) {
        min = min.min(v);
        max = max.max(v);
    }
    (min < max).then_some((min, max))
}

/// Render the diagnostic SVG for one finished analysis.
pub fn render_diagnostic_svg(path: &Path, output: &RunOutput) -> Result<(), AppError> {
    let model = output.model()?;
    let root = SVGBackend::new(path, (900, 700)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    if output.inflection.is_some() {
        let (upper, lower) = root.split_vertically(430);
        draw_concentration(&upper, output, &model)?;
        draw_derivative(&lower, output)?;
    } else {
        draw_concentration(&root, output, &model)?;
    }

    root.present().map_err(plot_err)?;
    Ok(())
}

fn draw_concentration<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    output: &RunOutput,
    model: &DecayModel,
) -> Result<(), AppError> {
    let time = &output.trace.time;
    let conc = &output.calibration.concentration;
    let shift = output.inflection.as_ref().map(|i| i.time_at).unwrap_or(0.0);

    // Fitted curves per metric, on the absolute time axis.
    let mut curves: Vec<(Metric, Vec<(f64, f64)>)> = Vec::new();
    for (&metric, fit) in &output.selection.best {
        let params = output.params_of(fit);
        let series: Vec<(f64, f64)> = output
            .fit_time
            .iter()
            .map(|&t| (t + shift, model.concentration(t, &params)))
            .collect();
        curves.push((metric, series));
    }

    let (x_min, x_max) =
        finite_bounds(time.iter().copied()).ok_or_else(|| plot_err("empty time axis"))?;
    let all_y = conc
        .iter()
        .copied()
        .chain(curves.iter().flat_map(|(_, s)| s.iter().map(|&(_, y)| y)));
    let (y_min, y_max) = finite_bounds(all_y).ok_or_else(|| plot_err("empty value range"))?;
    let pad = 0.05 * (y_max - y_min).max(1e-12);

    let label = output
        .trace_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(label, ("sans-serif", 16))
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Concentration (mg/mL)")
        .label_style(("sans-serif", 12))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            time.iter().copied().zip(conc.iter().copied()),
            &DATA_COLOR,
        ))
        .map_err(plot_err)?
        .label("Data")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], DATA_COLOR));

    for (metric, series) in &curves {
        let color = metric_color(*metric);
        chart
            .draw_series(LineSeries::new(series.iter().copied(), &color))
            .map_err(plot_err)?
            .label(format!("best {}", metric.display_name()))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
    }

    if let Some(inf) = &output.inflection {
        chart
            .draw_series(LineSeries::new(
                vec![(inf.time_at, y_min - pad), (inf.time_at, y_max + pad)],
                &MARKER_COLOR,
            ))
            .map_err(plot_err)?;
    }

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

fn draw_derivative<DB: DrawingBackend>(
    area: &DrawingArea<DB, Shift>,
    output: &RunOutput,
) -> Result<(), AppError> {
    let Some(inf) = &output.inflection else {
        return Ok(());
    };
    let time = &output.trace.time;

    let (x_min, x_max) =
        finite_bounds(time.iter().copied()).ok_or_else(|| plot_err("empty time axis"))?;
    let (y_min, y_max) = finite_bounds(inf.derivative.iter().copied())
        .ok_or_else(|| plot_err("empty derivative range"))?;
    let pad = 0.05 * (y_max - y_min).max(1e-12);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(x_min..x_max, (y_min - pad)..(y_max + pad))
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Time (s)")
        .y_desc("Smoothed dC/dt (mg/mL/s)")
        .label_style(("sans-serif", 12))
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            time.iter().copied().zip(inf.derivative.iter().copied()),
            &DATA_COLOR,
        ))
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(
            vec![(inf.time_at, y_min - pad), (inf.time_at, y_max + pad)],
            &MARKER_COLOR,
        ))
        .map_err(plot_err)?;

    Ok(())
}
