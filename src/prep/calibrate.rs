//! Intensity-to-concentration calibration.
//!
//! The trailing samples of a run are taken as the fully-transmissive
//! reference ("solvent only"), intensity is converted to attenuation, and a
//! two-point affine map sends the first attenuation sample to `c0` and the
//! trailing attenuation mean to zero.

use serde::Serialize;

use crate::error::AppError;

/// Calibration output plus diagnostics for the report.
#[derive(Debug, Clone, Serialize)]
pub struct Calibration {
    #[serde(skip)]
    pub concentration: Vec<f64>,
    pub baseline_intensity: f64,
    /// Attenuation of the first sample (maps to `c0`).
    pub att0: f64,
    /// Trailing-window attenuation mean (maps to zero concentration).
    pub attf: f64,
    /// Number of negative concentration values produced by the affine map.
    /// Nonzero counts indicate calibration quality problems but are tolerated.
    pub negative_count: usize,
}

/// Convert a lux trace to a concentration trace.
///
/// `trailing_n` samples at the end of the run are averaged into the
/// fully-transmissive reference.
pub fn calibrate(intensity: &[f64], c0: f64, trailing_n: usize) -> Result<Calibration, AppError> {
    if trailing_n == 0 {
        return Err(AppError::config("Calibration window must be at least 1 sample."));
    }
    if !(c0.is_finite() && c0 > 0.0) {
        return Err(AppError::config(format!(
            "Initial concentration must be finite and positive, got {c0}."
        )));
    }
    if intensity.len() < trailing_n {
        return Err(AppError::data(format!(
            "Trace has {} samples, fewer than the {trailing_n}-sample calibration window.",
            intensity.len()
        )));
    }
    if let Some(bad) = intensity.iter().find(|v| !(v.is_finite() && **v > 0.0)) {
        return Err(AppError::data(format!(
            "Non-positive intensity value {bad} lux; transmission is undefined."
        )));
    }

    let tail = &intensity[intensity.len() - trailing_n..];
    let baseline_intensity = tail.iter().sum::<f64>() / trailing_n as f64;

    let attenuation: Vec<f64> = intensity
        .iter()
        .map(|&lux| -(lux / baseline_intensity).log10())
        .collect();

    let att0 = attenuation[0];
    let attf = attenuation[attenuation.len() - trailing_n..]
        .iter()
        .sum::<f64>()
        / trailing_n as f64;

    let span = att0 - attf;
    if span.abs() <= 1.0e-12 * att0.abs().max(1.0) {
        return Err(AppError::data(format!(
            "Degenerate calibration: initial attenuation ({att0:.6e}) equals the trailing mean ({attf:.6e}); the trace is flat."
        )));
    }

    let gain = c0 / span;
    let offset = attf * c0 / (attf - att0);
    let concentration: Vec<f64> = attenuation.iter().map(|&att| gain * att + offset).collect();

    let negative_count = concentration.iter().filter(|&&c| c < 0.0).count();
    if negative_count > 0 {
        log::warn!(
            "Calibration produced {negative_count} negative concentration values; continuing."
        );
    }

    Ok(Calibration {
        concentration,
        baseline_intensity,
        att0,
        attf,
        negative_count,
    })
}
