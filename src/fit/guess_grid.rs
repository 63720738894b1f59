//! Guess grid generation.
//!
//! The decay model is fit by seeding bounded least squares from a
//! deterministic grid of initial guesses.
//!
//! Why a grid?
//! - The objective has local minima; one seed is not trustworthy.
//! - A grid is deterministic given the same inputs/flags.
//! - Each seed is independent, so the grid parallelizes trivially.
//!
//! Susceptibility spans orders of magnitude, so its axis is log-spaced.
//! The radius axis is log-spaced by default and lin-spaced across
//! `known ± std` when an independently measured radius is available.

use serde::Serialize;

use crate::domain::ModelKind;
use crate::error::AppError;

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AppError::config(format!(
            "Invalid log-spaced range: min={min}, max={max} (must be finite, >0, and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Guess axis needs at least 2 values."));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    Ok(out)
}

/// Generate `steps` evenly spaced points between `min` and `max` (inclusive).
pub fn lin_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AppError> {
    if !(min.is_finite() && max.is_finite() && max > min) {
        return Err(AppError::config(format!(
            "Invalid lin-spaced range: min={min}, max={max} (must be finite and max>min)."
        )));
    }
    if steps < 2 {
        return Err(AppError::config("Guess axis needs at least 2 values."));
    }

    let step = (max - min) / (steps as f64 - 1.0);
    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push(min + step * i as f64);
    }
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Spacing {
    Log,
    Lin,
}

/// One guess axis: range, count, spacing.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct AxisSpec {
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub spacing: Spacing,
}

impl AxisSpec {
    pub fn log(min: f64, max: f64, count: usize) -> Self {
        Self {
            min,
            max,
            count,
            spacing: Spacing::Log,
        }
    }

    pub fn lin(min: f64, max: f64, count: usize) -> Self {
        Self {
            min,
            max,
            count,
            spacing: Spacing::Lin,
        }
    }

    pub fn values(&self) -> Result<Vec<f64>, AppError> {
        match self.spacing {
            Spacing::Log => log_space(self.min, self.max, self.count),
            Spacing::Lin => lin_space(self.min, self.max, self.count),
        }
    }

    /// The range echo used by reports and no-viable-fit errors.
    pub fn describe(&self) -> String {
        let spacing = match self.spacing {
            Spacing::Log => "log",
            Spacing::Lin => "lin",
        };
        format!(
            "[{:.4e}, {:.4e}] ({} values with {spacing} spacing)",
            self.min, self.max, self.count
        )
    }
}

/// The full seed grid, plus the axis specs it was generated from.
#[derive(Debug, Clone, Serialize)]
pub struct GuessGrid {
    pub model: ModelKind,
    pub radius_axis: Option<AxisSpec>,
    pub chi_axis: AxisSpec,
    /// Seed vectors in iteration order: `[r, chi]` or `[chi]`.
    #[serde(skip)]
    pub entries: Vec<Vec<f64>>,
}

impl GuessGrid {
    /// Cartesian product of the radius and chi axes, radius-major.
    pub fn two_parameter(radius_axis: AxisSpec, chi_axis: AxisSpec) -> Result<Self, AppError> {
        let radii = radius_axis.values()?;
        let chis = chi_axis.values()?;

        let mut entries = Vec::with_capacity(radii.len() * chis.len());
        for &r in &radii {
            for &chi in &chis {
                entries.push(vec![r, chi]);
            }
        }

        Ok(Self {
            model: ModelKind::RadiusChi,
            radius_axis: Some(radius_axis),
            chi_axis,
            entries,
        })
    }

    pub fn single_parameter(chi_axis: AxisSpec) -> Result<Self, AppError> {
        let entries = chi_axis.values()?.into_iter().map(|chi| vec![chi]).collect();
        Ok(Self {
            model: ModelKind::ChiOnly,
            radius_axis: None,
            chi_axis,
            entries,
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Multi-line guess-range echo for reports and diagnostics.
    pub fn describe(&self) -> String {
        let mut out = String::new();
        if let Some(radius_axis) = &self.radius_axis {
            out.push_str(&format!("\tr: {}\n", radius_axis.describe()));
        }
        out.push_str(&format!("\tchi: {}", self.chi_axis.describe()));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(1e-6, 1e3, 10).unwrap();
        assert_eq!(v.len(), 10);
        assert!((v[0] - 1e-6).abs() < 1e-18);
        assert!((v[9] - 1e3).abs() < 1e-9);
        assert!(v.windows(2).all(|w| w[1] > w[0]));
    }

    #[test]
    fn lin_space_includes_endpoints() {
        let v = lin_space(-2.0, 2.0, 5).unwrap();
        assert_eq!(v, vec![-2.0, -1.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn negative_log_range_is_a_config_error() {
        assert!(log_space(-1.0, 1.0, 5).is_err());
        assert!(log_space(1.0, 1.0, 5).is_err());
    }

    #[test]
    fn two_parameter_grid_is_radius_major() {
        let grid = GuessGrid::two_parameter(
            AxisSpec::lin(1.0, 2.0, 2),
            AxisSpec::lin(10.0, 20.0, 2),
        )
        .unwrap();

        assert_eq!(grid.len(), 4);
        assert_eq!(grid.entries[0], vec![1.0, 10.0]);
        assert_eq!(grid.entries[1], vec![1.0, 20.0]);
        assert_eq!(grid.entries[2], vec![2.0, 10.0]);
        assert_eq!(grid.entries[3], vec![2.0, 20.0]);
    }

    #[test]
    fn single_parameter_grid_has_one_entry_per_chi() {
        let grid = GuessGrid::single_parameter(AxisSpec::log(1e-6, 1e2, 8)).unwrap();
        assert_eq!(grid.len(), 8);
        assert!(grid.entries.iter().all(|e| e.len() == 1));
    }
}
