//! Shared domain types.
//!
//! These types are intentionally kept lightweight and serializable so they can be:
//!
//! - used in-memory during fitting
//! - exported to JSON alongside the text report
//! - reloaded later for comparisons across analysis runs

use std::path::PathBuf;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Inches to meters. Magnet logs record K&J catalog dimensions in inches.
pub const IN_TO_M: f64 = 0.0254;

/// Millimeters to meters. Magnet stand-off distances are logged in mm.
pub const MM_TO_M: f64 = 1.0e-3;

/// Suspension solvent. Determines dynamic viscosity and the (diamagnetic)
/// susceptibility entering the decay model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Solvent {
    Water,
    Dpbs,
}

impl Solvent {
    pub fn display_name(self) -> &'static str {
        match self {
            Solvent::Water => "Water",
            Solvent::Dpbs => "DPBS",
        }
    }

    /// Dynamic viscosity in Pa·s.
    pub fn viscosity(self) -> f64 {
        match self {
            Solvent::Water => 8.9e-4,
            Solvent::Dpbs => 0.89e-3,
        }
    }

    /// Volume magnetic susceptibility (dimensionless).
    pub fn susceptibility(self) -> f64 {
        match self {
            Solvent::Water => -9.04e-6,
            Solvent::Dpbs => -9.05e-6,
        }
    }
}

/// Neodymium magnet grade. Sets the remanent flux density of the field model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MagnetGrade {
    N42,
    N52,
}

impl MagnetGrade {
    pub fn display_name(self) -> &'static str {
        match self {
            MagnetGrade::N42 => "N42",
            MagnetGrade::N52 => "N52",
        }
    }

    /// Remanence B_r in tesla.
    pub fn remanence(self) -> f64 {
        match self {
            MagnetGrade::N42 => 1.32,
            MagnetGrade::N52 => 1.48,
        }
    }
}

/// Rectangular magnet geometry plus the optical sensing window.
///
/// All lengths are stored in meters. The sensing window is centered on the
/// distance from the magnet surface to the optical path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MagnetGeometry {
    /// Catalog name, e.g. a K&J product number (reporting only).
    pub name: Option<String>,
    pub length: f64,
    pub width: f64,
    pub thickness: f64,
    pub grade: MagnetGrade,
    /// Magnet top surface to optical path, meters.
    pub distance: f64,
    /// Half-width of the sensing window, meters.
    pub window_halfwidth: f64,
}

impl MagnetGeometry {
    /// Construct from logged units: catalog dimensions in inches, stand-off
    /// distance and window half-width in millimeters.
    pub fn from_logged_units(
        name: Option<String>,
        length_in: f64,
        width_in: f64,
        thickness_in: f64,
        grade: MagnetGrade,
        distance_mm: f64,
        window_halfwidth_mm: f64,
    ) -> Self {
        Self {
            name,
            length: length_in * IN_TO_M,
            width: width_in * IN_TO_M,
            thickness: thickness_in * IN_TO_M,
            grade,
            distance: distance_mm * MM_TO_M,
            window_halfwidth: window_halfwidth_mm * MM_TO_M,
        }
    }

    pub fn remanence(&self) -> f64 {
        self.grade.remanence()
    }

    /// Sensing window `[z_low, z_high]` in meters.
    pub fn sensing_window(&self) -> (f64, f64) {
        (
            self.distance - self.window_halfwidth,
            self.distance + self.window_halfwidth,
        )
    }
}

/// Known particle radius from an independent measurement, with uncertainty.
///
/// Enables the radius-distance fit criterion and (by default) the lin-spaced
/// radius guess axis across `value ± std`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KnownRadius {
    /// Radius in meters.
    pub value: f64,
    /// One standard deviation, meters.
    pub std: f64,
}

/// Nanoparticle sample metadata required before any fitting begins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleProperties {
    pub material: String,
    /// Particle material density, kg/m^3.
    pub density: f64,
    pub solvent: Solvent,
    /// Initial concentration c0, mg/mL.
    pub initial_concentration: f64,
    pub known_radius: Option<KnownRadius>,
}

/// Which decay model to fit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ModelKind {
    /// Two-parameter model: radius and susceptibility both free.
    RadiusChi,
    /// Single-parameter model: radius fixed to the known value, chi free.
    ChiOnly,
}

impl ModelKind {
    pub fn display_name(self) -> &'static str {
        match self {
            ModelKind::RadiusChi => "r_chi_model",
            ModelKind::ChiOnly => "chi_model",
        }
    }

    /// Number of free parameters.
    pub fn param_count(self) -> usize {
        match self {
            ModelKind::RadiusChi => 2,
            ModelKind::ChiOnly => 1,
        }
    }
}

/// Best-fit selection criterion.
///
/// The optimizer tracks one running optimum per enabled metric. These are
/// deliberately independent: different downstream uses (point estimate,
/// uncertainty quantification, validation against a reference radius) want
/// different winners, so the results are never collapsed into one ranking.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Highest coefficient of determination.
    #[value(name = "r_squared")]
    RSquared,
    /// Lowest mean squared error.
    #[value(name = "mse")]
    Mse,
    /// Lowest overall fit standard error (sqrt of covariance trace).
    #[value(name = "standard_error")]
    StandardError,
    /// Smallest |fitted radius - known radius|. Needs a known radius.
    #[value(name = "radius_distance")]
    RadiusDistance,
}

impl Metric {
    pub fn display_name(self) -> &'static str {
        match self {
            Metric::RSquared => "r_squared",
            Metric::Mse => "mse",
            Metric::StandardError => "standard_error",
            Metric::RadiusDistance => "radius_distance",
        }
    }
}

/// Physical constants for one analysis run, handed to the decay model.
///
/// Built once per trace from sample, solvent, and field-fit results; never
/// ambient state.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FitContext {
    /// Anchor concentration at t = 0 of the fitting window, mg/mL.
    pub c0: f64,
    /// Field gradient coefficient, T/m.
    pub a: f64,
    /// Solvent dynamic viscosity, Pa·s.
    pub eta: f64,
    /// Particle density, kg/m^3.
    pub rho_p: f64,
    /// Solvent magnetic susceptibility.
    pub chi_s: f64,
}

/// A fitted parameter with its standard error.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamEstimate {
    pub value: f64,
    pub std_error: f64,
}

/// One successful per-guess fit with its diagnostics.
///
/// All successful guesses are retained in the audit table; the per-metric
/// "best" records are drawn from the same pool.
#[derive(Debug, Clone, Serialize)]
pub struct GuessFit {
    /// Index into the guess grid (iteration order).
    pub guess_index: usize,
    pub seed_radius: Option<f64>,
    pub seed_chi: f64,
    /// Fitted radius; `None` for the single-parameter model.
    pub radius: Option<ParamEstimate>,
    pub chi: ParamEstimate,
    /// Row-major parameter covariance (p x p).
    pub covariance: Vec<f64>,
    /// Parameter correlation; only defined for the two-parameter model.
    pub correlation: Option<f64>,
    pub r_squared: f64,
    pub mse: f64,
    /// sqrt of the covariance trace.
    pub fit_std_error: f64,
    /// |fitted radius - known radius|, when a known radius was supplied.
    pub radius_distance: Option<f64>,
}

/// A full run's configuration as understood by the pipeline.
///
/// This is derived from CLI flags (plus defaults).
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub out_dir: PathBuf,
    pub model_kind: ModelKind,

    /// Trailing samples used as the fully-transmissive calibration reference.
    pub trailing_n: usize,

    /// Apply the two-phase shift (inflection detection) before fitting.
    pub adjust: bool,
    pub min_index_guard: usize,
    pub smoothing_window: usize,
    pub poly_order: usize,

    pub chi_guesses: usize,
    pub chi_guess_min: f64,
    pub chi_guess_max: f64,
    pub r_guesses: usize,
    pub r_guess_min: f64,
    pub r_guess_max: f64,

    /// Explicit bound overrides; `None` falls back to model defaults
    /// (or the known-radius band when one is available).
    pub r_lower: Option<f64>,
    pub r_upper: Option<f64>,
    pub chi_lower: Option<f64>,
    pub chi_upper: Option<f64>,

    /// Enabled best-fit criteria. Empty means "all applicable".
    pub metrics: Vec<Metric>,

    /// Optional guess-budget cutoff (truncates the grid head).
    pub max_guesses: Option<usize>,
    /// Optional wall-clock deadline for the grid search, seconds.
    pub deadline_secs: Option<u64>,
    /// Solver evaluation budget per guess.
    pub patience: usize,

    pub plot: bool,
    pub save: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn solvent_lookup_table() {
        assert!((Solvent::Water.viscosity() - 8.9e-4).abs() < 1e-12);
        assert!((Solvent::Water.susceptibility() + 9.04e-6).abs() < 1e-12);
        assert!((Solvent::Dpbs.viscosity() - 0.89e-3).abs() < 1e-12);
        assert!((Solvent::Dpbs.susceptibility() + 9.05e-6).abs() < 1e-12);
    }

    #[test]
    fn magnet_geometry_converts_logged_units() {
        let geom = MagnetGeometry::from_logged_units(
            Some("B842".to_string()),
            2.0,
            1.0,
            0.5,
            MagnetGrade::N52,
            6.0,
            0.5,
        );
        assert!((geom.length - 0.0508).abs() < 1e-12);
        assert!((geom.thickness - 0.0127).abs() < 1e-12);
        assert!((geom.remanence() - 1.48).abs() < 1e-12);
        let (lo, hi) = geom.sensing_window();
        assert!((lo - 0.0055).abs() < 1e-12);
        assert!((hi - 0.0065).abs() < 1e-12);
    }
}
