//! Run spec JSON: per-run sample and magnet metadata.
//!
//! The lab's spreadsheet logs are out of scope here; whatever front-end reads
//! them is expected to hand the core a small JSON document with the typed
//! scalars the fit actually needs. Validation happens up front so bad
//! metadata is reported before any fitting begins.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::domain::{KnownRadius, MagnetGeometry, MagnetGrade, SampleProperties, Solvent};
use crate::error::AppError;

/// On-disk run spec schema.
#[derive(Debug, Clone, Deserialize)]
pub struct RunSpec {
    pub sample: SampleSpec,
    pub magnet: MagnetSpec,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SampleSpec {
    pub material: String,
    /// kg/m^3.
    pub density: f64,
    pub solvent: Solvent,
    /// mg/mL.
    pub initial_concentration: f64,
    /// Independently measured radius, meters. Zero or absent means unknown.
    #[serde(default)]
    pub radius: Option<f64>,
    /// One standard deviation of the measured radius, meters.
    #[serde(default)]
    pub radius_std: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MagnetSpec {
    /// Catalog name, e.g. a K&J product number.
    #[serde(default)]
    pub name: Option<String>,
    pub length_in: f64,
    pub width_in: f64,
    pub thickness_in: f64,
    pub grade: MagnetGrade,
    /// Magnet top surface to optical path, mm.
    pub distance_mm: f64,
    /// Sensing window half-width, mm.
    #[serde(default = "default_window_halfwidth")]
    pub window_halfwidth_mm: f64,
}

fn default_window_halfwidth() -> f64 {
    0.5
}

/// Read and parse a run spec file.
pub fn read_run_spec(path: &Path) -> Result<RunSpec, AppError> {
    let text = fs::read_to_string(path).map_err(|e| {
        AppError::config(format!("Failed to read run spec '{}': {e}", path.display()))
    })?;
    parse_run_spec(&text)
        .map_err(|e| AppError::config(format!("Invalid run spec '{}': {e}", path.display())))
}

/// Parse a run spec from JSON text.
pub fn parse_run_spec(text: &str) -> Result<RunSpec, serde_json::Error> {
    serde_json::from_str(text)
}

impl RunSpec {
    /// Validate and convert the sample section.
    pub fn sample_properties(&self) -> Result<SampleProperties, AppError> {
        let s = &self.sample;
        if !(s.density.is_finite() && s.density > 0.0) {
            return Err(AppError::config(format!(
                "Sample density must be positive kg/m^3, got {}.",
                s.density
            )));
        }
        if !(s.initial_concentration.is_finite() && s.initial_concentration > 0.0) {
            return Err(AppError::config(format!(
                "Initial concentration must be positive mg/mL, got {}.",
                s.initial_concentration
            )));
        }

        // A logged radius of zero means "unknown" in the lab's convention.
        let known_radius = match s.radius {
            None => None,
            Some(r) if r == 0.0 => None,
            Some(r) => {
                if !(r.is_finite() && r > 0.0) {
                    return Err(AppError::config(format!(
                        "Known radius must be positive meters, got {r}."
                    )));
                }
                let std = s.radius_std.ok_or_else(|| {
                    AppError::config("A known radius requires radius_std in the run spec.")
                })?;
                if !(std.is_finite() && std > 0.0 && std < r) {
                    return Err(AppError::config(format!(
                        "radius_std must satisfy 0 < std < radius, got std={std}, radius={r}."
                    )));
                }
                Some(KnownRadius { value: r, std })
            }
        };

        Ok(SampleProperties {
            material: s.material.clone(),
            density: s.density,
            solvent: s.solvent,
            initial_concentration: s.initial_concentration,
            known_radius,
        })
    }

    /// Validate and convert the magnet section.
    pub fn magnet_geometry(&self) -> Result<MagnetGeometry, AppError> {
        let m = &self.magnet;
        for (label, v) in [
            ("length_in", m.length_in),
            ("width_in", m.width_in),
            ("thickness_in", m.thickness_in),
            ("distance_mm", m.distance_mm),
            ("window_halfwidth_mm", m.window_halfwidth_mm),
        ] {
            if !(v.is_finite() && v > 0.0) {
                return Err(AppError::config(format!(
                    "Magnet {label} must be positive, got {v}."
                )));
            }
        }
        if m.distance_mm <= m.window_halfwidth_mm {
            return Err(AppError::config(format!(
                "Sensing window extends below the magnet surface: distance {} mm, half-width {} mm.",
                m.distance_mm, m.window_halfwidth_mm
            )));
        }

        Ok(MagnetGeometry::from_logged_units(
            m.name.clone(),
            m.length_in,
            m.width_in,
            m.thickness_in,
            m.grade,
            m.distance_mm,
            m.window_halfwidth_mm,
        ))
    }
}
