//! Magnetic field gradient fit.
//!
//! The decay model only needs the local slope `a` of the on-axis field inside
//! the optical sensing window. We evaluate the closed-form rectangular-magnet
//! field model on a dense grid across the window and regress `B` against `z`.
//! The regression is closed-form, so this step is deterministic and cannot
//! fail to converge.

use serde::Serialize;

use crate::domain::MagnetGeometry;
use crate::error::AppError;
use crate::math::linear_fit;

/// Dense grid size across the sensing window.
const FIELD_SAMPLES: usize = 1000;

/// On-axis flux density of a rectangular magnet at distance `z` from its
/// surface, in tesla. All lengths in meters.
pub fn on_axis_field(z: f64, b_r: f64, length: f64, width: f64, thickness: f64) -> f64 {
    let lw = length * length + width * width;
    let face = |d: f64| {
        (length * width / (2.0 * d * (4.0 * d * d + lw).sqrt())).atan()
    };
    (b_r / std::f64::consts::PI) * (face(z) - face(z + thickness))
}

/// Linearized field inside the sensing window. `slope` is the gradient
/// coefficient `a` consumed by the decay model; intercept and r² are kept for
/// the report.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FieldFit {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
}

impl FieldFit {
    /// The fit line as echoed into analysis reports.
    pub fn equation(&self) -> String {
        format!(
            "B = {:.8} * z + {:.8}\n\tr^2 = {:.4}",
            self.slope, self.intercept, self.r_squared
        )
    }
}

/// Fit the field gradient coefficient for one magnet configuration.
pub fn fit_field_gradient(geom: &MagnetGeometry) -> Result<FieldFit, AppError> {
    let (z_low, z_high) = geom.sensing_window();
    if !(z_low.is_finite() && z_high.is_finite() && z_low > 0.0 && z_high > z_low) {
        return Err(AppError::config(format!(
            "Invalid sensing window [{z_low}, {z_high}] m; the window must sit strictly above the magnet surface."
        )));
    }
    if !(geom.length > 0.0 && geom.width > 0.0 && geom.thickness > 0.0) {
        return Err(AppError::config(
            "Magnet dimensions must all be positive.",
        ));
    }

    let b_r = geom.remanence();
    let step = (z_high - z_low) / (FIELD_SAMPLES as f64 - 1.0);

    let mut z_grid = Vec::with_capacity(FIELD_SAMPLES);
    let mut b_grid = Vec::with_capacity(FIELD_SAMPLES);
    for i in 0..FIELD_SAMPLES {
        let z = z_low + step * i as f64;
        z_grid.push(z);
        b_grid.push(on_axis_field(z, b_r, geom.length, geom.width, geom.thickness));
    }

    let fit = linear_fit(&z_grid, &b_grid)
        .ok_or_else(|| AppError::config("Degenerate field regression over the sensing window."))?;

    Ok(FieldFit {
        slope: fit.slope,
        intercept: fit.intercept,
        r_squared: fit.r_squared,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::MagnetGrade;

    fn geometry() -> MagnetGeometry {
        MagnetGeometry::from_logged_units(None, 2.0, 1.0, 0.5, MagnetGrade::N52, 6.0, 0.5)
    }

    #[test]
    fn slope_matches_local_finite_difference() {
        let geom = geometry();
        let fit = fit_field_gradient(&geom).unwrap();

        // The window is narrow, so the regression slope should be close to the
        // centered difference at the window midpoint.
        let z_mid = geom.distance;
        let h = 1e-5;
        let b_r = geom.remanence();
        let db = (on_axis_field(z_mid + h, b_r, geom.length, geom.width, geom.thickness)
            - on_axis_field(z_mid - h, b_r, geom.length, geom.width, geom.thickness))
            / (2.0 * h);

        assert!(fit.slope < 0.0, "field should fall off with distance");
        assert!(
            ((fit.slope - db) / db).abs() < 0.02,
            "slope {} vs finite difference {db}",
            fit.slope
        );
        assert!(fit.r_squared > 0.99);
    }

    #[test]
    fn window_below_surface_is_a_config_error() {
        let geom =
            MagnetGeometry::from_logged_units(None, 2.0, 1.0, 0.5, MagnetGrade::N42, 0.3, 0.5);
        let err = fit_field_gradient(&geom).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn field_is_deterministic() {
        let geom = geometry();
        let a = fit_field_gradient(&geom).unwrap();
        let b = fit_field_gradient(&geom).unwrap();
        assert_eq!(a.slope, b.slope);
        assert_eq!(a.intercept, b.intercept);
    }
}
