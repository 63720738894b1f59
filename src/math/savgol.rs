//! Savitzky–Golay smoothing and differentiation.
//!
//! The inflection detector needs the first derivative of a noisy concentration
//! curve. Savitzky–Golay estimates it by fitting a low-order polynomial to a
//! sliding window by least squares and reading the derivative of that
//! polynomial at the window center.
//!
//! Because the fit is linear in the samples, the interior of the signal
//! reduces to a fixed convolution stencil (`savgol_coeffs`). The first and
//! last half-windows cannot be centered; there we fit a polynomial to the
//! first/last full window and evaluate its derivative at each edge position,
//! matching the polynomial-interpolation edge treatment of the usual
//! scientific-stack implementation.

use nalgebra::{DMatrix, DVector};

use crate::error::AppError;

fn factorial(k: usize) -> f64 {
    (1..=k).map(|v| v as f64).product()
}

/// Least-squares polynomial fit operator for the given sample positions:
/// maps window samples to polynomial coefficients (constant term first).
fn polyfit_operator(positions: &[f64], order: usize) -> Option<DMatrix<f64>> {
    let n = positions.len();
    let mut vandermonde = DMatrix::<f64>::zeros(n, order + 1);
    for (i, &x) in positions.iter().enumerate() {
        for j in 0..=order {
            vandermonde[(i, j)] = x.powi(j as i32);
        }
    }
    vandermonde.pseudo_inverse(1e-10).ok()
}

/// Evaluate the `deriv`-th derivative of a polynomial (coefficients in
/// ascending order) at `x`.
fn poly_derivative_at(coeffs: &[f64], deriv: usize, x: f64) -> f64 {
    let mut acc = 0.0;
    for (k, &c) in coeffs.iter().enumerate() {
        if k < deriv {
            continue;
        }
        let mut falling = 1.0;
        for j in (k - deriv + 1)..=k {
            falling *= j as f64;
        }
        acc += c * falling * x.powi((k - deriv) as i32);
    }
    acc
}

fn validate(window: usize, order: usize, deriv: usize, delta: f64) -> Result<(), AppError> {
    if window % 2 == 0 || window < 3 {
        return Err(AppError::config(format!(
            "Smoothing window must be an odd number >= 3, got {window}."
        )));
    }
    if order >= window {
        return Err(AppError::config(format!(
            "Polynomial order ({order}) must be smaller than the smoothing window ({window})."
        )));
    }
    if deriv > order {
        return Err(AppError::config(format!(
            "Derivative order ({deriv}) cannot exceed polynomial order ({order})."
        )));
    }
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AppError::config(format!(
            "Sample spacing must be finite and positive, got {delta}."
        )));
    }
    Ok(())
}

/// Centered convolution stencil for the `deriv`-th derivative.
///
/// `coeffs[k]` weights the sample at offset `k - window/2` from the center.
pub fn savgol_coeffs(
    window: usize,
    order: usize,
    deriv: usize,
    delta: f64,
) -> Result<Vec<f64>, AppError> {
    validate(window, order, deriv, delta)?;

    let half = (window / 2) as isize;
    let positions: Vec<f64> = (-half..=half).map(|i| i as f64).collect();
    let operator = polyfit_operator(&positions, order)
        .ok_or_else(|| AppError::config("Degenerate Savitzky-Golay design matrix."))?;

    let scale = factorial(deriv) / delta.powi(deriv as i32);
    Ok(operator.row(deriv).iter().map(|c| c * scale).collect())
}

/// Apply a Savitzky–Golay filter to `y`, returning the smoothed signal
/// (`deriv = 0`) or its `deriv`-th derivative with respect to time.
pub fn savgol_filter(
    y: &[f64],
    window: usize,
    order: usize,
    deriv: usize,
    delta: f64,
) -> Result<Vec<f64>, AppError> {
    let coeffs = savgol_coeffs(window, order, deriv, delta)?;

    let n = y.len();
    if n < window {
        return Err(AppError::data(format!(
            "Trace too short to smooth: {n} samples < window of {window}."
        )));
    }

    let half = window / 2;
    let scale = 1.0 / delta.powi(deriv as i32);
    let mut out = vec![0.0; n];

    for i in half..(n - half) {
        let mut acc = 0.0;
        for k in 0..window {
            acc += coeffs[k] * y[i - half + k];
        }
        out[i] = acc;
    }

    // Edges: fit the first/last full window and evaluate the polynomial's
    // derivative at each uncovered position.
    let positions: Vec<f64> = (0..window).map(|i| i as f64).collect();
    let operator = polyfit_operator(&positions, order)
        .ok_or_else(|| AppError::config("Degenerate Savitzky-Golay design matrix."))?;

    let head = &operator * DVector::from_column_slice(&y[..window]);
    for i in 0..half {
        out[i] = poly_derivative_at(head.as_slice(), deriv, i as f64) * scale;
    }

    let tail = &operator * DVector::from_column_slice(&y[(n - window)..]);
    for i in (n - half)..n {
        let x = (i - (n - window)) as f64;
        out[i] = poly_derivative_at(tail.as_slice(), deriv, x) * scale;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivative_exact_on_cubic() {
        // A cubic is inside the model space of an order-3 fit, so the
        // derivative estimate is exact everywhere, edges included.
        let dt = 0.5;
        let t: Vec<f64> = (0..25).map(|i| i as f64 * dt).collect();
        let y: Vec<f64> = t.iter().map(|&ti| ti * ti * ti).collect();

        let dy = savgol_filter(&y, 7, 3, 1, dt).unwrap();
        for (i, &ti) in t.iter().enumerate() {
            let expected = 3.0 * ti * ti;
            assert!(
                (dy[i] - expected).abs() < 1e-6,
                "derivative mismatch at i={i}: got {} expected {expected}",
                dy[i]
            );
        }
    }

    #[test]
    fn smoothing_preserves_polynomial() {
        let dt = 1.0;
        let y: Vec<f64> = (0..40).map(|i| {
            let x = i as f64;
            2.0 + 0.5 * x - 0.01 * x * x
        }).collect();

        let smoothed = savgol_filter(&y, 11, 2, 0, dt).unwrap();
        for i in 0..y.len() {
            assert!((smoothed[i] - y[i]).abs() < 1e-7);
        }
    }

    #[test]
    fn even_window_is_a_config_error() {
        let y = vec![0.0; 100];
        let err = savgol_filter(&y, 50, 3, 1, 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn short_trace_is_a_data_error() {
        let y = vec![0.0; 10];
        let err = savgol_filter(&y, 51, 3, 1, 1.0).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }
}
