//! Inflection detection and the two-phase shift.
//!
//! The fitted model describes steady magnetophoretic capture, not the initial
//! transient after the magnet is placed. We locate the point of steepest
//! concentration decrease (the minimum of the smoothed first derivative) and
//! fit only the trace from that point on, re-anchored in both time and
//! concentration.

use serde::Serialize;

use crate::error::AppError;
use crate::math::savgol_filter;

/// Result of the two-phase shift.
#[derive(Debug, Clone, Serialize)]
pub struct Inflection {
    /// Sample index of the steepest descent.
    pub index: usize,
    /// Original timestamp at that index, seconds.
    pub time_at: f64,
    /// Re-anchored concentration at the shift point; the `c0` used by the fit.
    pub c0: f64,
    /// `time[index..] - time[index]`.
    #[serde(skip)]
    pub time_shifted: Vec<f64>,
    /// `concentration[index..]`.
    #[serde(skip)]
    pub concentration_shifted: Vec<f64>,
    /// Smoothed first derivative over the full trace (kept for plotting).
    #[serde(skip)]
    pub derivative: Vec<f64>,
}

/// Locate the inflection point and produce the shifted series.
///
/// The search starts at `min_index_guard`, which protects against early-sample
/// noise dominating the true inflection. The comparison is strict, so a
/// derivative with no interior minimum after the guard (e.g. a monotone
/// increasing derivative) leaves the index at `min_index_guard`; that fallback
/// is deliberate, defined behavior.
pub fn find_inflection(
    time: &[f64],
    concentration: &[f64],
    min_index_guard: usize,
    smoothing_window: usize,
    poly_order: usize,
) -> Result<Inflection, AppError> {
    if time.len() != concentration.len() {
        return Err(AppError::data(format!(
            "Time and concentration lengths differ: {} vs {}.",
            time.len(),
            concentration.len()
        )));
    }
    if time.len() < 2 {
        return Err(AppError::data("Trace has fewer than two samples."));
    }
    if min_index_guard >= time.len() {
        return Err(AppError::data(format!(
            "Inflection guard ({min_index_guard}) is beyond the end of the trace ({} samples).",
            time.len()
        )));
    }

    let delta = time[1] - time[0];
    if !(delta.is_finite() && delta > 0.0) {
        return Err(AppError::data(format!(
            "Invalid sample spacing {delta} s at the start of the trace."
        )));
    }

    let derivative = savgol_filter(concentration, smoothing_window, poly_order, 1, delta)?;

    let mut index = min_index_guard;
    for i in (min_index_guard + 1)..derivative.len() {
        if derivative[i] < derivative[index] {
            index = i;
        }
    }

    let time_shifted: Vec<f64> = time[index..].iter().map(|&t| t - time[index]).collect();
    let concentration_shifted = concentration[index..].to_vec();
    let c0 = concentration_shifted[0];

    Ok(Inflection {
        index,
        time_at: time[index],
        c0,
        time_shifted,
        concentration_shifted,
        derivative,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_steepest_descent_of_a_sigmoid_drop() {
        // Concentration falls along a logistic curve centered at t = 10 s;
        // the steepest descent sits at the center.
        let dt = 0.1;
        let time: Vec<f64> = (0..201).map(|i| i as f64 * dt).collect();
        let conc: Vec<f64> = time
            .iter()
            .map(|&t| 1.0 / (1.0 + (2.0 * (t - 10.0)).exp()))
            .collect();

        let result = find_inflection(&time, &conc, 20, 11, 3).unwrap();
        assert!(
            (result.index as i64 - 100).unsigned_abs() <= 3,
            "expected the inflection near sample 100, got {}",
            result.index
        );
        assert!((result.time_shifted[0]).abs() < 1e-12);
        assert!((result.c0 - conc[result.index]).abs() < 1e-12);
        assert_eq!(
            result.concentration_shifted.len(),
            conc.len() - result.index
        );
    }

    #[test]
    fn monotone_trace_falls_back_to_the_guard_index() {
        // An exponential decay has a strictly increasing derivative, so there
        // is no interior minimum after the guard.
        let dt = 0.5;
        let time: Vec<f64> = (0..200).map(|i| i as f64 * dt).collect();
        let conc: Vec<f64> = time.iter().map(|&t| 5.0 * (-0.05 * t).exp()).collect();

        let guard = 20;
        let result = find_inflection(&time, &conc, guard, 11, 3).unwrap();
        assert_eq!(result.index, guard);
    }

    #[test]
    fn guard_beyond_trace_is_a_data_error() {
        let time = vec![0.0, 1.0, 2.0];
        let conc = vec![1.0, 0.9, 0.8];
        let err = find_inflection(&time, &conc, 10, 3, 1).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Data);
    }
}
