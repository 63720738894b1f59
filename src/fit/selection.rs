//! Multi-criterion best-fit tracking.
//!
//! The optimizer keeps one running optimum per enabled metric. The metrics
//! answer different questions (goodness of fit, parameter uncertainty,
//! agreement with an independent radius measurement), so their winners are
//! reported side by side and never collapsed into a single ranking.

use std::collections::BTreeMap;

use crate::domain::{GuessFit, Metric};

/// Output of the grid search: per-metric winners plus the full audit table.
#[derive(Debug, Clone)]
pub struct FitSelection {
    pub best: BTreeMap<Metric, GuessFit>,
    /// Every successful per-guess fit, in guess-index order.
    pub table: Vec<GuessFit>,
    /// Guesses actually attempted (after any budget truncation).
    pub attempted: usize,
    /// Guesses that produced no fit (bad seed, non-convergence, degenerate
    /// covariance).
    pub failed: usize,
    /// Grid entries dropped by the guess budget, if any.
    pub truncated: Option<usize>,
    /// Whether the wall-clock deadline expired before the grid finished.
    pub deadline_hit: bool,
}

/// Is `candidate` strictly better than `incumbent` under `metric`?
///
/// Strict comparisons mean the earliest guess (in grid iteration order) keeps
/// a tie. The table is traversed in index order, so the tie-break is
/// deterministic whether the fits were computed sequentially or in parallel.
fn strictly_better(candidate: &GuessFit, incumbent: &GuessFit, metric: Metric) -> bool {
    match metric {
        Metric::RSquared => candidate.r_squared > incumbent.r_squared,
        Metric::Mse => candidate.mse < incumbent.mse,
        Metric::StandardError => candidate.fit_std_error < incumbent.fit_std_error,
        Metric::RadiusDistance => match (candidate.radius_distance, incumbent.radius_distance) {
            (Some(c), Some(i)) => c < i,
            (Some(_), None) => true,
            _ => false,
        },
    }
}

fn applicable(fit: &GuessFit, metric: Metric) -> bool {
    match metric {
        Metric::RadiusDistance => fit.radius_distance.is_some(),
        _ => true,
    }
}

/// Pick the winner for each requested metric from the audit table.
///
/// `table` must be in guess-index order. Metrics with no applicable entries
/// are simply absent from the result.
pub fn select_best(table: &[GuessFit], metrics: &[Metric]) -> BTreeMap<Metric, GuessFit> {
    let mut best = BTreeMap::new();

    for &metric in metrics {
        let mut winner: Option<&GuessFit> = None;
        for fit in table {
            if !applicable(fit, metric) {
                continue;
            }
            match winner {
                None => winner = Some(fit),
                Some(current) => {
                    if strictly_better(fit, current, metric) {
                        winner = Some(fit);
                    }
                }
            }
        }
        if let Some(w) = winner {
            best.insert(metric, w.clone());
        }
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ParamEstimate;

    fn fit(
        guess_index: usize,
        r_squared: f64,
        mse: f64,
        fit_std_error: f64,
        radius_distance: Option<f64>,
    ) -> GuessFit {
        GuessFit {
            guess_index,
            seed_radius: Some(1e-7),
            seed_chi: 1e-4,
            radius: Some(ParamEstimate {
                value: 1e-7,
                std_error: 1e-9,
            }),
            chi: ParamEstimate {
                value: 1e-4,
                std_error: 1e-6,
            },
            covariance: vec![1e-18, 0.0, 0.0, 1e-12],
            correlation: Some(0.0),
            r_squared,
            mse,
            fit_std_error,
            radius_distance,
        }
    }

    #[test]
    fn metrics_pick_independent_winners() {
        // Guess 0 wins on R², guess 1 on MSE, guess 2 on standard error,
        // guess 3 on radius distance. Four distinct records must come back.
        let table = vec![
            fit(0, 0.999, 2.0, 3.0, Some(4.0)),
            fit(1, 0.90, 0.1, 3.0, Some(4.0)),
            fit(2, 0.90, 2.0, 0.5, Some(4.0)),
            fit(3, 0.90, 2.0, 3.0, Some(0.2)),
        ];
        let metrics = [
            Metric::RSquared,
            Metric::Mse,
            Metric::StandardError,
            Metric::RadiusDistance,
        ];

        let best = select_best(&table, &metrics);
        assert_eq!(best[&Metric::RSquared].guess_index, 0);
        assert_eq!(best[&Metric::Mse].guess_index, 1);
        assert_eq!(best[&Metric::StandardError].guess_index, 2);
        assert_eq!(best[&Metric::RadiusDistance].guess_index, 3);
    }

    #[test]
    fn ties_keep_the_earliest_guess() {
        let table = vec![fit(0, 0.95, 1.0, 1.0, None), fit(7, 0.95, 1.0, 1.0, None)];
        let best = select_best(&table, &[Metric::RSquared, Metric::Mse]);
        assert_eq!(best[&Metric::RSquared].guess_index, 0);
        assert_eq!(best[&Metric::Mse].guess_index, 0);
    }

    #[test]
    fn radius_distance_is_absent_without_applicable_entries() {
        let table = vec![fit(0, 0.95, 1.0, 1.0, None)];
        let best = select_best(&table, &[Metric::RadiusDistance]);
        assert!(best.is_empty());
    }
}
