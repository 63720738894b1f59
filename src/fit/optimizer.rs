//! Bounded nonlinear least squares over a guess grid.
//!
//! For every seed in the grid we run a Levenberg–Marquardt solve of the decay
//! model against the shifted concentration trace, working in the bound
//! transform's internal coordinates. Each guess is independent; any single
//! failure (seed outside bounds, non-convergence, non-finite prediction,
//! degenerate covariance) is isolated and the loop continues. The whole call
//! fails only when no guess in the grid produced a fit.
//!
//! Parallelism: guesses are evaluated with rayon and collected in grid order,
//! then reduced sequentially, so the reported winners (including tie-breaks)
//! match a sequential run exactly.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt};
use nalgebra::{DMatrix, DVector, Dyn, Owned};
use rayon::prelude::*;

use crate::domain::{GuessFit, KnownRadius, Metric, ModelKind, ParamEstimate};
use crate::error::AppError;
use crate::fit::bounded::Bound;
use crate::fit::guess_grid::GuessGrid;
use crate::fit::selection::{select_best, FitSelection};
use crate::model::DecayModel;

/// Options controlling the grid search.
#[derive(Debug, Clone)]
pub struct OptimizerOptions {
    /// Best-fit criteria to track.
    pub metrics: Vec<Metric>,
    /// Reference radius for the radius-distance criterion.
    pub known_radius: Option<KnownRadius>,
    /// Guess budget: truncate the grid after this many seeds.
    pub max_guesses: Option<usize>,
    /// Wall-clock budget for the whole grid search.
    pub deadline: Option<Duration>,
    /// Solver evaluation budget per guess.
    pub patience: usize,
}

/// The residual problem handed to the LM solver.
///
/// `x` holds the internal (transformed) coordinates; the model always sees
/// decoded physical parameters.
struct DecayProblem<'a> {
    model: &'a DecayModel,
    time: &'a [f64],
    conc: &'a [f64],
    bounds: &'a [Bound],
    x: DVector<f64>,
}

impl DecayProblem<'_> {
    fn decode(&self, x: &DVector<f64>) -> Vec<f64> {
        x.iter()
            .zip(self.bounds)
            .map(|(&xi, b)| b.decode(xi))
            .collect()
    }

    fn residuals_at(&self, x: &DVector<f64>) -> Option<DVector<f64>> {
        let theta = self.decode(x);
        let mut out = DVector::zeros(self.time.len());
        for (i, (&t, &c)) in self.time.iter().zip(self.conc.iter()).enumerate() {
            let y = self.model.concentration(t, &theta);
            if !y.is_finite() {
                return None;
            }
            out[i] = y - c;
        }
        Some(out)
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for DecayProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.x.copy_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.x.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        self.residuals_at(&self.x)
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        // Central differences in the internal coordinates. The analytic
        // Jacobian would need separate derivations per damping branch; finite
        // differences stay correct across branch switches.
        let n = self.time.len();
        let p = self.x.len();
        let mut jac = DMatrix::<f64>::zeros(n, p);

        for j in 0..p {
            let h = 1e-6 * self.x[j].abs().max(1.0);
            let mut plus = self.x.clone();
            plus[j] += h;
            let mut minus = self.x.clone();
            minus[j] -= h;

            let r_plus = self.residuals_at(&plus)?;
            let r_minus = self.residuals_at(&minus)?;
            for i in 0..n {
                jac[(i, j)] = (r_plus[i] - r_minus[i]) / (2.0 * h);
            }
        }

        Some(jac)
    }
}

/// Model Jacobian with respect to the physical parameters at the solution,
/// used for the covariance estimate.
fn external_jacobian(model: &DecayModel, time: &[f64], theta: &[f64]) -> Option<DMatrix<f64>> {
    let n = time.len();
    let p = theta.len();
    let mut jac = DMatrix::<f64>::zeros(n, p);

    for j in 0..p {
        let h = (theta[j].abs() * 1e-6).max(1e-14);
        let mut plus = theta.to_vec();
        plus[j] += h;
        let mut minus = theta.to_vec();
        minus[j] -= h;

        for (i, &t) in time.iter().enumerate() {
            let y_plus = model.concentration(t, &plus);
            let y_minus = model.concentration(t, &minus);
            if !(y_plus.is_finite() && y_minus.is_finite()) {
                return None;
            }
            jac[(i, j)] = (y_plus - y_minus) / (2.0 * h);
        }
    }

    Some(jac)
}

/// Fit one seed. `None` means this guess contributes nothing.
fn fit_single_guess(
    model: &DecayModel,
    time: &[f64],
    conc: &[f64],
    bounds: &[Bound],
    seed: &[f64],
    guess_index: usize,
    known_radius: Option<KnownRadius>,
    patience: usize,
) -> Option<GuessFit> {
    // Seeds on or beyond a bound cannot be encoded; skip them.
    let mut x0 = DVector::<f64>::zeros(seed.len());
    for (j, (&s, bound)) in seed.iter().zip(bounds.iter()).enumerate() {
        x0[j] = bound.encode(s)?;
    }

    let problem = DecayProblem {
        model,
        time,
        conc,
        bounds,
        x: x0,
    };
    let (solved, report) = LevenbergMarquardt::new()
        .with_patience(patience)
        .minimize(problem);
    if !report.termination.was_successful() {
        return None;
    }

    let theta = solved.decode(&solved.x);
    let n = time.len();
    let p = theta.len();
    if n <= p {
        return None;
    }

    let fitted = model.evaluate(time, &theta);
    if fitted.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mean = conc.iter().sum::<f64>() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    for i in 0..n {
        let r = conc[i] - fitted[i];
        ss_res += r * r;
        let d = conc[i] - mean;
        ss_tot += d * d;
    }
    if !(ss_res.is_finite() && ss_tot > 0.0) {
        return None;
    }

    let r_squared = 1.0 - ss_res / ss_tot;
    let mse = ss_res / n as f64;

    // Covariance in physical parameter space: s^2 (J^T J)^-1 with
    // s^2 = SS_res / (n - p). Singular J^T J is a per-guess failure.
    let jac = external_jacobian(model, time, &theta)?;
    let jtj = jac.transpose() * &jac;
    let s2 = ss_res / (n - p) as f64;
    let covariance = jtj.try_inverse()? * s2;

    let mut std_errors = Vec::with_capacity(p);
    let mut trace = 0.0;
    for j in 0..p {
        let var = covariance[(j, j)];
        if !var.is_finite() || var < 0.0 {
            return None;
        }
        std_errors.push(var.sqrt());
        trace += var;
    }
    let fit_std_error = trace.sqrt();

    let cov_flat: Vec<f64> = (0..p)
        .flat_map(|i| (0..p).map(move |j| (i, j)))
        .map(|(i, j)| covariance[(i, j)])
        .collect();

    match model.kind() {
        ModelKind::RadiusChi => {
            let denom = (covariance[(0, 0)] * covariance[(1, 1)]).sqrt();
            let correlation = (denom > 0.0).then(|| covariance[(0, 1)] / denom);
            Some(GuessFit {
                guess_index,
                seed_radius: Some(seed[0]),
                seed_chi: seed[1],
                radius: Some(ParamEstimate {
                    value: theta[0],
                    std_error: std_errors[0],
                }),
                chi: ParamEstimate {
                    value: theta[1],
                    std_error: std_errors[1],
                },
                covariance: cov_flat,
                correlation,
                r_squared,
                mse,
                fit_std_error,
                radius_distance: known_radius.map(|kr| (theta[0] - kr.value).abs()),
            })
        }
        ModelKind::ChiOnly => Some(GuessFit {
            guess_index,
            seed_radius: None,
            seed_chi: seed[0],
            radius: None,
            chi: ParamEstimate {
                value: theta[0],
                std_error: std_errors[0],
            },
            covariance: cov_flat,
            correlation: None,
            r_squared,
            mse,
            fit_std_error,
            radius_distance: None,
        }),
    }
}

fn describe_bounds(kind: ModelKind, bounds: &[Bound]) -> String {
    match kind {
        ModelKind::RadiusChi => format!(
            "\tr: {}\n\tchi: {}",
            bounds[0].describe(),
            bounds[1].describe()
        ),
        ModelKind::ChiOnly => format!("\tchi: {}", bounds[0].describe()),
    }
}

/// Run the grid search and collect per-metric winners plus the audit table.
pub fn optimize(
    model: &DecayModel,
    time: &[f64],
    conc: &[f64],
    grid: &GuessGrid,
    bounds: &[Bound],
    opts: &OptimizerOptions,
) -> Result<FitSelection, AppError> {
    if time.len() != conc.len() || time.is_empty() {
        return Err(AppError::data(format!(
            "Fit window is empty or mismatched: {} time samples, {} concentration samples.",
            time.len(),
            conc.len()
        )));
    }
    if grid.is_empty() {
        return Err(AppError::config("Guess grid is empty."));
    }
    let p = model.kind().param_count();
    if bounds.len() != p || grid.entries[0].len() != p {
        return Err(AppError::config(format!(
            "Model expects {p} parameters; got {} bounds and {}-element seeds.",
            bounds.len(),
            grid.entries[0].len()
        )));
    }
    if opts.metrics.is_empty() {
        return Err(AppError::config("No best-fit metric enabled."));
    }
    if opts.metrics.contains(&Metric::RadiusDistance) && opts.known_radius.is_none() {
        return Err(AppError::config(
            "The radius-distance metric requires a known radius in the run spec.",
        ));
    }

    let mut entries: &[Vec<f64>] = &grid.entries;
    let mut truncated = None;
    if let Some(budget) = opts.max_guesses {
        if budget == 0 {
            return Err(AppError::config("Guess budget must be at least 1."));
        }
        if budget < entries.len() {
            truncated = Some(entries.len() - budget);
            log::info!(
                "Guess budget {budget} truncates the grid; dropping {} seeds.",
                entries.len() - budget
            );
            entries = &entries[..budget];
        }
    }

    let deadline = opts.deadline.map(|d| Instant::now() + d);
    let expired = AtomicBool::new(false);

    let results: Vec<Option<GuessFit>> = entries
        .par_iter()
        .enumerate()
        .map(|(guess_index, seed)| {
            if let Some(deadline) = deadline {
                if expired.load(Ordering::Relaxed) {
                    return None;
                }
                if Instant::now() >= deadline {
                    expired.store(true, Ordering::Relaxed);
                    return None;
                }
            }
            fit_single_guess(
                model,
                time,
                conc,
                bounds,
                seed,
                guess_index,
                opts.known_radius,
                opts.patience,
            )
        })
        .collect();

    let attempted = entries.len();
    let table: Vec<GuessFit> = results.into_iter().flatten().collect();
    let failed = attempted - table.len();
    let deadline_hit = expired.load(Ordering::Relaxed);
    if deadline_hit {
        log::warn!("Fit deadline expired before the guess grid finished.");
    }

    if table.is_empty() {
        return Err(AppError::fit(format!(
            "No viable fit from any of {attempted} guesses.\nGuess grid:\n{}\nBounds:\n{}",
            grid.describe(),
            describe_bounds(model.kind(), bounds)
        )));
    }

    let best = select_best(&table, &opts.metrics);

    Ok(FitSelection {
        best,
        table,
        attempted,
        failed,
        truncated,
        deadline_hit,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FitContext;
    use crate::fit::guess_grid::AxisSpec;
    use crate::model::MU0;

    fn context() -> FitContext {
        FitContext {
            c0: 6.0,
            a: 16.0,
            eta: 8.9e-4,
            rho_p: 5180.0,
            chi_s: -9.04e-6,
        }
    }

    /// Radius and chi that put the decay rates at exactly 0.5 and 0.01 1/s.
    fn planted_params(ctx: &FitContext) -> (f64, f64) {
        let alpha = 0.51;
        let beta = 0.005;
        let radius = (9.0 * ctx.eta / (2.0 * ctx.rho_p * alpha)).sqrt();
        let chi = beta * ctx.rho_p * MU0 * (1.0 + ctx.chi_s) / (2.0 * ctx.a * ctx.a);
        (radius, chi)
    }

    fn options(metrics: Vec<Metric>) -> OptimizerOptions {
        OptimizerOptions {
            metrics,
            known_radius: None,
            max_guesses: None,
            deadline: None,
            patience: 200,
        }
    }

    #[test]
    fn recovers_planted_parameters_from_a_grid() {
        let ctx = context();
        let (r_true, chi_true) = planted_params(&ctx);
        let model = DecayModel::new(ModelKind::RadiusChi, ctx, None).unwrap();

        let time: Vec<f64> = (0..1000).map(|i| i as f64 * 0.3).collect();
        let conc = model.evaluate(&time, &[r_true, chi_true]);

        // The grid brackets the truth and contains it at the midpoints.
        let grid = GuessGrid::two_parameter(
            AxisSpec::lin(0.5 * r_true, 1.5 * r_true, 3),
            AxisSpec::lin(0.5 * chi_true, 1.5 * chi_true, 3),
        )
        .unwrap();
        let bounds = [
            Bound::new(0.1 * r_true, 10.0 * r_true).unwrap(),
            Bound::new(0.0, f64::INFINITY).unwrap(),
        ];

        let selection = optimize(
            &model,
            &time,
            &conc,
            &grid,
            &bounds,
            &options(vec![Metric::RSquared, Metric::Mse, Metric::StandardError]),
        )
        .unwrap();

        let best = &selection.best[&Metric::RSquared];
        assert!(best.r_squared > 0.999, "r_squared = {}", best.r_squared);

        let r_fit = best.radius.unwrap().value;
        let chi_fit = best.chi.value;
        assert!(
            ((r_fit - r_true) / r_true).abs() < 0.01,
            "radius {r_fit} vs planted {r_true}"
        );
        assert!(
            ((chi_fit - chi_true) / chi_true).abs() < 0.01,
            "chi {chi_fit} vs planted {chi_true}"
        );

        assert!(selection.best.contains_key(&Metric::Mse));
        assert!(selection.best.contains_key(&Metric::StandardError));
    }

    #[test]
    fn bad_seeds_do_not_abort_the_grid() {
        let ctx = context();
        let (r_true, chi_true) = planted_params(&ctx);
        let model = DecayModel::new(ModelKind::RadiusChi, ctx, None).unwrap();

        let time: Vec<f64> = (0..400).map(|i| i as f64 * 0.5).collect();
        let conc = model.evaluate(&time, &[r_true, chi_true]);

        let bounds = [
            Bound::new(0.1 * r_true, 10.0 * r_true).unwrap(),
            Bound::new(0.0, f64::INFINITY).unwrap(),
        ];

        // Hand-build a grid whose first seeds violate the radius bound.
        let mut grid = GuessGrid::two_parameter(
            AxisSpec::lin(0.9 * r_true, 1.1 * r_true, 2),
            AxisSpec::lin(0.9 * chi_true, 1.1 * chi_true, 2),
        )
        .unwrap();
        grid.entries.insert(0, vec![100.0 * r_true, chi_true]);
        grid.entries.insert(0, vec![-1.0, chi_true]);

        let selection = optimize(
            &model,
            &time,
            &conc,
            &grid,
            &bounds,
            &options(vec![Metric::RSquared]),
        )
        .unwrap();

        assert!(selection.failed >= 2);
        assert!(!selection.table.is_empty());
        assert!(selection.best.contains_key(&Metric::RSquared));
    }

    #[test]
    fn all_bad_seeds_is_a_fit_error_echoing_the_grid() {
        let ctx = context();
        let (r_true, chi_true) = planted_params(&ctx);
        let model = DecayModel::new(ModelKind::RadiusChi, ctx, None).unwrap();

        let time: Vec<f64> = (0..100).map(|i| i as f64).collect();
        let conc = model.evaluate(&time, &[r_true, chi_true]);

        // Every seed sits outside the radius bound.
        let grid = GuessGrid::two_parameter(
            AxisSpec::lin(20.0 * r_true, 30.0 * r_true, 2),
            AxisSpec::lin(0.5 * chi_true, 1.5 * chi_true, 2),
        )
        .unwrap();
        let bounds = [
            Bound::new(0.1 * r_true, 10.0 * r_true).unwrap(),
            Bound::new(0.0, f64::INFINITY).unwrap(),
        ];

        let err = optimize(
            &model,
            &time,
            &conc,
            &grid,
            &bounds,
            &options(vec![Metric::RSquared]),
        )
        .unwrap_err();

        assert_eq!(err.kind(), crate::error::ErrorKind::Fit);
        let message = err.to_string();
        assert!(message.contains("Guess grid"));
        assert!(message.contains("Bounds"));
    }

    #[test]
    fn radius_distance_without_known_radius_is_a_config_error() {
        let ctx = context();
        let model = DecayModel::new(ModelKind::RadiusChi, ctx, None).unwrap();
        let time = vec![0.0, 1.0, 2.0, 3.0];
        let conc = vec![6.0, 5.0, 4.0, 3.0];
        let grid = GuessGrid::two_parameter(
            AxisSpec::lin(1e-7, 2e-7, 2),
            AxisSpec::lin(1e-5, 2e-5, 2),
        )
        .unwrap();
        let bounds = [
            Bound::new(0.0, 1e-4).unwrap(),
            Bound::new(0.0, f64::INFINITY).unwrap(),
        ];

        let err = optimize(
            &model,
            &time,
            &conc,
            &grid,
            &bounds,
            &options(vec![Metric::RadiusDistance]),
        )
        .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Config);
    }

    #[test]
    fn guess_budget_truncates_the_grid() {
        let ctx = context();
        let (r_true, chi_true) = planted_params(&ctx);
        let model = DecayModel::new(ModelKind::RadiusChi, ctx, None).unwrap();

        let time: Vec<f64> = (0..300).map(|i| i as f64 * 0.5).collect();
        let conc = model.evaluate(&time, &[r_true, chi_true]);

        let grid = GuessGrid::two_parameter(
            AxisSpec::lin(0.8 * r_true, 1.2 * r_true, 3),
            AxisSpec::lin(0.8 * chi_true, 1.2 * chi_true, 3),
        )
        .unwrap();
        let bounds = [
            Bound::new(0.1 * r_true, 10.0 * r_true).unwrap(),
            Bound::new(0.0, f64::INFINITY).unwrap(),
        ];

        let mut opts = options(vec![Metric::Mse]);
        opts.max_guesses = Some(4);

        let selection = optimize(&model, &time, &conc, &grid, &bounds, &opts).unwrap();
        assert_eq!(selection.attempted, 4);
        assert_eq!(selection.truncated, Some(5));
    }
}
