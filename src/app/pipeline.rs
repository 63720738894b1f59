//! Shared analysis pipeline used by the CLI front-ends.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//!
//! trace read -> calibration -> inflection shift -> field fit -> grid fit
//!
//! The CLI handlers then focus on presentation (printing, file exports).

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::domain::{
    AnalysisConfig, FitContext, GuessFit, KnownRadius, MagnetGeometry, Metric, ModelKind,
    SampleProperties,
};
use crate::error::AppError;
use crate::field::{fit_field_gradient, FieldFit};
use crate::fit::{optimize, AxisSpec, Bound, FitSelection, GuessGrid, OptimizerOptions};
use crate::io::run_spec::RunSpec;
use crate::io::trace::{read_trace, RawTrace};
use crate::model::DecayModel;
use crate::prep::{calibrate, find_inflection, Calibration, Inflection};

/// Default radius upper bound (meters) when no known radius is available.
const DEFAULT_R_UPPER: f64 = 1.0e-4;

/// All computed outputs of a single trace analysis.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub trace_path: PathBuf,
    pub trace: RawTrace,
    pub calibration: Calibration,
    /// `None` when the two-phase shift is disabled.
    pub inflection: Option<Inflection>,
    /// The window actually fitted (shifted when an inflection was found).
    pub fit_time: Vec<f64>,
    pub fit_concentration: Vec<f64>,
    pub field: FieldFit,
    pub context: FitContext,
    pub sample: SampleProperties,
    pub magnet: MagnetGeometry,
    pub grid: GuessGrid,
    pub bounds: Vec<Bound>,
    pub selection: FitSelection,
    pub fit_seconds: f64,
}

impl RunOutput {
    /// Rebuild the decay model this run was fitted with (for plotting).
    pub fn model(&self) -> Result<DecayModel, AppError> {
        DecayModel::new(
            self.grid.model,
            self.context,
            self.sample.known_radius.map(|kr| kr.value),
        )
    }

    /// Parameter vector of one fit record, in model layout.
    pub fn params_of(&self, fit: &GuessFit) -> Vec<f64> {
        match self.grid.model {
            ModelKind::RadiusChi => vec![
                fit.radius.map(|r| r.value).unwrap_or_default(),
                fit.chi.value,
            ],
            ModelKind::ChiOnly => vec![fit.chi.value],
        }
    }
}

/// Execute the full analysis pipeline for one trace file.
pub fn run_analysis(
    trace_path: &Path,
    spec: &RunSpec,
    config: &AnalysisConfig,
) -> Result<RunOutput, AppError> {
    let sample = spec.sample_properties()?;
    let magnet = spec.magnet_geometry()?;

    let trace = read_trace(trace_path)?;
    log::info!(
        "Loaded {} samples from '{}' ({} header lines skipped).",
        trace.len(),
        trace_path.display(),
        trace.header_lines
    );

    let calibration = calibrate(
        &trace.intensity,
        sample.initial_concentration,
        config.trailing_n,
    )?;

    let inflection = if config.adjust {
        Some(find_inflection(
            &trace.time,
            &calibration.concentration,
            config.min_index_guard,
            config.smoothing_window,
            config.poly_order,
        )?)
    } else {
        None
    };

    let (fit_time, fit_concentration, c0) = match &inflection {
        Some(inf) => (
            inf.time_shifted.clone(),
            inf.concentration_shifted.clone(),
            inf.c0,
        ),
        None => (
            trace.time.clone(),
            calibration.concentration.clone(),
            calibration.concentration[0],
        ),
    };

    let field = fit_field_gradient(&magnet)?;
    log::info!("Field gradient fit: a = {} T/m.", field.slope);

    let context = FitContext {
        c0,
        a: field.slope,
        eta: sample.solvent.viscosity(),
        rho_p: sample.density,
        chi_s: sample.solvent.susceptibility(),
    };

    let model = DecayModel::new(
        config.model_kind,
        context,
        sample.known_radius.map(|kr| kr.value),
    )?;

    let (grid, bounds) = build_grid_and_bounds(config, sample.known_radius)?;
    let metrics = resolve_metrics(config, &sample);

    let opts = OptimizerOptions {
        metrics,
        known_radius: sample.known_radius,
        max_guesses: config.max_guesses,
        deadline: config.deadline_secs.map(Duration::from_secs),
        patience: config.patience,
    };

    let started = Instant::now();
    let selection = optimize(&model, &fit_time, &fit_concentration, &grid, &bounds, &opts)?;
    let fit_seconds = started.elapsed().as_secs_f64();
    log::info!(
        "Fitted {} guesses ({} failed) in {:.1} s.",
        selection.attempted,
        selection.failed,
        fit_seconds
    );

    Ok(RunOutput {
        trace_path: trace_path.to_path_buf(),
        trace,
        calibration,
        inflection,
        fit_time,
        fit_concentration,
        field,
        context,
        sample,
        magnet,
        grid,
        bounds,
        selection,
        fit_seconds,
    })
}

/// Build the guess grid and matching bounds for the configured model.
///
/// With a known radius, the radius axis is lin-spaced across `value ± std`
/// and the default radius bound tightens to the same band. Explicit bound
/// flags override the defaults either way.
pub fn build_grid_and_bounds(
    config: &AnalysisConfig,
    known_radius: Option<KnownRadius>,
) -> Result<(GuessGrid, Vec<Bound>), AppError> {
    let chi_axis = AxisSpec::log(config.chi_guess_min, config.chi_guess_max, config.chi_guesses);
    let chi_bound = Bound::new(
        config.chi_lower.unwrap_or(0.0),
        config.chi_upper.unwrap_or(f64::INFINITY),
    )?;

    match config.model_kind {
        ModelKind::ChiOnly => {
            let grid = GuessGrid::single_parameter(chi_axis)?;
            Ok((grid, vec![chi_bound]))
        }
        ModelKind::RadiusChi => {
            let (r_axis, r_default_lower, r_default_upper) = match known_radius {
                Some(kr) => (
                    AxisSpec::lin(kr.value - kr.std, kr.value + kr.std, config.r_guesses),
                    kr.value - kr.std,
                    kr.value + kr.std,
                ),
                None => (
                    AxisSpec::log(config.r_guess_min, config.r_guess_max, config.r_guesses),
                    0.0,
                    DEFAULT_R_UPPER,
                ),
            };
            let r_bound = Bound::new(
                config.r_lower.unwrap_or(r_default_lower),
                config.r_upper.unwrap_or(r_default_upper),
            )?;
            let grid = GuessGrid::two_parameter(r_axis, chi_axis)?;
            Ok((grid, vec![r_bound, chi_bound]))
        }
    }
}

/// Resolve the enabled metric set.
///
/// An explicit `--metrics` list wins. Otherwise every applicable metric is
/// tracked: radius distance joins the default three only when the
/// two-parameter model has a known radius to compare against.
pub fn resolve_metrics(config: &AnalysisConfig, sample: &SampleProperties) -> Vec<Metric> {
    if !config.metrics.is_empty() {
        return config.metrics.clone();
    }
    let mut metrics = vec![Metric::RSquared, Metric::Mse, Metric::StandardError];
    if config.model_kind == ModelKind::RadiusChi && sample.known_radius.is_some() {
        metrics.push(Metric::RadiusDistance);
    }
    metrics
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(model_kind: ModelKind) -> AnalysisConfig {
        AnalysisConfig {
            out_dir: PathBuf::from("analysis"),
            model_kind,
            trailing_n: 20,
            adjust: true,
            min_index_guard: 20,
            smoothing_window: 51,
            poly_order: 3,
            chi_guesses: 10,
            chi_guess_min: 1e-6,
            chi_guess_max: 1e3,
            r_guesses: 10,
            r_guess_min: 1e-10,
            r_guess_max: 1e-4,
            r_lower: None,
            r_upper: None,
            chi_lower: None,
            chi_upper: None,
            metrics: Vec::new(),
            max_guesses: None,
            deadline_secs: None,
            patience: 200,
            plot: true,
            save: true,
        }
    }

    fn sample(known_radius: Option<KnownRadius>) -> SampleProperties {
        SampleProperties {
            material: "Fe3O4".to_string(),
            density: 5180.0,
            solvent: crate::domain::Solvent::Water,
            initial_concentration: 0.1,
            known_radius,
        }
    }

    #[test]
    fn known_radius_switches_to_a_lin_axis_and_tight_bounds() {
        let kr = KnownRadius {
            value: 5e-7,
            std: 1e-7,
        };
        let (grid, bounds) = build_grid_and_bounds(&config(ModelKind::RadiusChi), Some(kr)).unwrap();

        let r_axis = grid.radius_axis.unwrap();
        assert_eq!(r_axis.spacing, crate::fit::Spacing::Lin);
        assert!((r_axis.min - 4e-7).abs() < 1e-18);
        assert!((r_axis.max - 6e-7).abs() < 1e-18);

        assert!((bounds[0].lower - 4e-7).abs() < 1e-18);
        assert!((bounds[0].upper - 6e-7).abs() < 1e-18);
        assert_eq!(grid.len(), 100);
    }

    #[test]
    fn unknown_radius_uses_the_log_axis_defaults() {
        let (grid, bounds) = build_grid_and_bounds(&config(ModelKind::RadiusChi), None).unwrap();
        let r_axis = grid.radius_axis.unwrap();
        assert_eq!(r_axis.spacing, crate::fit::Spacing::Log);
        assert_eq!(bounds[0].lower, 0.0);
        assert_eq!(bounds[0].upper, DEFAULT_R_UPPER);
        assert!(bounds[1].upper.is_infinite());
    }

    #[test]
    fn chi_only_grid_is_one_dimensional() {
        let (grid, bounds) = build_grid_and_bounds(&config(ModelKind::ChiOnly), None).unwrap();
        assert!(grid.radius_axis.is_none());
        assert_eq!(bounds.len(), 1);
        assert_eq!(grid.len(), 10);
    }

    #[test]
    fn default_metrics_depend_on_known_radius() {
        let cfg = config(ModelKind::RadiusChi);
        let without = resolve_metrics(&cfg, &sample(None));
        assert!(!without.contains(&Metric::RadiusDistance));

        let with = resolve_metrics(
            &cfg,
            &sample(Some(KnownRadius {
                value: 5e-7,
                std: 1e-7,
            })),
        );
        assert!(with.contains(&Metric::RadiusDistance));
    }
}
