//! Weighted nonlinear least squares with box constraints.
//!
//! Given:
//! - a model from the fixed catalogue
//! - a dataset `(x_i, y_i, σ_i)`
//! - an explicit initial guess and per-parameter bounds
//!
//! we minimize
//!
//! ```text
//! χ²(p) = Σ ((y_i − f(x_i; p)) / σ_i)²
//! ```
//!
//! with a projected Levenberg–Marquardt iteration:
//! - the damped Gauss–Newton system is solved on the free parameters only
//!   (a parameter sitting on a bound whose gradient pushes outward is held)
//! - trial points are clamped into the box
//! - damping follows Nielsen's update (shrink on good steps, grow ×ν on bad ones)
//!
//! Convergence tests follow MINPACK (`ftol`, `xtol`, `gtol`). Running out of
//! iterations is a hard failure. The covariance is `(JᵀJ)⁻¹` of the weighted
//! Jacobian at the optimum, not rescaled by the reduced χ² unless
//! `absolute_sigma` is off.

use nalgebra::{DMatrix, DVector};
use tracing::debug;

use crate::domain::{Bounds, FitDataset, FitResult, ModelKind};
use crate::error::AnalysisError;
use crate::math::{covariance_from_jacobian, solve_damped, to_rows};
use crate::models::{fill_gradient_row, predict};

/// Optimizer settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitOptions {
    /// Stop when an accepted step reduces χ² by less than `ftol · χ²`.
    pub ftol: f64,
    /// Stop when the step is smaller than `xtol · (‖p‖ + xtol)`.
    pub xtol: f64,
    /// Stop when every free gradient component is (cosine-)orthogonal to the residual.
    pub gtol: f64,
    /// Iteration budget; `None` means `100 · (p + 1)`.
    pub max_iterations: Option<usize>,
    /// Treat sigma as true standard deviations (no χ²/dof rescaling).
    pub absolute_sigma: bool,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            ftol: 1e-8,
            xtol: 1e-8,
            gtol: 1e-8,
            max_iterations: None,
            absolute_sigma: true,
        }
    }
}

/// Damping floor for parameters whose Jacobian column vanishes.
const MIN_DIAG: f64 = 1e-12;

/// Damping above which no step can make progress.
const MAX_LAMBDA: f64 = 1e32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stop {
    ExactFit,
    Gradient,
    StepSize,
    CostReduction,
}

/// Fit `model` to `data`, starting from `initial_guess`.
///
/// Fails with `ConvergenceFailure` when the residual is non-finite at the
/// initial guess, the iteration budget runs out, or the damping diverges; and
/// with `DegenerateCovariance` when the Jacobian at the optimum is
/// rank-deficient. No partial result is ever returned.
pub fn fit(
    model: ModelKind,
    data: &FitDataset,
    initial_guess: &[f64],
    bounds: &Bounds,
    opts: &FitOptions,
) -> Result<FitResult, AnalysisError> {
    let p = model.param_count();
    let n = data.len();
    validate_inputs(model, data, initial_guess, bounds)?;

    let mut params = DVector::from_column_slice(initial_guess);
    let mut r = weighted_residuals(model, data, params.as_slice());
    let mut cost = r.norm_squared();
    if !cost.is_finite() {
        return Err(AnalysisError::ConvergenceFailure {
            reason: "non-finite residual at the initial guess".to_string(),
        });
    }
    let mut jac = weighted_jacobian(model, data, params.as_slice());

    let max_iterations = opts.max_iterations.unwrap_or(100 * (p + 1));
    let mut lambda: Option<f64> = None;
    let mut nu = 2.0;
    let mut stop = None;
    let mut iterations = 0;

    while iterations < max_iterations {
        iterations += 1;

        if cost == 0.0 {
            stop = Some(Stop::ExactFit);
            break;
        }

        let a = jac.transpose() * &jac;
        let g = jac.transpose() * &r;
        let free = free_parameters(params.as_slice(), g.as_slice(), bounds);

        if gradient_converged(&jac, &g, &free, cost, opts.gtol) {
            stop = Some(Stop::Gradient);
            break;
        }

        let lam = *lambda.get_or_insert_with(|| {
            1e-3 * (0..p).map(|j| a[(j, j)]).fold(MIN_DIAG, f64::max)
        });

        let Some(step) = solve_on_free(&a, &g, &free, lam) else {
            lambda = Some(lam * nu);
            nu *= 2.0;
            if lam * nu > MAX_LAMBDA {
                break;
            }
            continue;
        };

        let mut trial = &params + &step;
        bounds.clamp(trial.as_mut_slice());
        let delta = &trial - &params;

        if delta.norm() <= opts.xtol * (params.norm() + opts.xtol) {
            stop = Some(Stop::StepSize);
            break;
        }

        let r_trial = weighted_residuals(model, data, trial.as_slice());
        let cost_trial = r_trial.norm_squared();

        if cost_trial.is_finite() && cost_trial < cost {
            let predicted = cost - (&r - &jac * &delta).norm_squared();
            let rho = if predicted > 0.0 {
                (cost - cost_trial) / predicted
            } else {
                0.0
            };
            let reduction = cost - cost_trial;
            let previous = cost;

            params = trial;
            r = r_trial;
            cost = cost_trial;
            jac = weighted_jacobian(model, data, params.as_slice());
            lambda = Some(lam * (1.0_f64 / 3.0).max(1.0 - (2.0 * rho - 1.0).powi(3)));
            nu = 2.0;
            debug!(iteration = iterations, chi2 = cost, lambda = lam, "accepted step");

            if reduction <= opts.ftol * previous {
                stop = Some(Stop::CostReduction);
                break;
            }
        } else {
            lambda = Some(lam * nu);
            nu *= 2.0;
            if lam * nu > MAX_LAMBDA {
                break;
            }
        }
    }

    let Some(stop) = stop else {
        return Err(AnalysisError::ConvergenceFailure {
            reason: format!(
                "{} fit did not converge in {iterations} iterations (chi2={cost:.6e})",
                model.display_name()
            ),
        });
    };
    debug!(?stop, iterations, chi2 = cost, "fit converged");

    if params.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::ConvergenceFailure {
            reason: "non-finite parameters at the optimum".to_string(),
        });
    }

    let mut cov = covariance_from_jacobian(&jac)?;
    if !opts.absolute_sigma {
        if n <= p {
            return Err(AnalysisError::DegenerateCovariance {
                reason: "relative sigma needs more points than parameters".to_string(),
            });
        }
        cov *= cost / (n - p) as f64;
    }

    Ok(FitResult {
        model,
        parameters: params.iter().copied().collect(),
        covariance: to_rows(&cov),
        chi_square: chi_square(model, data, params.as_slice()),
        n_points: n,
        iterations,
    })
}

/// `Σ ((y_i − f(x_i; p)) / σ_i)²`.
pub fn chi_square(model: ModelKind, data: &FitDataset, params: &[f64]) -> f64 {
    weighted_residuals(model, data, params).norm_squared()
}

fn validate_inputs(
    model: ModelKind,
    data: &FitDataset,
    initial_guess: &[f64],
    bounds: &Bounds,
) -> Result<(), AnalysisError> {
    let p = model.param_count();
    if initial_guess.len() != p {
        return Err(AnalysisError::InvalidInput(format!(
            "{} needs {p} initial parameters, got {}",
            model.display_name(),
            initial_guess.len()
        )));
    }
    if bounds.len() != p || bounds.upper.len() != p {
        return Err(AnalysisError::InvalidInput(format!(
            "{} needs {p} bounds, got {}",
            model.display_name(),
            bounds.len()
        )));
    }
    if bounds.lower.iter().zip(bounds.upper.iter()).any(|(lo, hi)| !(lo < hi)) {
        return Err(AnalysisError::InvalidInput("each lower bound must be below its upper bound".into()));
    }
    if initial_guess.iter().any(|v| !v.is_finite()) {
        return Err(AnalysisError::InvalidInput("initial guess must be finite".into()));
    }
    if !bounds.contains(initial_guess) {
        return Err(AnalysisError::InvalidInput(format!(
            "initial guess {initial_guess:?} lies outside the bounds"
        )));
    }
    if data.len() < p {
        return Err(AnalysisError::InvalidInput(format!(
            "{} points cannot determine {p} parameters",
            data.len()
        )));
    }
    Ok(())
}

fn weighted_residuals(model: ModelKind, data: &FitDataset, params: &[f64]) -> DVector<f64> {
    DVector::from_iterator(
        data.len(),
        data.x()
            .iter()
            .zip(data.y().iter().zip(data.sigma().iter()))
            .map(|(&x, (&y, &s))| (y - predict(model, x, params)) / s),
    )
}

fn weighted_jacobian(model: ModelKind, data: &FitDataset, params: &[f64]) -> DMatrix<f64> {
    let p = model.param_count();
    let mut jac = DMatrix::<f64>::zeros(data.len(), p);
    let mut row = vec![0.0; p];
    for (i, (&x, &s)) in data.x().iter().zip(data.sigma().iter()).enumerate() {
        fill_gradient_row(model, x, params, &mut row);
        for j in 0..p {
            jac[(i, j)] = row[j] / s;
        }
    }
    jac
}

/// Parameters not pinned to a bound by a gradient pointing out of the box.
fn free_parameters(params: &[f64], g: &[f64], bounds: &Bounds) -> Vec<bool> {
    params
        .iter()
        .zip(g.iter())
        .zip(bounds.lower.iter().zip(bounds.upper.iter()))
        .map(|((&p, &gj), (&lo, &hi))| !((p <= lo && gj < 0.0) || (p >= hi && gj > 0.0)))
        .collect()
}

/// MINPACK's gtol test: max over free columns of `|J_jᵀ r| / (‖J_j‖ ‖r‖)`.
fn gradient_converged(jac: &DMatrix<f64>, g: &DVector<f64>, free: &[bool], cost: f64, gtol: f64) -> bool {
    let r_norm = cost.sqrt();
    let mut worst = 0.0_f64;
    for (j, &is_free) in free.iter().enumerate() {
        if !is_free {
            continue;
        }
        let col_norm = jac.column(j).norm();
        if col_norm > 0.0 {
            worst = worst.max(g[j].abs() / (col_norm * r_norm));
        }
    }
    worst <= gtol
}

fn solve_on_free(a: &DMatrix<f64>, g: &DVector<f64>, free: &[bool], lambda: f64) -> Option<DVector<f64>> {
    let idx: Vec<usize> = free
        .iter()
        .enumerate()
        .filter_map(|(j, &f)| f.then_some(j))
        .collect();
    if idx.is_empty() {
        return Some(DVector::zeros(g.len()));
    }
    let k = idx.len();
    let sub_a = DMatrix::from_fn(k, k, |r, c| a[(idx[r], idx[c])]);
    let sub_g = DVector::from_fn(k, |r, _| g[idx[r]]);
    let sub_step = solve_damped(&sub_a, &sub_g, lambda, MIN_DIAG)?;

    let mut step = DVector::zeros(g.len());
    for (r, &j) in idx.iter().enumerate() {
        step[j] = sub_step[r];
    }
    Some(step)
}

#[cfg(test)]
mod tests {
    use std::f64::consts::PI;

    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use rand_distr::{Distribution, Poisson};

    use super::*;
    use crate::fit::preprocess::{PreprocessOptions, preprocess};

    const TRUTH: [f64; 4] = [1000.0, 0.95, 45.0, 10.0];

    fn truth_radians() -> [f64; 4] {
        [TRUTH[0], TRUTH[1], TRUTH[2].to_radians(), TRUTH[3].to_radians()]
    }

    fn beta_grid() -> Vec<f64> {
        (0..72).map(|i| i as f64 * 5.0).collect()
    }

    fn transmission_counts(beta_deg: &[f64]) -> Vec<f64> {
        let p = truth_radians();
        beta_deg
            .iter()
            .map(|b| predict(ModelKind::TransmissionLaw, b.to_radians(), &p))
            .collect()
    }

    fn guess() -> Vec<f64> {
        vec![1.0, 0.9, 0.75, 0.3]
    }

    #[test]
    fn recovers_noise_free_transmission_parameters() {
        let x = beta_grid();
        let y = transmission_counts(&x);
        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let model = ModelKind::TransmissionLaw;
        let res = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &FitOptions::default()).unwrap();

        let scale = prep.normalization.y_scale;
        let recovered = [
            res.parameters[0] * scale,
            res.parameters[1],
            res.parameters[2].to_degrees(),
            res.parameters[3].to_degrees(),
        ];
        for (got, want) in recovered.iter().zip(TRUTH.iter()) {
            assert!(((got - want) / want).abs() < 1e-4, "got {got}, want {want}");
        }
        assert!(res.chi_square < 1e-8, "chi2 = {}", res.chi_square);
    }

    #[test]
    fn covariance_is_symmetric_with_non_negative_diagonal() {
        let x = beta_grid();
        let y = transmission_counts(&x);
        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let model = ModelKind::TransmissionLaw;
        let res = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &FitOptions::default()).unwrap();
        for i in 0..4 {
            assert!(res.covariance[i][i] >= 0.0);
            for j in 0..4 {
                assert!((res.covariance[i][j] - res.covariance[j][i]).abs() <= 1e-12 * res.covariance[i][i].abs().max(1.0));
            }
        }
        let errors = res.errors();
        assert!(errors.iter().all(|e| e.is_finite() && *e > 0.0));
    }

    #[test]
    fn poisson_noise_fits_stay_within_three_sigma_on_average() {
        let x = beta_grid();
        let expected = transmission_counts(&x);
        let model = ModelKind::TransmissionLaw;
        let mut rng = StdRng::seed_from_u64(7);

        let trials = 20;
        let mut pulls = [0.0_f64; 4];
        for _ in 0..trials {
            let y: Vec<f64> = expected
                .iter()
                .map(|&mu| Poisson::new(mu).unwrap().sample(&mut rng))
                .collect();
            let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
            let res = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &FitOptions::default()).unwrap();
            let errs = res.errors();
            let scale = prep.normalization.y_scale;
            let est = [
                (res.parameters[0] * scale, errs[0] * scale),
                (res.parameters[1], errs[1]),
                (res.parameters[2].to_degrees(), errs[2].to_degrees()),
                (res.parameters[3].to_degrees(), errs[3].to_degrees()),
            ];
            for (k, (value, err)) in est.iter().enumerate() {
                pulls[k] += ((value - TRUTH[k]) / err).abs();
            }
        }
        for (k, total) in pulls.iter().enumerate() {
            let mean_pull = total / trials as f64;
            assert!(mean_pull < 3.0, "parameter {k}: mean pull {mean_pull}");
        }
    }

    #[test]
    fn normalized_fit_matches_raw_fit_after_unnormalizing() {
        let x = beta_grid();
        let expected = transmission_counts(&x);
        let mut rng = StdRng::seed_from_u64(11);
        let y: Vec<f64> = expected
            .iter()
            .map(|&mu| Poisson::new(mu).unwrap().sample(&mut rng))
            .collect();
        let model = ModelKind::TransmissionLaw;

        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let scale = prep.normalization.y_scale;
        let norm = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &FitOptions::default()).unwrap();

        // Same points in raw count units.
        let raw = FitDataset::new(
            prep.dataset.x().to_vec(),
            prep.raw_y.clone(),
            prep.raw_y.iter().map(|v| v.sqrt()).collect(),
        )
        .unwrap();
        let mut raw_guess = guess();
        raw_guess[0] *= scale;
        let mut raw_bounds = model.default_bounds();
        raw_bounds.upper[0] *= scale;
        let direct = fit(model, &raw, &raw_guess, &raw_bounds, &FitOptions::default()).unwrap();

        let unnormalized = [norm.parameters[0] * scale, norm.parameters[1], norm.parameters[2], norm.parameters[3]];
        for (a, b) in unnormalized.iter().zip(direct.parameters.iter()) {
            assert!(((a - b) / b).abs() < 1e-4, "normalized {a} vs raw {b}");
        }
        let (e_norm, e_raw) = (norm.errors(), direct.errors());
        assert!(((e_norm[0] * scale - e_raw[0]) / e_raw[0]).abs() < 1e-3);
        assert!(((norm.chi_square - direct.chi_square) / direct.chi_square).abs() < 1e-6);
    }

    #[test]
    fn recovers_noise_free_wave_packet() {
        let model = ModelKind::WavePacket;
        let truth = [1.0, 0.8, 3.0, 0.4];
        let x: Vec<f64> = (0..201).map(|i| -2.0 + i as f64 * 0.02).collect();
        let y: Vec<f64> = x.iter().map(|&v| predict(model, v, &truth)).collect();
        let sigma = vec![0.01; x.len()];
        let data = FitDataset::new(x, y, sigma).unwrap();
        let res = fit(model, &data, &[0.9, 0.7, 2.95, 0.3], &model.default_bounds(), &FitOptions::default()).unwrap();
        for (got, want) in res.parameters.iter().zip(truth.iter()) {
            assert!((got - want).abs() < 1e-6, "got {got}, want {want}");
        }
    }

    #[test]
    fn relative_sigma_rescales_by_reduced_chi_square() {
        let x = beta_grid();
        let expected = transmission_counts(&x);
        let mut rng = StdRng::seed_from_u64(3);
        let y: Vec<f64> = expected
            .iter()
            .map(|&mu| Poisson::new(mu).unwrap().sample(&mut rng))
            .collect();
        let model = ModelKind::TransmissionLaw;
        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let abs = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &FitOptions::default()).unwrap();
        let rel_opts = FitOptions {
            absolute_sigma: false,
            ..FitOptions::default()
        };
        let rel = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &rel_opts).unwrap();
        let factor = abs.reduced_chi_square().unwrap();
        assert!(((rel.covariance[0][0] / abs.covariance[0][0]) - factor).abs() < 1e-9 * factor.max(1.0));
    }

    #[test]
    fn initial_guess_outside_bounds_is_rejected() {
        let model = ModelKind::TransmissionLaw;
        let x = beta_grid();
        let y = transmission_counts(&x);
        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let err = fit(model, &prep.dataset, &[1.0, 1.0, 0.75, 7.0 * PI], &model.default_bounds(), &FitOptions::default())
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidInput(_)));
    }

    #[test]
    fn non_finite_initial_residual_fails_to_converge() {
        let model = ModelKind::TransmissionLaw;
        let data = FitDataset::new(vec![0.0, 1.0, 2.0, 3.0, 4.0], vec![1.0; 5], vec![0.1; 5]).unwrap();
        // c = 0 divides by zero inside the sine.
        let err = fit(model, &data, &[1.0, 0.5, 0.0, 0.0], &model.default_bounds(), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::ConvergenceFailure { .. }));
    }

    #[test]
    fn exhausted_iteration_budget_is_a_failure() {
        let x = beta_grid();
        let y = transmission_counts(&x);
        let prep = preprocess(&x, &y, PreprocessOptions::transmission()).unwrap();
        let model = ModelKind::TransmissionLaw;
        let opts = FitOptions {
            max_iterations: Some(1),
            ..FitOptions::default()
        };
        let err = fit(model, &prep.dataset, &guess(), &model.default_bounds(), &opts).unwrap_err();
        assert!(matches!(err, AnalysisError::ConvergenceFailure { .. }));
    }

    #[test]
    fn flat_model_direction_gives_degenerate_covariance() {
        // With b = 0 and every x equal to d, the phase and period columns vanish.
        let model = ModelKind::TransmissionLaw;
        let data = FitDataset::new(vec![0.5; 6], vec![1.0; 6], vec![0.1; 6]).unwrap();
        let err = fit(model, &data, &[2.0, 0.0, 1.0, 0.5], &model.default_bounds(), &FitOptions::default()).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateCovariance { .. }));
    }
}
