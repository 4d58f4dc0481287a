use faer::prelude::SpSolver;

/// A nonlinear least squares problem `min_p 0.5 * |r(p)|^2`.
pub trait LeastSquaresProblem {
    /// Number of residuals.
    fn num_residuals(&self) -> usize;

    /// Evaluate the residuals at `params` into `out`.
    fn residuals(&self, params: &[f64], out: &mut [f64]);
}

/// Parameters controlling the Levenberg-Marquardt solver.
#[derive(Debug, Clone)]
pub struct LMParams {
    /// Maximum number of LM iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the relative cost change.
    pub cost_tolerance: f64,
    /// Convergence threshold on the relative step size.
    pub step_tolerance: f64,
    /// Initial damping factor (lambda).
    pub initial_lambda: f64,
}

impl Default for LMParams {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            cost_tolerance: 1e-12,
            step_tolerance: 1e-12,
            initial_lambda: 1e-3,
        }
    }
}

impl LMParams {
    /// Set maximum iterations.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The cost stopped decreasing.
    CostConverged,
    /// The update became negligible.
    StepConverged,
    /// The iteration budget ran out.
    MaxIterations,
    /// No damping produced a cost decrease.
    DampingExhausted,
}

/// Summary of a solver run.
#[derive(Debug, Clone)]
pub struct LMReport {
    /// Iterations performed.
    pub iterations: usize,
    /// Final cost `0.5 * |r|^2`.
    pub cost: f64,
    /// Why the solver stopped.
    pub termination: Termination,
}

fn cost_of(residuals: &[f64]) -> f64 {
    0.5 * residuals.iter().map(|r| r * r).sum::<f64>()
}

/// Jacobian by central differences, row-major `num_residuals x num_params`.
fn numerical_jacobian<P: LeastSquaresProblem>(problem: &P, params: &[f64]) -> faer::Mat<f64> {
    let m = problem.num_residuals();
    let n = params.len();

    let mut jac = faer::Mat::<f64>::zeros(m, n);
    let mut p = params.to_vec();
    let mut r_plus = vec![0.0; m];
    let mut r_minus = vec![0.0; m];

    for j in 0..n {
        let h = 1e-6 * params[j].abs().max(1e-2);
        p[j] = params[j] + h;
        problem.residuals(&p, &mut r_plus);
        p[j] = params[j] - h;
        problem.residuals(&p, &mut r_minus);
        p[j] = params[j];

        for i in 0..m {
            jac.write(i, j, (r_plus[i] - r_minus[i]) / (2.0 * h));
        }
    }

    jac
}

/// Minimize a least squares problem with Levenberg-Marquardt.
///
/// The damping scales the diagonal of the normal equations (Marquardt's variant), so
/// parameters of very different magnitude share one damping factor.
///
/// # Arguments
///
/// * `problem` - The problem to minimize.
/// * `params` - The initial guess, updated in place with the solution.
/// * `lm` - The solver parameters.
pub fn levenberg_marquardt<P: LeastSquaresProblem>(
    problem: &P,
    params: &mut [f64],
    lm: &LMParams,
) -> LMReport {
    const LAMBDA_MAX: f64 = 1e12;

    let n = params.len();
    let m = problem.num_residuals();

    let mut residuals = vec![0.0; m];
    problem.residuals(params, &mut residuals);
    let mut cost = cost_of(&residuals);
    let mut lambda = lm.initial_lambda;

    let mut candidate = vec![0.0; n];
    let mut candidate_residuals = vec![0.0; m];

    for iteration in 0..lm.max_iterations {
        let jac = numerical_jacobian(problem, params);

        // normal equations J^T J and J^T r
        let jt = jac.transpose();
        let jtj = jt * jac.as_ref();
        let r_col = faer::Mat::<f64>::from_fn(m, 1, |i, _| residuals[i]);
        let jtr = jt * r_col.as_ref();

        let mut improved = false;
        while lambda <= LAMBDA_MAX {
            let mut damped = jtj.clone();
            for k in 0..n {
                let d = jtj.read(k, k);
                damped.write(k, k, d + lambda * d.max(1e-12));
            }
            let neg_g = faer::Mat::<f64>::from_fn(n, 1, |i, _| -jtr.read(i, 0));
            let delta = damped.partial_piv_lu().solve(neg_g);

            let mut step_norm = 0.0;
            let mut param_norm = 0.0;
            for k in 0..n {
                let dk = delta.read(k, 0);
                candidate[k] = params[k] + dk;
                step_norm += dk * dk;
                param_norm += params[k] * params[k];
            }

            if !step_norm.is_finite() {
                lambda *= 10.0;
                continue;
            }

            problem.residuals(&candidate, &mut candidate_residuals);
            let candidate_cost = cost_of(&candidate_residuals);

            if candidate_cost.is_finite() && candidate_cost < cost {
                let reduction = (cost - candidate_cost) / cost.max(f64::MIN_POSITIVE);
                params.copy_from_slice(&candidate);
                std::mem::swap(&mut residuals, &mut candidate_residuals);
                cost = candidate_cost;
                lambda = (lambda / 10.0).max(1e-12);
                improved = true;

                log::trace!("lm iteration {iteration}: cost {cost:.6e}, lambda {lambda:.1e}");

                if reduction < lm.cost_tolerance {
                    return LMReport {
                        iterations: iteration + 1,
                        cost,
                        termination: Termination::CostConverged,
                    };
                }
                if step_norm.sqrt() <= lm.step_tolerance * (param_norm.sqrt() + lm.step_tolerance)
                {
                    return LMReport {
                        iterations: iteration + 1,
                        cost,
                        termination: Termination::StepConverged,
                    };
                }
                break;
            }

            lambda *= 10.0;
        }

        if !improved {
            return LMReport {
                iterations: iteration + 1,
                cost,
                termination: Termination::DampingExhausted,
            };
        }
    }

    LMReport {
        iterations: lm.max_iterations,
        cost,
        termination: Termination::MaxIterations,
    }
}
