//! Binary logistic regression with L2 penalty and class reweighting.
//!
//! Objective (intercept unpenalised):
//!
//! `sum_i s_i * (log(1 + exp(z_i)) - y_i * z_i) + ||w||^2 / (2C)`, `z = Xw + b`
//!
//! where `s_i` is the sample weight times the class weight. Minimised with
//! full-batch gradient descent and a backtracking (Armijo) line search.
//! The estimator plugs into linfa through the `Fit` trait so it can be fed a
//! weighted `linfa::Dataset`.

use linfa::traits::Fit;
use linfa::DatasetBase;
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{CriticError, Result};

/// Class reweighting strategy.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ClassWeight {
    /// `n_samples / (n_classes * n_class)`; dialogue logs are dominated by
    /// mid-conversation (insufficient) turns.
    Balanced,
    None,
}

/// Hyper-parameters for [`LogisticModel`].
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse regularisation strength.
    pub c: f64,
    pub max_iter: usize,
    /// Convergence tolerance on the max-abs gradient component.
    pub tol: f64,
    pub class_weight: ClassWeight,
}

impl Default for LogisticParams {
    fn default() -> Self {
        LogisticParams {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-4,
            class_weight: ClassWeight::Balanced,
        }
    }
}

impl LogisticParams {
    /// # Errors
    ///
    /// `Config` when `c`, `max_iter` or `tol` is not positive.
    pub fn validate(&self) -> Result<()> {
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(CriticError::Config(format!("C must be > 0, got {}", self.c)));
        }
        if self.max_iter == 0 {
            return Err(CriticError::Config("max_iter must be > 0".into()));
        }
        if !(self.tol > 0.0) {
            return Err(CriticError::Config(format!("tol must be > 0, got {}", self.tol)));
        }
        Ok(())
    }
}

/// Fitted linear model.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LogisticModel {
    pub coef: Vec<f64>,
    pub intercept: f64,
    pub n_iter: usize,
    pub converged: bool,
}

/// Numerically stable logistic function.
pub fn sigmoid(z: f64) -> f64 {
    if z >= 0.0 {
        1.0 / (1.0 + (-z).exp())
    } else {
        let e = z.exp();
        e / (1.0 + e)
    }
}

// log(1 + exp(z)) without overflow.
fn softplus(z: f64) -> f64 {
    if z > 0.0 {
        z + (-z).exp().ln_1p()
    } else {
        z.exp().ln_1p()
    }
}

/// Per-class weights for binary targets: `[w_0, w_1]`.
pub fn balanced_class_weights(targets: &[usize]) -> [f64; 2] {
    let n = targets.len() as f64;
    let pos = targets.iter().filter(|t| **t == 1).count() as f64;
    let neg = n - pos;
    let w = |count: f64| if count > 0.0 { n / (2.0 * count) } else { 0.0 };
    [w(neg), w(pos)]
}

struct Problem<'a> {
    x: &'a Array2<f64>,
    y: Array1<f64>,
    s: Array1<f64>,
    inv_c: f64,
}

impl Problem<'_> {
    fn objective(&self, w: &Array1<f64>, b: f64) -> f64 {
        let z = self.x.dot(w) + b;
        let loss: f64 = z
            .iter()
            .zip(self.y.iter())
            .zip(self.s.iter())
            .map(|((z, y), s)| s * (softplus(*z) - y * z))
            .sum();
        loss + 0.5 * self.inv_c * w.dot(w)
    }

    fn gradient(&self, w: &Array1<f64>, b: f64) -> (Array1<f64>, f64) {
        let z = self.x.dot(w) + b;
        let residual = (z.mapv(sigmoid) - &self.y) * &self.s;
        let gw = self.x.t().dot(&residual) + w * self.inv_c;
        (gw, residual.sum())
    }
}

impl Fit<Array2<f64>, Array1<usize>, CriticError> for LogisticParams {
    type Object = LogisticModel;

    /// Fit on a binary dataset (targets 0/1). Dataset weights, when present,
    /// multiply the class weights.
    ///
    /// # Errors
    ///
    /// `Training` for an empty or single-class dataset, mismatched shapes or a
    /// non-finite objective.
    fn fit(&self, dataset: &DatasetBase<Array2<f64>, Array1<usize>>) -> Result<LogisticModel> {
        self.validate()?;
        let x = &dataset.records;
        let targets = &dataset.targets;
        let n = x.nrows();
        if n == 0 || x.ncols() == 0 {
            return Err(CriticError::Training(format!(
                "cannot fit on a {}x{} feature matrix",
                n,
                x.ncols()
            )));
        }
        if targets.len() != n {
            return Err(CriticError::Training(format!(
                "{} targets for {} samples",
                targets.len(),
                n
            )));
        }
        let targets_vec = targets.to_vec();
        let positives = targets_vec.iter().filter(|t| **t == 1).count();
        if positives == 0 || positives == n {
            return Err(CriticError::Training(
                "training split contains a single class".into(),
            ));
        }

        let class_w = match self.class_weight {
            ClassWeight::Balanced => balanced_class_weights(&targets_vec),
            ClassWeight::None => [1.0, 1.0],
        };
        let sample_w: Vec<f64> = match dataset.weights() {
            Some(ws) if ws.len() == n => ws.iter().map(|w| *w as f64).collect(),
            _ => vec![1.0; n],
        };
        let problem = Problem {
            x,
            y: targets.mapv(|t| if t == 1 { 1.0 } else { 0.0 }),
            s: Array1::from(
                targets_vec
                    .iter()
                    .zip(sample_w.iter())
                    .map(|(t, w)| w * class_w[usize::from(*t == 1)])
                    .collect::<Vec<_>>(),
            ),
            inv_c: 1.0 / self.c,
        };

        let mut w = Array1::<f64>::zeros(x.ncols());
        let mut b = 0.0_f64;
        let mut step = 1.0_f64;
        let mut converged = false;
        let mut n_iter = 0usize;

        for iter in 0..self.max_iter {
            n_iter = iter + 1;
            let (gw, gb) = problem.gradient(&w, b);
            let gmax = gw.iter().fold(gb.abs(), |m, g| m.max(g.abs()));
            if !gmax.is_finite() {
                return Err(CriticError::Training("non-finite gradient".into()));
            }
            if gmax <= self.tol {
                converged = true;
                break;
            }

            let f0 = problem.objective(&w, b);
            if !f0.is_finite() {
                return Err(CriticError::Training("non-finite objective".into()));
            }
            let gnorm2 = gw.dot(&gw) + gb * gb;

            // Backtracking line search along the negative gradient.
            let mut accepted = false;
            while step > 1e-12 {
                let w_new = &w - &(&gw * step);
                let b_new = b - step * gb;
                let f_new = problem.objective(&w_new, b_new);
                if f_new.is_finite() && f_new <= f0 - 1e-4 * step * gnorm2 {
                    w = w_new;
                    b = b_new;
                    accepted = true;
                    break;
                }
                step *= 0.5;
            }
            if !accepted {
                // No descent possible at machine precision: we are at the optimum.
                converged = true;
                break;
            }
            step *= 2.0;
        }

        if converged {
            debug!(iterations = n_iter, "logistic regression converged");
        } else {
            warn!(
                max_iter = self.max_iter,
                "logistic regression did not converge; consider raising max_iter"
            );
        }

        Ok(LogisticModel {
            coef: w.to_vec(),
            intercept: b,
            n_iter,
            converged,
        })
    }
}

impl LogisticModel {
    pub fn n_features(&self) -> usize {
        self.coef.len()
    }

    /// Signed distance to the decision boundary.
    pub fn decision_function(&self, x: ArrayView1<f64>) -> f64 {
        x.iter()
            .zip(self.coef.iter())
            .map(|(a, b)| a * b)
            .sum::<f64>()
            + self.intercept
    }

    /// Positive-class probability.
    pub fn predict_proba(&self, x: ArrayView1<f64>) -> f64 {
        sigmoid(self.decision_function(x))
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.intercept.is_finite() && self.coef.iter().all(|c| c.is_finite())
    }
}
