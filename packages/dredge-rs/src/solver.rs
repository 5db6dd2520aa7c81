//! Regularized least-squares solve for the displacement trajectory.
//!
//! For every spatial window `w` and time bin `t` the unknown `p[w, t]`
//! minimizes
//!
//! ```text
//! Σ U_ij (p_j - p_i - D_ij)²            pairwise displacement agreement
//! + λ_t Σ (p_{t+1} - p_t)²              temporal smoothness
//! + λ_s Σ (p_{w+1,t} - p_{w,t})²        smoothness across windows
//! + ε Σ p²                              gauge
//! ```
//!
//! The first `n_fixed` bins of every window may carry known values (the tail
//! of the previous chunk); terms that touch them anchor the free bins.
//! The normal equations are symmetric positive definite and are solved with
//! Jacobi-preconditioned conjugate gradients.

use crate::error::{MotionError, Result};
use crate::xcorr::PairwiseDisplacement;
use nalgebra::DVector;
use rayon::prelude::*;

/// Pair data of one spatial window
#[derive(Debug, Clone, Copy)]
pub struct WindowTerms<'a> {
    pub pairs: &'a PairwiseDisplacement,
    /// Weight per pair, same layout as `pairs` (`i * horizon + k - 1`)
    pub weights: &'a [f64],
    /// Known displacement of the first `n_fixed` bins
    pub fixed: &'a [f64],
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverSettings {
    pub lambda_t: f64,
    pub lambda_s: f64,
    pub eps: f64,
    pub max_iterations: usize,
    pub tolerance: f64,
}

/// Solver output: free-bin displacement per window
#[derive(Debug, Clone)]
pub struct Solution {
    pub displacement: Vec<Vec<f64>>,
    pub iterations: usize,
    pub relative_residual: f64,
}

struct Problem<'a> {
    windows: &'a [WindowTerms<'a>],
    n_fixed: usize,
    n_time: usize,
    settings: &'a SolverSettings,
}

impl<'a> Problem<'a> {
    fn n_free(&self) -> usize {
        self.n_time - self.n_fixed
    }

    /// Visit every quadratic coupling `(i, j, U, D)` of window `w` with `j > i`
    fn for_each_edge(&self, w: usize, mut visit: impl FnMut(usize, usize, f64, f64)) {
        let terms = &self.windows[w];
        for t in 0..self.n_time.saturating_sub(1) {
            visit(t, t + 1, self.settings.lambda_t, 0.0);
        }

        let horizon = terms.pairs.horizon();
        for i in 0..self.n_time {
            for k in 1..=horizon {
                let j = i + k;
                if j >= self.n_time {
                    break;
                }
                let u = terms.weights[i * horizon + k - 1];
                if u > 0.0 {
                    visit(i, j, u, terms.pairs.disp(i, k));
                }
            }
        }
    }

    fn spatial_degree(&self, w: usize) -> f64 {
        let n_windows = self.windows.len();
        let mut degree = 0.0;
        if w > 0 {
            degree += 1.0;
        }
        if w + 1 < n_windows {
            degree += 1.0;
        }
        degree
    }

    /// Diagonal of the system matrix and the right-hand side
    fn assemble(&self) -> (Vec<f64>, Vec<f64>) {
        let m = self.n_free();
        let n = m * self.windows.len();
        let mut diag = vec![0.0; n];
        let mut rhs = vec![0.0; n];

        diag.par_chunks_mut(m)
            .zip(rhs.par_chunks_mut(m))
            .enumerate()
            .for_each(|(w, (d, b))| {
                let base = self.settings.eps + self.settings.lambda_s * self.spatial_degree(w);
                d.iter_mut().for_each(|v| *v = base);

                let fixed = self.windows[w].fixed;
                self.for_each_edge(w, |i, j, u, disp| {
                    if j < self.n_fixed {
                        return;
                    }
                    let fj = j - self.n_fixed;
                    if i < self.n_fixed {
                        d[fj] += u;
                        b[fj] += u * (fixed[i] + disp);
                    } else {
                        let fi = i - self.n_fixed;
                        d[fi] += u;
                        d[fj] += u;
                        b[fj] += u * disp;
                        b[fi] -= u * disp;
                    }
                });
            });

        (diag, rhs)
    }

    /// System matrix times `x`
    fn apply(&self, x: &DVector<f64>) -> DVector<f64> {
        let m = self.n_free();
        let n_windows = self.windows.len();
        let xs = x.as_slice();
        let mut y = DVector::zeros(xs.len());

        y.as_mut_slice()
            .par_chunks_mut(m)
            .enumerate()
            .for_each(|(w, yw)| {
                let xw = &xs[w * m..(w + 1) * m];
                let degree = self.spatial_degree(w);
                for t in 0..m {
                    let mut v = (self.settings.eps + self.settings.lambda_s * degree) * xw[t];
                    if w > 0 {
                        v -= self.settings.lambda_s * xs[(w - 1) * m + t];
                    }
                    if w + 1 < n_windows {
                        v -= self.settings.lambda_s * xs[(w + 1) * m + t];
                    }
                    yw[t] = v;
                }

                self.for_each_edge(w, |i, j, u, _| {
                    if j < self.n_fixed {
                        return;
                    }
                    let fj = j - self.n_fixed;
                    if i < self.n_fixed {
                        yw[fj] += u * xw[fj];
                    } else {
                        let fi = i - self.n_fixed;
                        let r = u * (xw[fj] - xw[fi]);
                        yw[fj] += r;
                        yw[fi] -= r;
                    }
                });
            });

        y
    }
}

/// Solve for the displacement of the free bins of every window
///
/// All windows must cover the same number of bins. Returns
/// `NonConvergence` when the relative residual is still above the tolerance
/// after `max_iterations`.
pub fn solve(windows: &[WindowTerms], n_fixed: usize, settings: &SolverSettings) -> Result<Solution> {
    let Some(first) = windows.first() else {
        return Err(MotionError::InvalidParameter("no spatial window to solve".to_string()));
    };
    let n_time = first.pairs.n_time();
    if n_fixed >= n_time {
        return Err(MotionError::InvalidParameter(format!(
            "{} fixed bins leave nothing to solve in {} bins",
            n_fixed, n_time
        )));
    }
    for terms in windows {
        if terms.pairs.n_time() != n_time || terms.fixed.len() < n_fixed {
            return Err(MotionError::InvalidParameter(
                "spatial windows disagree on the number of bins".to_string(),
            ));
        }
    }

    let problem = Problem {
        windows,
        n_fixed,
        n_time,
        settings,
    };
    let m = problem.n_free();
    let (diag, rhs) = problem.assemble();

    let b = DVector::from_vec(rhs);
    let inv_diag = DVector::from_iterator(diag.len(), diag.iter().map(|d| 1.0 / d));
    let b_norm = b.norm();

    let split = |x: DVector<f64>| -> Vec<Vec<f64>> {
        x.as_slice().chunks(m).map(|c| c.to_vec()).collect()
    };

    if b_norm == 0.0 {
        log::debug!("Right-hand side is zero, displacement is zero");
        return Ok(Solution {
            displacement: split(DVector::zeros(b.len())),
            iterations: 0,
            relative_residual: 0.0,
        });
    }

    let mut x = DVector::zeros(b.len());
    let mut r = b.clone();
    let mut z = r.component_mul(&inv_diag);
    let mut p = z.clone();
    let mut rz = r.dot(&z);
    let mut relative_residual = 1.0;

    for iteration in 1..=settings.max_iterations {
        let ap = problem.apply(&p);
        let pap = p.dot(&ap);
        if !pap.is_finite() || pap <= 0.0 {
            return Err(MotionError::NonConvergence {
                iterations: iteration,
                residual: relative_residual,
            });
        }

        let alpha = rz / pap;
        x.axpy(alpha, &p, 1.0);
        r.axpy(-alpha, &ap, 1.0);

        relative_residual = r.norm() / b_norm;
        if relative_residual <= settings.tolerance {
            log::debug!(
                "Conjugate gradients converged in {} iterations (relative residual {:.3e})",
                iteration,
                relative_residual
            );
            return Ok(Solution {
                displacement: split(x),
                iterations: iteration,
                relative_residual,
            });
        }

        z = r.component_mul(&inv_diag);
        let rz_next = r.dot(&z);
        let beta = rz_next / rz;
        rz = rz_next;
        p.axpy(1.0, &z, beta);
    }

    Err(MotionError::NonConvergence {
        iterations: settings.max_iterations,
        residual: relative_residual,
    })
}
