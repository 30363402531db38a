//! Per-iteration target schedules
//!
//! The user supplies a handful of anchor values; a least-squares polynomial
//! through them, spread evenly over the sample budget, yields a smooth target
//! for every sample index.

/// Polynomial coefficients, lowest order first
#[derive(Debug, Clone, PartialEq)]
pub struct Polynomial {
    pub coefficients: Vec<f64>,
}

impl Polynomial {
    /// Least-squares fit of degree `degree` through `(xs[i], ys[i])`
    ///
    /// Returns `None` if the normal equations are singular (for example,
    /// fewer distinct x values than coefficients).
    pub fn fit(xs: &[f64], ys: &[f64], degree: usize) -> Option<Self> {
        let n = degree + 1;
        if xs.len() != ys.len() || xs.len() < n {
            return None;
        }

        // Normal equations A^T A c = A^T y, A[i][j] = x_i^j
        let mut ata = vec![vec![0.0; n]; n];
        let mut aty = vec![0.0; n];
        for (&x, &y) in xs.iter().zip(ys) {
            let powers: Vec<f64> = (0..2 * n).map(|k| x.powi(k as i32)).collect();
            for row in 0..n {
                for col in 0..n {
                    ata[row][col] += powers[row + col];
                }
                aty[row] += powers[row] * y;
            }
        }

        solve(ata, aty).map(|coefficients| Polynomial { coefficients })
    }

    /// Horner evaluation
    pub fn eval(&self, x: f64) -> f64 {
        self.coefficients.iter().rev().fold(0.0, |acc, c| acc * x + c)
    }
}

/// Gaussian elimination with partial pivoting
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Option<Vec<f64>> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);

        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            for k in col..n {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}

/// Evaluate the fit through `support` at every index `0..len`
///
/// Support points sit at evenly spaced positions over `[0, len]`. Values are
/// clamped to `[lo, hi]`. A single support point yields a constant schedule.
pub fn fit_schedule(support: &[f64], degree: usize, len: usize, lo: f64, hi: f64) -> Option<Vec<f64>> {
    if support.is_empty() {
        return None;
    }
    if support.len() == 1 {
        return Some(vec![support[0].clamp(lo, hi); len]);
    }

    // Fit on [0, 1] to keep the normal equations well conditioned
    let last = (support.len() - 1) as f64;
    let xs: Vec<f64> = (0..support.len()).map(|i| i as f64 / last).collect();
    let poly = Polynomial::fit(&xs, support, degree)?;

    let span = len.max(1) as f64;
    Some((0..len)
        .map(|i| poly.eval(i as f64 / span).clamp(lo, hi))
        .collect())
}
