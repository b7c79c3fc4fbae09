//! Dense linear solves for small normal-equation systems

use crate::{MathError, Result};

const PIVOT_EPSILON: f64 = 1e-12;

/// Solve `a * x = b` for a square system using Gaussian elimination with
/// partial pivoting. `a` is given row-major as one `Vec` per row.
pub fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let n = b.len();
    if a.len() != n || a.iter().any(|row| row.len() != n) {
        return Err(MathError::InvalidInput(format!(
            "Expected a {n}x{n} system matching the right-hand side"
        )));
    }

    for col in 0..n {
        // Pick the row with the largest magnitude in this column
        let pivot_row = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);

        if a[pivot_row][col].abs() < PIVOT_EPSILON {
            return Err(MathError::CalculationError(format!(
                "Matrix is singular at column {col}"
            )));
        }

        a.swap(col, pivot_row);
        b.swap(col, pivot_row);

        let pivot = a[col].clone();
        let pivot_rhs = b[col];
        for row in col + 1..n {
            let factor = a[row][col] / pivot[col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[row][k] -= factor * pivot[k];
            }
            b[row] -= factor * pivot_rhs;
        }
    }

    // Back substitution
    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }

    Ok(x)
}
