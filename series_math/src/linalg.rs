//! Dense least squares for small design matrices
//!
//! Systems here are tens of columns wide, so plain Gauss-Jordan elimination on
//! the normal equations is enough.

use crate::{MathError, Result};

const PIVOT_EPSILON: f64 = 1e-12;

/// Solve `(XᵀX + diag(penalties)) β = Xᵀy` for `β`.
///
/// `design` holds one row per observation, every row with the same number of
/// columns as `penalties`.
pub fn solve_ridge(design: &[Vec<f64>], targets: &[f64], penalties: &[f64]) -> Result<Vec<f64>> {
    if design.is_empty() {
        return Err(MathError::InsufficientData(
            "Design matrix has no rows".to_string(),
        ));
    }

    if design.len() != targets.len() {
        return Err(MathError::InvalidInput(format!(
            "Design rows ({}) doesn't match targets ({})",
            design.len(),
            targets.len()
        )));
    }

    let n = penalties.len();
    if let Some(row) = design.iter().find(|row| row.len() != n) {
        return Err(MathError::InvalidInput(format!(
            "Design row has {} columns, expected {}",
            row.len(),
            n
        )));
    }

    let mut normal = vec![0.0; n * n];
    let mut rhs = vec![0.0; n];

    for (row, &y) in design.iter().zip(targets.iter()) {
        for i in 0..n {
            if row[i] == 0.0 {
                continue;
            }
            rhs[i] += row[i] * y;
            for j in i..n {
                normal[i * n + j] += row[i] * row[j];
            }
        }
    }

    // Mirror the upper triangle and add the ridge penalties
    for i in 0..n {
        for j in 0..i {
            normal[i * n + j] = normal[j * n + i];
        }
        normal[i * n + i] += penalties[i];
    }

    solve_linear_system(normal, rhs, n)
}

/// Solve the square system `A x = b` with Gauss-Jordan elimination and
/// partial pivoting. `matrix` is row-major `n * n`.
pub fn solve_linear_system(mut matrix: Vec<f64>, mut rhs: Vec<f64>, n: usize) -> Result<Vec<f64>> {
    if matrix.len() != n * n || rhs.len() != n {
        return Err(MathError::InvalidInput(format!(
            "Expected a {n}x{n} system, got {} coefficients and {} right-hand values",
            matrix.len(),
            rhs.len()
        )));
    }

    for col in 0..n {
        // Find pivot
        let pivot_row = (col..n)
            .max_by(|&a, &b| {
                matrix[a * n + col]
                    .abs()
                    .total_cmp(&matrix[b * n + col].abs())
            })
            .unwrap_or(col);

        if matrix[pivot_row * n + col].abs() < PIVOT_EPSILON {
            return Err(MathError::CalculationError(format!(
                "Singular system at column {col}"
            )));
        }

        if pivot_row != col {
            for k in 0..n {
                matrix.swap(col * n + k, pivot_row * n + k);
            }
            rhs.swap(col, pivot_row);
        }

        let pivot = matrix[col * n + col];
        for k in col..n {
            matrix[col * n + k] /= pivot;
        }
        rhs[col] /= pivot;

        // Eliminate column
        for row in 0..n {
            if row == col {
                continue;
            }
            let factor = matrix[row * n + col];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                matrix[row * n + k] -= factor * matrix[col * n + k];
            }
            rhs[row] -= factor * rhs[col];
        }
    }

    Ok(rhs)
}
