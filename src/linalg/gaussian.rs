//! Gaussian elimination over an augmented matrix, used as the fallback when
//! a tridiagonal system fails the diagonal-dominance guard.

use crate::linalg::LinearSolveError;

/// Solves the N linear equations encoded by an N x (N+1) augmented matrix,
/// row `i` reading `m[i][0]*x_0 + ... + m[i][N-1]*x_{N-1} = m[i][N]`.
///
/// Pivot selection works column by column: among the rows not yet chosen as
/// pivots (eliminated lazily against the previous pivot first), only rows
/// with a non-zero leading value are candidates, and the winner maximises
/// the ratio of the leading value to the smallest non-zero entry further
/// along the row. Failure to find any candidate fails with
/// [`LinearSolveError::Indeterminate`]. The input is copied.
pub fn solve_gaussian(matrix: &[Vec<f64>]) -> Result<Vec<f64>, LinearSolveError> {
    let n = matrix.len();
    if n == 0 {
        return Err(LinearSolveError::InvalidInput(
            "matrix must contain at least one row",
        ));
    }
    if matrix.iter().any(|row| row.len() != n + 1) {
        return Err(LinearSolveError::InvalidInput(
            "augmented matrix rows must be one longer than the row count",
        ));
    }

    let mut m: Vec<Vec<f64>> = matrix.to_vec();
    let mut pivot_rows: Vec<usize> = Vec::with_capacity(n);

    for col in 0..n {
        let mut pivot_ratio = 0.0;
        let mut pivot_row: Option<usize> = None;
        for row in 0..n {
            if pivot_rows.contains(&row) {
                continue;
            }
            if col > 0 {
                // Lazily reduce this row against the previous pivot so the
                // entries below it are zero before candidacy is judged.
                let scale = m[row][col - 1];
                let previous_pivot = pivot_rows[col - 1];
                for i in (col - 1)..=n {
                    m[row][i] -= scale * m[previous_pivot][i];
                }
            }

            let leading = m[row][col];
            if leading == 0.0 {
                continue;
            }
            let mut smallest = f64::MAX;
            for i in 1..n {
                let magnitude = m[row][i].abs();
                if magnitude != 0.0 && magnitude < smallest {
                    smallest = magnitude;
                }
            }
            let ratio = (leading / smallest).abs();
            if ratio > pivot_ratio {
                pivot_row = Some(row);
                pivot_ratio = ratio;
            }
        }

        let pivot_row = pivot_row.ok_or(LinearSolveError::Indeterminate)?;
        pivot_rows.push(pivot_row);
        // Normalise the pivot row by its leading entry, constant included.
        for i in (col..=n).rev() {
            m[pivot_row][i] /= m[pivot_row][col];
        }
    }

    let mut result = vec![0.0; n];
    for i in (0..n).rev() {
        let row = pivot_rows[i];
        for j in ((i + 1)..n).rev() {
            m[row][n] -= m[row][j] * result[j];
        }
        result[i] = m[row][n];
    }
    Ok(result)
}

/// Packs tridiagonal bands and a right-hand side into the augmented matrix
/// layout [`solve_gaussian`] expects, zero everywhere off the three bands.
pub fn pack_tridiagonal(a: &[f64], b: &[f64], c: &[f64], d: &[f64]) -> Vec<Vec<f64>> {
    let n = b.len();
    let mut matrix = vec![vec![0.0; n + 1]; n];
    for i in 0..n {
        if i > 0 {
            matrix[i][i - 1] = a[i - 1];
        }
        matrix[i][i] = b[i];
        if i < n - 1 {
            matrix[i][i + 1] = c[i];
        }
        matrix[i][n] = d[i];
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::linalg::solve_tridiagonal;
    use approx::assert_abs_diff_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn solves_dense_reference_system() {
        // x + y + z = 6, 2y + 5z = -4, 2x + 5y - z = 27 => (5, 3, -2)
        let matrix = vec![
            vec![1.0, 1.0, 1.0, 6.0],
            vec![0.0, 2.0, 5.0, -4.0],
            vec![2.0, 5.0, -1.0, 27.0],
        ];
        let x = solve_gaussian(&matrix).unwrap();
        assert_abs_diff_eq!(x[0], 5.0, epsilon = 1.0e-10);
        assert_abs_diff_eq!(x[1], 3.0, epsilon = 1.0e-10);
        assert_abs_diff_eq!(x[2], -2.0, epsilon = 1.0e-10);
    }

    #[test]
    fn matches_thomas_on_packed_tridiagonal_systems() {
        let a = [1.0, 1.0, 1.0];
        let b = [2.0, 3.0, 3.0, 2.0];
        let c = [1.0, 1.0, 1.0];
        let d = [1.0, 1.0, 1.0, 1.0];
        let thomas = solve_tridiagonal(&a, &b, &c, &d, true).unwrap();
        let gaussian = solve_gaussian(&pack_tridiagonal(&a, &b, &c, &d)).unwrap();
        for (&t, &g) in thomas.iter().zip(&gaussian) {
            assert_abs_diff_eq!(t, g, epsilon = 1.0e-10);
        }
    }

    #[test]
    fn solves_systems_the_dominance_guard_rejects() {
        // |a| + |c| == |b| on the middle row trips the Thomas guard but has
        // a unique solution the fallback finds.
        let a = [1.0, 1.0];
        let b = [2.0, 2.0, 2.0];
        let c = [1.0, 1.0];
        let d = [1.0, 2.0, 3.0];
        assert!(solve_tridiagonal(&a, &b, &c, &d, true).is_err());

        let x = solve_gaussian(&pack_tridiagonal(&a, &b, &c, &d)).unwrap();
        assert_abs_diff_eq!(2.0 * x[0] + x[1], 1.0, epsilon = 1.0e-10);
        assert_abs_diff_eq!(x[0] + 2.0 * x[1] + x[2], 2.0, epsilon = 1.0e-10);
        assert_abs_diff_eq!(x[1] + 2.0 * x[2], 3.0, epsilon = 1.0e-10);
    }

    #[test]
    fn singular_system_is_indeterminate() {
        let matrix = vec![vec![1.0, 1.0, 2.0], vec![2.0, 2.0, 4.0]];
        assert_eq!(solve_gaussian(&matrix), Err(LinearSolveError::Indeterminate));
    }

    #[test]
    fn malformed_rows_are_rejected() {
        assert!(matches!(
            solve_gaussian(&[vec![1.0, 2.0]]),
            Err(LinearSolveError::InvalidInput(_))
        ));
        assert!(matches!(
            solve_gaussian(&Vec::<Vec<f64>>::new()),
            Err(LinearSolveError::InvalidInput(_))
        ));
    }

    #[test]
    fn random_dominant_systems_have_small_residuals() {
        let mut rng = StdRng::seed_from_u64(90210);
        for _ in 0..20 {
            let n = rng.gen_range(3..12);
            let a: Vec<f64> = (0..n - 1).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let c: Vec<f64> = (0..n - 1).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let mut b = vec![0.0; n];
            for i in 0..n {
                let off = if i > 0 { a[i - 1].abs() } else { 0.0 }
                    + if i < n - 1 { c[i].abs() } else { 0.0 };
                b[i] = off + rng.gen_range(0.5..2.0);
            }
            let d: Vec<f64> = (0..n).map(|_| rng.gen_range(-5.0..5.0)).collect();

            let thomas = solve_tridiagonal(&a, &b, &c, &d, true).unwrap();
            let gaussian = solve_gaussian(&pack_tridiagonal(&a, &b, &c, &d)).unwrap();
            for (&t, &g) in thomas.iter().zip(&gaussian) {
                assert_abs_diff_eq!(t, g, epsilon = 1.0e-8);
            }
        }
    }
}
