//! Dense Gaussian elimination without pivoting.
//!
//! Row swaps are never performed: the row order of the augmented matrix is
//! the DOF order the caller needs to map the solution back, and a singular
//! configuration is expected to fail rather than be rescued.

use nalgebra::{DMatrix, DVector};

use crate::error::FeldsparError;

/// Entries within this distance of zero count as zero when checking a
/// reduced row for linear dependence
pub const ZERO_ROW_TOLERANCE: f64 = 1e-5;

/// Appends a right hand side vector to a square matrix
///
/// # Arguments
/// * `f` - The right hand side vector, of length `n`
/// * `k` - An `n x n` coefficient matrix
///
/// # Returns
/// An `n x (n+1)` matrix whose last column is `f`
pub fn augment_matrix(f: &DVector<f64>, k: &DMatrix<f64>) -> Result<DMatrix<f64>, FeldsparError> {
    if !k.is_square() {
        return Err(FeldsparError::InvalidDimensions(format!(
            "cannot augment a non-square {}x{} matrix",
            k.nrows(),
            k.ncols()
        )));
    }
    if f.len() != k.nrows() {
        return Err(FeldsparError::InvalidDimensions(format!(
            "vector of length {} does not match {}x{} matrix",
            f.len(),
            k.nrows(),
            k.ncols()
        )));
    }

    let n = k.nrows();
    let mut aug = k.clone().insert_column(n, 0.0);
    aug.set_column(n, f);

    Ok(aug)
}

fn check_augmented(m: &DMatrix<f64>) -> Result<usize, FeldsparError> {
    if m.ncols() != m.nrows() + 1 {
        return Err(FeldsparError::InvalidDimensions(format!(
            "expected an n x (n+1) augmented matrix, got {}x{}",
            m.nrows(),
            m.ncols()
        )));
    }
    Ok(m.nrows())
}

/// Reduces an augmented matrix to row echelon form in place
///
/// # Arguments
/// * `m` - An `n x (n+1)` augmented matrix
///
/// # Errors
/// * `ZeroPivot` if a diagonal entry is exactly zero when it is needed as a pivot
/// * `UnderdeterminedSystem` if elimination produces a row of zeros
pub fn forward_eliminate(m: &mut DMatrix<f64>) -> Result<(), FeldsparError> {
    let n = check_augmented(m)?;

    for pivot in 0..n.saturating_sub(1) {
        let pivot_value = m[(pivot, pivot)];
        if pivot_value == 0.0 {
            return Err(FeldsparError::ZeroPivot { pivot });
        }

        for row in (pivot + 1)..n {
            let factor = m[(row, pivot)] / pivot_value;

            for col in pivot..=n {
                let reduction = factor * m[(pivot, col)];
                m[(row, col)] -= reduction;
            }

            if m.row(row).iter().all(|x| x.abs() <= ZERO_ROW_TOLERANCE) {
                return Err(FeldsparError::UnderdeterminedSystem { row });
            }
        }
    }

    Ok(())
}

/// Solves a row echelon augmented matrix from the last row up
///
/// # Arguments
/// * `m` - An `n x (n+1)` matrix in row echelon form
/// * `d` - Receives the solution, must have length `n`
///
/// # Errors
/// * `InconsistentSystem` if a row has a zero diagonal and a nonzero residual
pub fn back_substitute(m: &DMatrix<f64>, d: &mut DVector<f64>) -> Result<(), FeldsparError> {
    let n = check_augmented(m)?;
    if d.len() != n {
        return Err(FeldsparError::InvalidDimensions(format!(
            "solution vector has length {} but the system has {} rows",
            d.len(),
            n
        )));
    }

    for row in (0..n).rev() {
        let mut value = m[(row, n)];
        for solved in (row + 1)..n {
            value -= d[solved] * m[(row, solved)];
        }

        let diagonal = m[(row, row)];
        if diagonal == 0.0 {
            if value != 0.0 {
                return Err(FeldsparError::InconsistentSystem { row });
            }
            // free variable with nothing driving it
            d[row] = 0.0;
        } else {
            d[row] = value / diagonal;
        }
    }

    Ok(())
}

/// Runs elimination and substitution, returning the solution
pub fn solve(mut m: DMatrix<f64>) -> Result<DVector<f64>, FeldsparError> {
    forward_eliminate(&mut m)?;
    let mut d = DVector::zeros(m.nrows());
    back_substitute(&m, &mut d)?;
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{dmatrix, dvector};

    #[test]
    fn augment_appends_force_column() {
        let k = dmatrix![1.0, 2.0; 3.0, 4.0];
        let f = dvector![5.0, 6.0];
        let aug = augment_matrix(&f, &k).unwrap();
        assert_eq!(aug, dmatrix![1.0, 2.0, 5.0; 3.0, 4.0, 6.0]);
    }

    #[test]
    fn augment_rejects_bad_shapes() {
        let f = dvector![1.0, 2.0];
        let non_square = DMatrix::<f64>::zeros(2, 3);
        assert!(matches!(
            augment_matrix(&f, &non_square),
            Err(FeldsparError::InvalidDimensions(_))
        ));

        let k = DMatrix::<f64>::identity(3, 3);
        assert!(matches!(
            augment_matrix(&f, &k),
            Err(FeldsparError::InvalidDimensions(_))
        ));
    }

    #[test]
    fn diagonal_system_solves() {
        let k = dmatrix![2.0, 0.0; 0.0, 2.0];
        let f = dvector![4.0, 6.0];
        let mut aug = augment_matrix(&f, &k).unwrap();

        forward_eliminate(&mut aug).unwrap();
        let mut d = DVector::zeros(2);
        back_substitute(&aug, &mut d).unwrap();

        assert_relative_eq!(d, dvector![2.0, 3.0]);
    }

    #[test]
    fn dense_system_solves() {
        let k = dmatrix![
            4.0, -1.0, 0.0;
            -1.0, 4.0, -1.0;
            0.0, -1.0, 4.0
        ];
        let expected = dvector![1.0, -2.0, 3.0];
        let f = &k * &expected;

        let d = solve(augment_matrix(&f, &k).unwrap()).unwrap();
        assert_relative_eq!(d, expected, epsilon = 1e-12);
    }

    #[test]
    fn elimination_leaves_upper_triangle() {
        let mut m = dmatrix![
            2.0, 1.0, 1.0, 5.0;
            4.0, -6.0, 0.0, -2.0;
            -2.0, 7.0, 2.0, 9.0
        ];
        forward_eliminate(&mut m).unwrap();
        assert_relative_eq!(m[(1, 0)], 0.0);
        assert_relative_eq!(m[(2, 0)], 0.0);
        assert_relative_eq!(m[(2, 1)], 0.0);
    }

    #[test]
    fn zero_pivot_is_not_swapped_away() {
        let mut m = dmatrix![0.0, 1.0, 1.0; 1.0, 0.0, 1.0];
        let before = m.clone();
        assert!(matches!(
            forward_eliminate(&mut m),
            Err(FeldsparError::ZeroPivot { pivot: 0 })
        ));
        assert_eq!(m, before);
    }

    #[test]
    fn dependent_rows_are_underdetermined() {
        let mut m = dmatrix![1.0, 2.0, 3.0; 2.0, 4.0, 6.0];
        assert!(matches!(
            forward_eliminate(&mut m),
            Err(FeldsparError::UnderdeterminedSystem { row: 1 })
        ));
    }

    #[test]
    fn contradictory_row_is_inconsistent() {
        let m = dmatrix![1.0, 1.0, 2.0; 0.0, 0.0, 1.0];
        let mut d = DVector::zeros(2);
        assert!(matches!(
            back_substitute(&m, &mut d),
            Err(FeldsparError::InconsistentSystem { row: 1 })
        ));
    }

    #[test]
    fn free_variable_with_zero_residual_is_zeroed() {
        let m = dmatrix![1.0, 1.0, 2.0; 0.0, 0.0, 0.0];
        let mut d = DVector::zeros(2);
        back_substitute(&m, &mut d).unwrap();
        assert_relative_eq!(d, dvector![2.0, 0.0]);
    }

    #[test]
    fn empty_system_is_trivially_solved() {
        let d = solve(DMatrix::zeros(0, 1)).unwrap();
        assert_eq!(d.len(), 0);
    }

    #[test]
    fn non_augmented_input_is_rejected() {
        let mut square = DMatrix::<f64>::identity(2, 2);
        assert!(matches!(
            forward_eliminate(&mut square),
            Err(FeldsparError::InvalidDimensions(_))
        ));

        let m = dmatrix![1.0, 0.0, 1.0; 0.0, 1.0, 1.0];
        let mut short = DVector::zeros(1);
        assert!(matches!(
            back_substitute(&m, &mut short),
            Err(FeldsparError::InvalidDimensions(_))
        ));
    }
}
