use nalgebra::DMatrix;

use crate::{
    datatypes::{Axis, Constraint, DOF},
    error::FeldsparError,
};

/// An augmented system with the constrained DOFs removed
#[derive(Debug, Clone, PartialEq)]
pub struct ConstrainedSystem {
    /// `m x (m+1)` where `m` is the number of free DOFs
    pub matrix: DMatrix<f64>,
    /// `mapping[i]` is the global DOF that ended up in row `i`
    pub mapping: Vec<usize>,
}

impl ConstrainedSystem {
    pub fn free_dofs(&self) -> usize {
        self.mapping.len()
    }
}

/// Global DOFs left free by the constraint flags, in ascending order
pub fn free_dofs(constraints: &[Constraint]) -> Vec<usize> {
    (0..DOF * constraints.len())
        .filter(|&dof| {
            let (node, axis) = Axis::of_dof(dof);
            !constraints[node].is_constrained(axis)
        })
        .collect()
}

/// Removes the rows and columns of constrained DOFs from an augmented matrix
///
/// Survivors keep their relative order. The trailing force column is always
/// kept.
///
/// # Arguments
/// * `aug` - A `2N x (2N+1)` augmented matrix
/// * `constraints` - Constraint flags of the `N` nodes, in dense order
///
/// # Returns
/// The reduced system and the row to global DOF mapping
pub fn constrain_augmented(
    aug: &DMatrix<f64>,
    constraints: &[Constraint],
) -> Result<ConstrainedSystem, FeldsparError> {
    let dofs = DOF * constraints.len();
    if aug.nrows() != dofs || aug.ncols() != dofs + 1 {
        return Err(FeldsparError::InvalidDimensions(format!(
            "augmented matrix is {}x{} but {} nodes need {}x{}",
            aug.nrows(),
            aug.ncols(),
            constraints.len(),
            dofs,
            dofs + 1
        )));
    }

    let mapping = free_dofs(constraints);

    let constrained_count: usize = constraints.iter().map(Constraint::count).sum();
    if mapping.len() != dofs - constrained_count {
        return Err(FeldsparError::InvalidDimensions(format!(
            "mapping has {} entries, expected {}",
            mapping.len(),
            dofs - constrained_count
        )));
    }

    let size = mapping.len();
    let matrix = DMatrix::from_fn(size, size + 1, |row, col| {
        let global_col = if col == size { dofs } else { mapping[col] };
        aug[(mapping[row], global_col)]
    });

    Ok(ConstrainedSystem { matrix, mapping })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Entry `(r, c)` is `10r + c` so survivors are easy to trace
    fn traced(dofs: usize) -> DMatrix<f64> {
        DMatrix::from_fn(dofs, dofs + 1, |r, c| (10 * r + c) as f64)
    }

    #[test]
    fn constrained_rows_and_columns_are_dropped() {
        let constraints = [
            Constraint::FIXED,
            Constraint::new(false, true),
            Constraint::FREE,
        ];
        let system = constrain_augmented(&traced(6), &constraints).unwrap();

        assert_eq!(system.mapping, vec![2, 4, 5]);
        assert_eq!(system.matrix.shape(), (3, 4));
        assert_eq!(system.matrix.row(0).iter().copied().collect::<Vec<_>>(), vec![22.0, 24.0, 25.0, 26.0]);
        assert_eq!(system.matrix.row(2).iter().copied().collect::<Vec<_>>(), vec![52.0, 54.0, 55.0, 56.0]);
    }

    #[test]
    fn shape_follows_constrained_count() {
        let all = [
            Constraint::FREE,
            Constraint::FIXED,
            Constraint::new(true, false),
            Constraint::new(false, true),
        ];
        for n in 1..=all.len() {
            let constraints = &all[..n];
            let c: usize = constraints.iter().map(Constraint::count).sum();
            let system = constrain_augmented(&traced(2 * n), constraints).unwrap();

            assert_eq!(system.matrix.nrows(), 2 * n - c);
            assert_eq!(system.matrix.ncols(), 2 * n - c + 1);
            assert_eq!(system.free_dofs(), 2 * n - c);
            assert!(system.mapping.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[test]
    fn fully_fixed_leaves_only_the_force_column() {
        let system = constrain_augmented(&traced(4), &[Constraint::FIXED; 2]).unwrap();
        assert!(system.mapping.is_empty());
        assert_eq!(system.matrix.shape(), (0, 1));
    }

    #[test]
    fn mismatched_flags_are_rejected() {
        assert!(matches!(
            constrain_augmented(&traced(4), &[Constraint::FREE; 3]),
            Err(FeldsparError::InvalidDimensions(_))
        ));
        let square = DMatrix::<f64>::zeros(4, 4);
        assert!(matches!(
            constrain_augmented(&square, &[Constraint::FREE; 2]),
            Err(FeldsparError::InvalidDimensions(_))
        ));
    }
}
