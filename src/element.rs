use nalgebra::{matrix, SMatrix, Vector2};
use slotmap::SlotMap;

use crate::{
    datatypes::{Node, NodeKey, DOF},
    error::FeldsparError,
};

/// Local DOFs of a three node element
pub const ELEMENT_DOF: usize = 3 * DOF;

/// Calculates the z component of `(n2 - n1) x (n3 - n1)`
///
/// Positive when `n1, n2, n3` wind counter-clockwise.
pub fn cross_z(p1: &Vector2<f64>, p2: &Vector2<f64>, p3: &Vector2<f64>) -> f64 {
    let v1 = p2 - p1;
    let v2 = p3 - p1;
    v1.perp(&v2)
}

/// The constitutive matrix shared by every element
///
/// A simplified plane stress relation with unit modulus and no Poisson
/// coupling.
pub fn constitutive_matrix() -> SMatrix<f64, 3, 3> {
    matrix![
        1.0, 0.0, 0.0;
        0.0, 1.0, 0.0;
        0.0, 0.0, 0.5;
    ]
}

/// Calculates the strain-displacement matrix of a triangle
///
/// # Arguments
/// * `positions` - The current positions of the three nodes, in element order
/// * `element_area` - The unsigned area of the triangle
///
/// # Returns
/// A 3x6 strain-displacement matrix
pub fn compute_strain_displacement_matrix(
    positions: &[Vector2<f64>; 3],
    element_area: f64,
) -> Result<SMatrix<f64, 3, ELEMENT_DOF>, FeldsparError> {
    if element_area == 0.0 || !element_area.is_finite() {
        return Err(FeldsparError::DegenerateElement { area: element_area });
    }

    let [v0, v1, v2] = positions;

    let beta_1 = v1.y - v2.y;
    let beta_2 = v2.y - v0.y;
    let beta_3 = v0.y - v1.y;

    let gamma_1 = v2.x - v1.x;
    let gamma_2 = v0.x - v2.x;
    let gamma_3 = v1.x - v0.x;

    let mut strain_displacement_mat: SMatrix<f64, 3, ELEMENT_DOF> = matrix![
        beta_1, 0., beta_2, 0., beta_3, 0.;
        0., gamma_1, 0., gamma_2, 0., gamma_3;
        gamma_1, beta_1, gamma_2, beta_2, gamma_3, beta_3;
    ];

    strain_displacement_mat /= 2.0 * element_area;

    Ok(strain_displacement_mat)
}

/// A linear strain triangle over three graph nodes
///
/// The element does not own its nodes. It stores handles and resolves them
/// through the node arena whenever its geometry is needed.
#[derive(Debug, Clone)]
pub struct TriElement {
    nodes: [NodeKey; 3],
    area: f64,
    strain_displacement: SMatrix<f64, 3, ELEMENT_DOF>,
    stiffness: SMatrix<f64, ELEMENT_DOF, ELEMENT_DOF>,
}

impl TriElement {
    /// Builds an element, winding the nodes counter-clockwise
    ///
    /// # Arguments
    /// * `nodes` - The node arena the handles point into
    /// * `keys` - Three distinct node handles
    pub fn new(
        nodes: &SlotMap<NodeKey, Node>,
        keys: [NodeKey; 3],
    ) -> Result<TriElement, FeldsparError> {
        let [n1, n2, n3] = keys;
        if n1 == n2 || n2 == n3 || n1 == n3 {
            return Err(FeldsparError::InvalidSelection(
                "element nodes must be distinct".to_owned(),
            ));
        }

        let mut element = TriElement {
            nodes: keys,
            area: 0.0,
            strain_displacement: SMatrix::zeros(),
            stiffness: SMatrix::zeros(),
        };

        let [p1, p2, p3] = element.positions(nodes)?;
        if cross_z(&p1, &p2, &p3) < 0.0 {
            tracing::debug!("element nodes given clockwise, swapping first two");
            element.nodes.swap(0, 1);
        }

        Ok(element)
    }

    pub fn nodes(&self) -> [NodeKey; 3] {
        self.nodes
    }

    pub fn touches(&self, node: NodeKey) -> bool {
        self.nodes.contains(&node)
    }

    /// Area as of the last successful tick
    pub fn area(&self) -> f64 {
        self.area
    }

    pub fn strain_displacement(&self) -> &SMatrix<f64, 3, ELEMENT_DOF> {
        &self.strain_displacement
    }

    /// Local stiffness as of the last successful tick
    pub fn stiffness(&self) -> &SMatrix<f64, ELEMENT_DOF, ELEMENT_DOF> {
        &self.stiffness
    }

    /// Current node positions in element order
    pub fn positions(
        &self,
        nodes: &SlotMap<NodeKey, Node>,
    ) -> Result<[Vector2<f64>; 3], FeldsparError> {
        let mut positions = [Vector2::zeros(); 3];
        for (position, key) in positions.iter_mut().zip(self.nodes) {
            *position = nodes.get(key).ok_or(FeldsparError::StaleNode)?.position;
        }
        Ok(positions)
    }

    /// Dense indices of the three nodes, in element order
    pub fn node_indices(
        &self,
        nodes: &SlotMap<NodeKey, Node>,
    ) -> Result<[usize; 3], FeldsparError> {
        let mut indices = [0; 3];
        for (index, key) in indices.iter_mut().zip(self.nodes) {
            *index = nodes.get(key).ok_or(FeldsparError::StaleNode)?.index;
        }
        Ok(indices)
    }

    /// Global DOF of each local DOF, `x` before `y` for each node in turn
    pub fn global_dofs(
        &self,
        nodes: &SlotMap<NodeKey, Node>,
    ) -> Result<[usize; ELEMENT_DOF], FeldsparError> {
        let [i, j, k] = self.node_indices(nodes)?;
        Ok([
            DOF * i,
            DOF * i + 1,
            DOF * j,
            DOF * j + 1,
            DOF * k,
            DOF * k + 1,
        ])
    }

    /// Recomputes area, strain-displacement and stiffness from the current
    /// node positions
    ///
    /// On a degenerate triangle nothing is updated and the previous matrices
    /// are kept.
    pub fn tick(&mut self, nodes: &SlotMap<NodeKey, Node>) -> Result<(), FeldsparError> {
        let positions = self.positions(nodes)?;
        let [p1, p2, p3] = &positions;
        let area = cross_z(p1, p2, p3).abs() / 2.0;

        let strain_displacement = compute_strain_displacement_matrix(&positions, area)?;
        let stiffness = (strain_displacement.transpose() * constitutive_matrix())
            * strain_displacement
            * area;

        self.area = area;
        self.strain_displacement = strain_displacement;
        self.stiffness = stiffness;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};

    fn arena(points: &[(f64, f64)]) -> (SlotMap<NodeKey, Node>, Vec<NodeKey>) {
        let mut nodes = SlotMap::with_key();
        let keys = points
            .iter()
            .enumerate()
            .map(|(i, &(x, y))| nodes.insert(Node::new(Vector2::new(x, y), i)))
            .collect();
        (nodes, keys)
    }

    #[test]
    fn clockwise_nodes_are_swapped() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (0.0, 1.0), (1.0, 0.0)]);
        let element = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();
        assert_eq!(element.nodes(), [keys[1], keys[0], keys[2]]);

        let [p1, p2, p3] = element.positions(&nodes).unwrap();
        assert!(cross_z(&p1, &p2, &p3) > 0.0);
    }

    #[test]
    fn winding_does_not_change_area() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (4.0, 0.0), (1.0, 3.0)]);
        let mut ccw = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();
        let mut cw = TriElement::new(&nodes, [keys[0], keys[2], keys[1]]).unwrap();
        ccw.tick(&nodes).unwrap();
        cw.tick(&nodes).unwrap();

        assert_relative_eq!(ccw.area(), 6.0);
        assert_relative_eq!(cw.area(), ccw.area());
    }

    #[test]
    fn repeated_nodes_are_rejected() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (1.0, 0.0)]);
        assert!(matches!(
            TriElement::new(&nodes, [keys[0], keys[1], keys[0]]),
            Err(FeldsparError::InvalidSelection(_))
        ));
    }

    #[test]
    fn stale_handles_are_rejected() {
        let (mut nodes, keys) = arena(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        nodes.remove(keys[2]);
        assert!(matches!(
            TriElement::new(&nodes, [keys[0], keys[1], keys[2]]),
            Err(FeldsparError::StaleNode)
        ));
    }

    #[test]
    fn right_triangle_stiffness() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)]);
        let mut element = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();
        element.tick(&nodes).unwrap();

        let expected: SMatrix<f64, 6, 6> = matrix![
            0.75, 0.25, -0.5, -0.25, -0.25, 0.0;
            0.25, 0.75, 0.0, -0.25, -0.25, -0.5;
            -0.5, 0.0, 0.5, 0.0, 0.0, 0.0;
            -0.25, -0.25, 0.0, 0.25, 0.25, 0.0;
            -0.25, -0.25, 0.0, 0.25, 0.25, 0.0;
            0.0, -0.5, 0.0, 0.0, 0.0, 0.5;
        ];
        assert_relative_eq!(*element.stiffness(), expected, epsilon = 1e-12);
    }

    #[test]
    fn stiffness_is_symmetric_and_positive_semidefinite() {
        let h = 3f64.sqrt() / 2.0;
        for points in [
            [(0.0, 0.0), (1.0, 0.0), (0.5, h)],
            [(0.0, 0.0), (2.0, 0.0), (0.0, 3.0)],
            [(10.0, 5.0), (12.0, 9.0), (7.0, 8.0)],
        ] {
            let (nodes, keys) = arena(&points);
            let mut element = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();
            element.tick(&nodes).unwrap();

            let k = element.stiffness();
            assert_relative_eq!(*k, k.transpose(), epsilon = 1e-12);

            let eigenvalues = k.symmetric_eigenvalues();
            for value in eigenvalues.iter() {
                assert!(*value > -1e-10, "negative eigenvalue {value}");
            }
        }
    }

    #[test]
    fn rigid_translation_is_stress_free() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (3.0, 1.0), (1.0, 2.0)]);
        let mut element = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();
        element.tick(&nodes).unwrap();

        let translation = SMatrix::<f64, 6, 1>::from([1.0, -2.0, 1.0, -2.0, 1.0, -2.0]);
        let forces = element.stiffness() * translation;
        assert_abs_diff_eq!(forces, SMatrix::<f64, 6, 1>::zeros(), epsilon = 1e-12);
    }

    #[test]
    fn collinear_nodes_are_degenerate() {
        let (nodes, keys) = arena(&[(0.0, 0.0), (1.0, 1.0), (2.0, 2.0)]);
        let mut element = TriElement::new(&nodes, [keys[0], keys[1], keys[2]]).unwrap();

        assert!(matches!(
            element.tick(&nodes),
            Err(FeldsparError::DegenerateElement { .. })
        ));
        assert!(element.stiffness().iter().all(|x| x.is_finite()));
        assert!(element.strain_displacement().iter().all(|x| x.is_finite()));
    }
}
