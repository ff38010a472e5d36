use nalgebra::{DMatrix, DVector};
use slotmap::SlotMap;

use crate::{
    constraint::constrain_augmented,
    datatypes::{Axis, Node, NodeKey, DOF},
    element::TriElement,
    error::FeldsparError,
    graph::Graph,
    linalg::{augment_matrix, back_substitute, forward_eliminate},
    post_processor::{format_constrained, format_matrix, format_vector},
};

/// The stages of a FEM tick, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    TickElements,
    AssembleK,
    Augment,
    Constrain,
    ForwardEliminate,
    BackSubstitute,
    ScatterDisplacements,
}

/// The intermediate value a stage produced
#[derive(Debug, Clone, Copy)]
pub enum Snapshot<'a> {
    Empty,
    /// A matrix indexed by global DOF
    Global(&'a DMatrix<f64>),
    /// A reduced matrix, rows and columns labelled through `mapping`
    Constrained {
        matrix: &'a DMatrix<f64>,
        mapping: &'a [usize],
    },
    Solution {
        displacements: &'a DVector<f64>,
        mapping: &'a [usize],
    },
}

/// Receives each stage's result as a tick runs
pub trait StageObserver {
    fn observe(&mut self, stage: Stage, snapshot: Snapshot<'_>);
}

/// Logs every stage at debug level, with a text dump of its matrix
#[derive(Debug, Default)]
pub struct TracingObserver;

impl StageObserver for TracingObserver {
    fn observe(&mut self, stage: Stage, snapshot: Snapshot<'_>) {
        if !tracing::enabled!(tracing::Level::DEBUG) {
            return;
        }
        match snapshot {
            Snapshot::Empty => tracing::debug!("{stage:?} done"),
            Snapshot::Global(m) => tracing::debug!("{stage:?}\n{}", format_matrix(m)),
            Snapshot::Constrained { matrix, mapping } => {
                tracing::debug!("{stage:?}\n{}", format_constrained(matrix, mapping))
            }
            Snapshot::Solution {
                displacements,
                mapping,
            } => tracing::debug!("{stage:?}\n{}", format_vector(displacements, mapping)),
        }
    }
}

/// Result of a successful tick
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Global DOF of each entry in `displacements`
    pub mapping: Vec<usize>,
    pub displacements: DVector<f64>,
}

impl TickReport {
    /// Displacement applied to a global DOF, zero if it was constrained
    pub fn displacement_of(&self, dof: usize) -> f64 {
        self.mapping
            .iter()
            .position(|&d| d == dof)
            .map_or(0.0, |i| self.displacements[i])
    }
}

/// Compiles element stiffness matrices into a global stiffness matrix
///
/// # Arguments
/// * `nodes` - The node arena the elements point into
/// * `elements` - Elements whose stiffness is current
/// * `node_count` - Number of nodes in the dense order
///
/// # Returns
/// A `2N x 2N` matrix
pub fn assemble_global_stiffness(
    nodes: &SlotMap<NodeKey, Node>,
    elements: &[TriElement],
    node_count: usize,
) -> Result<DMatrix<f64>, FeldsparError> {
    let dofs = DOF * node_count;
    let mut total_stiffness_matrix: DMatrix<f64> = DMatrix::zeros(dofs, dofs);

    for element in elements {
        let global = element.global_dofs(nodes)?;
        if let Some(&out_of_range) = global.iter().find(|&&dof| dof >= dofs) {
            return Err(FeldsparError::InvalidDimensions(format!(
                "element DOF {out_of_range} outside a {dofs}x{dofs} system"
            )));
        }

        let stiffness_mat = element.stiffness();
        for (local_row, &global_row) in global.iter().enumerate() {
            for (local_col, &global_col) in global.iter().enumerate() {
                total_stiffness_matrix[(global_row, global_col)] +=
                    stiffness_mat[(local_row, local_col)];
            }
        }
    }

    Ok(total_stiffness_matrix)
}

/// Runs the linear FEM pipeline over a graph one tick at a time
#[derive(Default)]
pub struct FemSolver {
    observers: Vec<Box<dyn StageObserver>>,
}

impl std::fmt::Debug for FemSolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FemSolver")
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl FemSolver {
    pub fn new() -> FemSolver {
        FemSolver::default()
    }

    /// A solver that dumps every stage through `tracing`
    pub fn with_tracing() -> FemSolver {
        let mut solver = FemSolver::new();
        solver.add_observer(Box::new(TracingObserver));
        solver
    }

    pub fn add_observer(&mut self, observer: Box<dyn StageObserver>) {
        self.observers.push(observer);
    }

    fn notify(&mut self, stage: Stage, snapshot: Snapshot<'_>) {
        for observer in self.observers.iter_mut() {
            observer.observe(stage, snapshot);
        }
    }

    /// Solves for nodal displacements and moves the nodes by them
    ///
    /// Every failure leaves node positions as they were.
    ///
    /// # Arguments
    /// * `graph` - The graph to solve. Only node positions are modified
    ///
    /// # Returns
    /// `None` when there are no elements to solve
    pub fn tick(&mut self, graph: &mut Graph) -> Result<Option<TickReport>, FeldsparError> {
        if graph.elements().is_empty() {
            tracing::debug!("no elements, skipping FEM tick");
            return Ok(None);
        }

        {
            let (nodes, elements) = graph.nodes_and_elements_mut();
            for element in elements.iter_mut() {
                element.tick(nodes)?;
            }
        }
        self.notify(Stage::TickElements, Snapshot::Empty);

        let k = assemble_global_stiffness(graph.nodes(), graph.elements(), graph.node_count())?;
        self.notify(Stage::AssembleK, Snapshot::Global(&k));

        let f = DVector::from_column_slice(graph.forces());
        let aug = augment_matrix(&f, &k)?;
        self.notify(Stage::Augment, Snapshot::Global(&aug));

        let constrained = constrain_augmented(&aug, &graph.constraints())?;
        self.notify(
            Stage::Constrain,
            Snapshot::Constrained {
                matrix: &constrained.matrix,
                mapping: &constrained.mapping,
            },
        );

        let mut system = constrained.matrix;
        let mapping = constrained.mapping;

        forward_eliminate(&mut system)?;
        self.notify(
            Stage::ForwardEliminate,
            Snapshot::Constrained {
                matrix: &system,
                mapping: &mapping,
            },
        );

        let mut displacements = DVector::zeros(mapping.len());
        back_substitute(&system, &mut displacements)?;
        self.notify(
            Stage::BackSubstitute,
            Snapshot::Solution {
                displacements: &displacements,
                mapping: &mapping,
            },
        );

        let mut moves = Vec::with_capacity(mapping.len());
        for (&dof, &d) in mapping.iter().zip(displacements.iter()) {
            let (index, axis) = Axis::of_dof(dof);
            let key = graph.node_at(index).ok_or_else(|| {
                FeldsparError::InvalidDimensions(format!("DOF {dof} has no node"))
            })?;
            moves.push((key, axis, d));
        }
        for (key, axis, d) in moves {
            let node = graph.node_mut(key).ok_or(FeldsparError::StaleNode)?;
            match axis {
                Axis::X => node.position.x += d,
                Axis::Y => node.position.y += d,
            }
        }
        self.notify(Stage::ScatterDisplacements, Snapshot::Empty);

        Ok(Some(TickReport {
            mapping,
            displacements,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::Constraint;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;
    use std::{cell::RefCell, rc::Rc};

    fn right_triangle() -> (Graph, [NodeKey; 3]) {
        let mut graph = Graph::new();
        let a = graph.add_node(Vector2::new(0.0, 0.0));
        let b = graph.add_node(Vector2::new(1.0, 0.0));
        let c = graph.add_node(Vector2::new(0.0, 1.0));
        graph.add_element(a, b, c).unwrap();
        (graph, [a, b, c])
    }

    struct Recorder(Rc<RefCell<Vec<Stage>>>);

    impl StageObserver for Recorder {
        fn observe(&mut self, stage: Stage, _snapshot: Snapshot<'_>) {
            self.0.borrow_mut().push(stage);
        }
    }

    #[test]
    fn assembly_sums_shared_dofs() {
        let mut graph = Graph::new();
        let a = graph.add_node(Vector2::new(0.0, 0.0));
        let b = graph.add_node(Vector2::new(1.0, 0.0));
        let c = graph.add_node(Vector2::new(0.0, 1.0));
        let d = graph.add_node(Vector2::new(1.0, 1.0));
        graph.add_element(a, b, c).unwrap();
        graph.add_element(b, d, c).unwrap();
        {
            let (nodes, elements) = graph.nodes_and_elements_mut();
            for element in elements.iter_mut() {
                element.tick(nodes).unwrap();
            }
        }

        let k = assemble_global_stiffness(graph.nodes(), graph.elements(), 4).unwrap();
        assert_eq!(k.shape(), (8, 8));
        assert_relative_eq!(k.clone(), k.transpose(), epsilon = 1e-12);

        let first = graph.elements()[0].stiffness();
        let second = graph.elements()[1].stiffness();
        let b_in_first = graph.elements()[0].global_dofs(graph.nodes()).unwrap();
        let b_in_second = graph.elements()[1].global_dofs(graph.nodes()).unwrap();
        let i = b_in_first.iter().position(|&dof| dof == 2).unwrap();
        let j = b_in_second.iter().position(|&dof| dof == 2).unwrap();
        assert_relative_eq!(k[(2, 2)], first[(i, i)] + second[(j, j)], epsilon = 1e-12);

        // node a and node d share no element
        assert_eq!(k[(0, 6)], 0.0);
    }

    #[test]
    fn single_free_node_moves_with_its_force() {
        let (mut graph, [a, b, c]) = right_triangle();
        graph.set_constraint(a, Constraint::FIXED).unwrap();
        graph.set_constraint(b, Constraint::FIXED).unwrap();
        graph.set_nodal_force(c, Vector2::new(1.0, -1.0)).unwrap();

        let report = FemSolver::new().tick(&mut graph).unwrap().unwrap();
        assert_eq!(report.mapping, vec![4, 5]);
        assert_relative_eq!(report.displacement_of(4), 4.0, epsilon = 1e-9);
        assert_relative_eq!(report.displacement_of(5), -2.0, epsilon = 1e-9);
        assert_eq!(report.displacement_of(0), 0.0);

        assert_relative_eq!(graph.position(c).unwrap(), Vector2::new(4.0, -1.0), epsilon = 1e-9);
        assert_eq!(graph.position(a).unwrap(), Vector2::new(0.0, 0.0));
    }

    #[test]
    fn no_elements_is_a_no_op() {
        let mut graph = Graph::new();
        graph.add_node(Vector2::new(1.0, 1.0));
        assert!(FemSolver::new().tick(&mut graph).unwrap().is_none());
    }

    #[test]
    fn observers_see_every_stage_in_order() {
        let (mut graph, [a, b, _]) = right_triangle();
        graph.set_constraint(a, Constraint::FIXED).unwrap();
        graph.set_constraint(b, Constraint::FIXED).unwrap();

        let stages = Rc::new(RefCell::new(Vec::new()));
        let mut solver = FemSolver::with_tracing();
        solver.add_observer(Box::new(Recorder(stages.clone())));
        solver.tick(&mut graph).unwrap();

        assert_eq!(
            *stages.borrow(),
            vec![
                Stage::TickElements,
                Stage::AssembleK,
                Stage::Augment,
                Stage::Constrain,
                Stage::ForwardEliminate,
                Stage::BackSubstitute,
                Stage::ScatterDisplacements,
            ]
        );
    }

    #[test]
    fn failed_elimination_stops_before_scatter() {
        let (mut graph, keys) = right_triangle();
        let before: Vec<_> = keys.iter().map(|&k| graph.position(k).unwrap()).collect();

        let stages = Rc::new(RefCell::new(Vec::new()));
        let mut solver = FemSolver::new();
        solver.add_observer(Box::new(Recorder(stages.clone())));
        let err = solver.tick(&mut graph).unwrap_err();

        assert!(matches!(
            err,
            FeldsparError::ZeroPivot { .. } | FeldsparError::UnderdeterminedSystem { .. }
        ));
        assert_eq!(stages.borrow().last(), Some(&Stage::Constrain));
        let after: Vec<_> = keys.iter().map(|&k| graph.position(k).unwrap()).collect();
        assert_eq!(before, after);
    }
}
