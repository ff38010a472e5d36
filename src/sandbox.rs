use nalgebra::Vector2;

use crate::{
    datatypes::{Constraint, NodeKey},
    error::FeldsparError,
    graph::Graph,
    leb::LebTree,
    mass_spring::{self, MassSpringParams},
    solver::{FemSolver, TickReport},
};

/// Pick distance around a node, in world units
pub const SELECTION_RADIUS: f64 = 25.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SimulationMode {
    #[default]
    Fem,
    MassSpring,
}

/// What a call to `Sandbox::tick` did
#[derive(Debug)]
pub enum TickStatus {
    /// Nothing to simulate
    Idle,
    Solved(TickReport),
    Integrated,
    /// The tick was skipped and the graph is unchanged
    Aborted(FeldsparError),
}

impl TickStatus {
    pub fn is_aborted(&self) -> bool {
        matches!(self, TickStatus::Aborted(_))
    }
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    node: NodeKey,
    origin: Vector2<f64>,
    force_mode: bool,
}

/// Owns a graph and the simulations that run over it, plus the editing
/// state driven by user input
#[derive(Debug, Default)]
pub struct Sandbox {
    graph: Graph,
    solver: FemSolver,
    mode: SimulationMode,
    params: MassSpringParams,
    leb: Option<LebTree>,
    /// Set only for a single, non-additive selection
    primary: Option<NodeKey>,
    selected: Vec<NodeKey>,
    drag: Option<Drag>,
}

impl Sandbox {
    pub fn new(mode: SimulationMode) -> Sandbox {
        Sandbox {
            mode,
            ..Sandbox::default()
        }
    }

    pub fn with_solver(mut self, solver: FemSolver) -> Sandbox {
        self.solver = solver;
        self
    }

    pub fn with_params(mut self, params: MassSpringParams) -> Sandbox {
        self.params = params;
        self
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn graph_mut(&mut self) -> &mut Graph {
        &mut self.graph
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: SimulationMode) {
        self.mode = mode;
    }

    pub fn params(&self) -> &MassSpringParams {
        &self.params
    }

    pub fn solver_mut(&mut self) -> &mut FemSolver {
        &mut self.solver
    }

    pub fn leb(&self) -> Option<&LebTree> {
        self.leb.as_ref()
    }

    /// Builds an LEB root in the graph, replacing no existing tree
    pub fn generate_leb(&mut self, root_size: f64) -> Result<&mut LebTree, FeldsparError> {
        if self.leb.is_some() {
            return Err(FeldsparError::Leb("sandbox already has an LEB tree".to_owned()));
        }
        let mut tree = LebTree::new(root_size);
        tree.generate(&mut self.graph)?;
        Ok(self.leb.insert(tree))
    }

    /// Subdivides the LEB cell at the end of an `L`/`R` path
    pub fn subdivide_leb(&mut self, path: &str) -> Result<(), FeldsparError> {
        let tree = self
            .leb
            .as_mut()
            .ok_or_else(|| FeldsparError::Leb("sandbox has no LEB tree".to_owned()))?;
        let id = tree.find_by_path(path)?;
        tree.subdivide(id, &mut self.graph)?;
        Ok(())
    }

    /// Advances the active simulation by one step
    ///
    /// Failures are logged and reported through the status; the graph is
    /// left as it was.
    pub fn tick(&mut self, dt: f64) -> TickStatus {
        if self.graph.is_empty() {
            return TickStatus::Idle;
        }

        match self.mode {
            SimulationMode::Fem => match self.solver.tick(&mut self.graph) {
                Ok(Some(report)) => TickStatus::Solved(report),
                Ok(None) => TickStatus::Idle,
                Err(err) => {
                    if err.is_solver_failure() {
                        tracing::warn!("FEM tick aborted: {err}");
                    } else {
                        tracing::error!("FEM tick failed: {err}");
                    }
                    TickStatus::Aborted(err)
                }
            },
            SimulationMode::MassSpring => {
                mass_spring::step(&mut self.graph, dt, &self.params);
                TickStatus::Integrated
            }
        }
    }

    pub fn selected(&self) -> &[NodeKey] {
        &self.selected
    }

    pub fn primary_selection(&self) -> Option<NodeKey> {
        self.primary
    }

    pub fn clear_selection(&mut self) {
        self.primary = None;
        self.selected.clear();
    }

    fn select_node(&mut self, node: NodeKey, additive: bool) {
        if additive {
            self.primary = None;
            self.selected.push(node);
        } else {
            self.primary = Some(node);
            self.selected = vec![node];
        }
    }

    /// Selects the node near `position`, or clears the selection if there is none
    pub fn select(&mut self, position: Vector2<f64>, additive: bool) -> Option<NodeKey> {
        match self.graph.node_near(&position, SELECTION_RADIUS) {
            Some(node) => {
                self.select_node(node, additive);
                Some(node)
            }
            None => {
                self.clear_selection();
                None
            }
        }
    }

    /// Finds or creates a node at `position`, connects it to the selected
    /// node, and selects it
    pub fn place_node(&mut self, position: Vector2<f64>) -> Result<NodeKey, FeldsparError> {
        let node = self.graph.create_or_find_node_at(position, SELECTION_RADIUS);
        if let Some(previous) = self.primary {
            if previous != node && self.graph.edge_between(previous, node).is_none() {
                self.graph.add_edge(previous, node)?;
            }
        }
        self.select_node(node, false);
        Ok(node)
    }

    /// Builds a triangle element from a selection of exactly three nodes
    pub fn make_element_from_selection(&mut self) -> Result<usize, FeldsparError> {
        let &[a, b, c] = self.selected.as_slice() else {
            return Err(FeldsparError::InvalidSelection(format!(
                "an element needs 3 selected nodes, {} selected",
                self.selected.len()
            )));
        };
        self.graph.add_element(a, b, c)
    }

    /// Removes every selected node from the graph
    pub fn remove_selected(&mut self) -> Result<(), FeldsparError> {
        for node in std::mem::take(&mut self.selected) {
            if self.graph.node(node).is_none() {
                continue;
            }
            if self.drag.is_some_and(|drag| drag.node == node) {
                self.drag = None;
            }
            self.graph.remove_node(node)?;
        }
        self.primary = None;
        Ok(())
    }

    pub fn cycle_constraint_near(&mut self, position: Vector2<f64>) -> Option<Constraint> {
        let node = self.graph.node_near(&position, SELECTION_RADIUS)?;
        self.graph.cycle_constraint(node).ok()
    }

    /// Grabs the node under `position`
    ///
    /// A held node is not integrated. In force mode it stays put and the
    /// drag distance becomes its nodal force on release.
    pub fn begin_drag(&mut self, position: Vector2<f64>, force_mode: bool) -> Option<NodeKey> {
        self.select(position, false)?;
        let node = self.primary?;
        let origin = self.graph.position(node).ok()?;
        if let Some(held) = self.graph.node_mut(node) {
            held.should_tick = false;
        }
        self.drag = Some(Drag {
            node,
            origin,
            force_mode,
        });
        Some(node)
    }

    pub fn drag_to(&mut self, position: Vector2<f64>) -> Result<(), FeldsparError> {
        match self.drag {
            Some(drag) if !drag.force_mode => self.graph.set_position(drag.node, position),
            _ => Ok(()),
        }
    }

    pub fn end_drag(&mut self, position: Vector2<f64>) -> Result<(), FeldsparError> {
        let Some(drag) = self.drag.take() else {
            return Ok(());
        };
        if drag.force_mode {
            self.graph
                .set_force_from_drag(drag.node, position - drag.origin)?;
        }
        if let Some(held) = self.graph.node_mut(drag.node) {
            held.should_tick = true;
        }
        Ok(())
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }
}
