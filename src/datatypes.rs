use nalgebra::Vector2;
use slotmap::new_key_type;

/// Degrees of freedom carried by every node
pub const DOF: usize = 2;

pub const DEFAULT_NODE_MASS: f64 = 10.0;
pub const DEFAULT_EDGE_RIGIDITY: f64 = 5000.0;
pub const DEFAULT_EDGE_DAMPING: f64 = 10.0;

new_key_type! {
    /// Generational handle to a node in a `Graph`
    pub struct NodeKey;

    /// Generational handle to an edge in a `Graph`
    pub struct EdgeKey;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    /// Resolves a global DOF index into its owning node index and axis
    pub fn of_dof(dof: usize) -> (usize, Axis) {
        let axis = if dof % DOF == 0 { Axis::X } else { Axis::Y };
        (dof / DOF, axis)
    }

    /// The global DOF index of this axis on the node at `node_index`
    pub fn dof(self, node_index: usize) -> usize {
        match self {
            Axis::X => DOF * node_index,
            Axis::Y => DOF * node_index + 1,
        }
    }
}

/// Boundary condition flags for a node. A constrained axis is pinned to
/// zero displacement during a FEM tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Constraint {
    pub x: bool,
    pub y: bool,
}

impl Constraint {
    pub const FREE: Constraint = Constraint { x: false, y: false };
    pub const FIXED: Constraint = Constraint { x: true, y: true };

    pub fn new(x: bool, y: bool) -> Constraint {
        Constraint { x, y }
    }

    pub fn is_constrained(&self, axis: Axis) -> bool {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }

    /// Number of constrained axes, 0 to 2
    pub fn count(&self) -> usize {
        self.x as usize + self.y as usize
    }

    /// Next state in the editing cycle: free, fixed, x released, y released, free
    pub fn cycled(&self) -> Constraint {
        match (self.x, self.y) {
            (false, false) => Constraint::FIXED,
            (true, true) => Constraint::new(false, true),
            (false, true) => Constraint::new(true, false),
            (true, false) => Constraint::FREE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Node {
    pub position: Vector2<f64>,
    /// Dense position of the node in its graph. Owns DOFs `2*index` and `2*index + 1`
    pub index: usize,
    pub constraint: Constraint,
    pub mass: f64,
    pub velocity: Vector2<f64>,
    pub net_force: Vector2<f64>,
    /// Cleared while the node is held by the user
    pub should_tick: bool,
}

impl Node {
    pub fn new(position: Vector2<f64>, index: usize) -> Node {
        Node {
            position,
            index,
            constraint: Constraint::FREE,
            mass: DEFAULT_NODE_MASS,
            velocity: Vector2::zeros(),
            net_force: Vector2::zeros(),
            should_tick: true,
        }
    }

    /// Accumulates a force for the next integration step
    pub fn apply_force(&mut self, force: Vector2<f64>) {
        if self.should_tick {
            self.net_force += force;
        }
    }
}

#[derive(Debug, Clone)]
pub struct Edge {
    pub nodes: [NodeKey; 2],
    pub rest_length: f64,
    pub rigidity: f64,
    pub damping: f64,
    /// Signed magnitude of the force the edge exerted on its last tick
    pub net_force: f64,
}

impl Edge {
    pub fn new(n1: NodeKey, n2: NodeKey, rest_length: f64) -> Edge {
        Edge {
            nodes: [n1, n2],
            rest_length,
            rigidity: DEFAULT_EDGE_RIGIDITY,
            damping: DEFAULT_EDGE_DAMPING,
            net_force: 0.0,
        }
    }

    pub fn touches(&self, node: NodeKey) -> bool {
        self.nodes.contains(&node)
    }

    /// The endpoint opposite `node`, if `node` is an endpoint at all
    pub fn other(&self, node: NodeKey) -> Option<NodeKey> {
        if self.nodes[0] == node {
            Some(self.nodes[1])
        } else if self.nodes[1] == node {
            Some(self.nodes[0])
        } else {
            None
        }
    }
}
