//! Explicit Euler integration of a mass-spring network.
//!
//! Screen coordinates: `y` grows downward, so gravity is positive `y` and the
//! floor is the largest allowed `y`.

use nalgebra::Vector2;

use crate::{datatypes::DOF, graph::Graph};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MassSpringParams {
    pub gravity: f64,
    /// Fraction of velocity opposed as drag each step
    pub drag: f64,
    /// Fraction of vertical speed kept after hitting the floor
    pub bounciness: f64,
    pub floor_y: f64,
}

impl Default for MassSpringParams {
    fn default() -> Self {
        MassSpringParams {
            gravity: 9.8,
            drag: 0.8,
            bounciness: 0.4,
            floor_y: 0.0,
        }
    }
}

/// Advances every node and then every edge by one step of `dt`
///
/// Node integration consumes the force accumulated during the previous step
/// and seeds the next one with drag and gravity. Edges then add their spring
/// and damping forces on top.
pub fn step(graph: &mut Graph, dt: f64, params: &MassSpringParams) {
    let (nodes, edges) = graph.nodes_and_edges_mut();

    for node in nodes.values_mut().filter(|node| node.should_tick) {
        let acceleration = node.net_force / node.mass;
        node.velocity += acceleration * dt;
        node.position += node.velocity * dt;

        node.net_force = Vector2::zeros();

        let drag = -node.velocity * params.drag;
        node.apply_force(drag);

        if node.position.y > params.floor_y {
            node.position.y = params.floor_y;
            node.velocity.y *= -params.bounciness;
            node.net_force.y = 0.0;
        }

        let gravity = Vector2::new(0.0, params.gravity * node.mass);
        node.apply_force(gravity);
    }

    for edge in edges.values_mut() {
        let [k1, k2] = edge.nodes;
        let (Some(n1), Some(n2)) = (nodes.get(k1), nodes.get(k2)) else {
            continue;
        };

        let between = n2.position - n1.position;
        let length = between.norm();
        if length == 0.0 {
            edge.net_force = 0.0;
            continue;
        }
        let direction = between / length;

        let spring = (length - edge.rest_length) * edge.rigidity;
        let damping = direction.dot(&(n2.velocity - n1.velocity)) * edge.damping;
        edge.net_force = spring + damping;

        let force = direction * edge.net_force;
        if let Some(n1) = nodes.get_mut(k1) {
            n1.apply_force(force);
        }
        if let Some(n2) = nodes.get_mut(k2) {
            n2.apply_force(-force);
        }
    }
}

/// Kinetic energy of the network, `sum(m v^2 / 2)`
pub fn kinetic_energy(graph: &Graph) -> f64 {
    graph
        .nodes()
        .values()
        .map(|node| 0.5 * node.mass * node.velocity.norm_squared())
        .sum()
}

/// Writes the accumulated net force of each node into a `2N` vector in DOF order
pub fn net_forces(graph: &Graph) -> Vec<f64> {
    let mut forces = vec![0.0; graph.dof_count()];
    for key in graph.keys() {
        if let Some(node) = graph.node(key) {
            forces[DOF * node.index] = node.net_force.x;
            forces[DOF * node.index + 1] = node.net_force.y;
        }
    }
    forces
}
