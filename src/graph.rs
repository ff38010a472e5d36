//! The node and edge store shared by both simulations.
//!
//! Nodes live in a generational arena, so handles held by elements, edges
//! and LEB cells go stale instead of silently pointing at a different node.
//! Alongside the arena, `order` gives every node a dense index in `[0, N)`
//! which is what the FEM solver numbers its DOFs by.

use nalgebra::Vector2;
use slotmap::SlotMap;

use crate::{
    datatypes::{Constraint, Edge, EdgeKey, Node, NodeKey, DOF},
    element::TriElement,
    error::FeldsparError,
};

/// Drags shorter than this clear a node's force instead of setting it
pub const MIN_FORCE_DRAG: f64 = 10.0;

#[derive(Debug, Clone, Default)]
pub struct Graph {
    nodes: SlotMap<NodeKey, Node>,
    order: Vec<NodeKey>,
    edges: SlotMap<EdgeKey, Edge>,
    elements: Vec<TriElement>,
    /// External nodal forces, `2N` long, in DOF order
    forces: Vec<f64>,
}

impl Graph {
    pub fn new() -> Graph {
        Graph::default()
    }

    pub fn node_count(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn dof_count(&self) -> usize {
        DOF * self.order.len()
    }

    pub fn nodes(&self) -> &SlotMap<NodeKey, Node> {
        &self.nodes
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    /// The handle of the node at a dense index
    pub fn node_at(&self, index: usize) -> Option<NodeKey> {
        self.order.get(index).copied()
    }

    /// Node handles in dense index order
    pub fn keys(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.order.iter().copied()
    }

    pub fn position(&self, key: NodeKey) -> Result<Vector2<f64>, FeldsparError> {
        Ok(self.nodes.get(key).ok_or(FeldsparError::StaleNode)?.position)
    }

    pub fn set_position(&mut self, key: NodeKey, position: Vector2<f64>) -> Result<(), FeldsparError> {
        self.nodes.get_mut(key).ok_or(FeldsparError::StaleNode)?.position = position;
        Ok(())
    }

    /// Adds a node at the end of the dense order
    ///
    /// The force vector grows by two zeroed entries.
    pub fn add_node(&mut self, position: Vector2<f64>) -> NodeKey {
        let index = self.order.len();
        let key = self.nodes.insert(Node::new(position, index));
        self.order.push(key);
        self.forces.extend_from_slice(&[0.0; DOF]);
        key
    }

    /// Removes a node along with every edge and element touching it
    ///
    /// The last node in the dense order takes over the removed node's index
    /// and force entries, so indices stay dense.
    pub fn remove_node(&mut self, key: NodeKey) -> Result<Node, FeldsparError> {
        let node = self.nodes.remove(key).ok_or(FeldsparError::StaleNode)?;

        self.edges.retain(|_, edge| !edge.touches(key));
        self.elements.retain(|element| !element.touches(key));

        let index = node.index;
        let last = self.order.len() - 1;
        self.order.swap_remove(index);
        for axis in 0..DOF {
            self.forces.swap(DOF * index + axis, DOF * last + axis);
        }
        self.forces.truncate(DOF * last);

        if let Some(&moved) = self.order.get(index) {
            if let Some(moved) = self.nodes.get_mut(moved) {
                moved.index = index;
            }
        }

        Ok(node)
    }

    /// Returns the first node, in dense order, within `max_distance` of `position`
    pub fn node_near(&self, position: &Vector2<f64>, max_distance: f64) -> Option<NodeKey> {
        self.order
            .iter()
            .copied()
            .find(|&key| (self.nodes[key].position - position).norm() <= max_distance)
    }

    pub fn create_or_find_node_at(&mut self, position: Vector2<f64>, max_distance: f64) -> NodeKey {
        match self.node_near(&position, max_distance) {
            Some(key) => key,
            None => self.add_node(position),
        }
    }

    pub fn edges(&self) -> &SlotMap<EdgeKey, Edge> {
        &self.edges
    }

    pub fn edge(&self, key: EdgeKey) -> Option<&Edge> {
        self.edges.get(key)
    }

    pub fn edge_mut(&mut self, key: EdgeKey) -> Option<&mut Edge> {
        self.edges.get_mut(key)
    }

    /// Connects two nodes. The rest length is their current distance.
    pub fn add_edge(&mut self, a: NodeKey, b: NodeKey) -> Result<EdgeKey, FeldsparError> {
        if a == b {
            return Err(FeldsparError::InvalidSelection(
                "an edge needs two different nodes".to_owned(),
            ));
        }
        let rest_length = (self.position(b)? - self.position(a)?).norm();
        Ok(self.edges.insert(Edge::new(a, b, rest_length)))
    }

    pub fn remove_edge(&mut self, key: EdgeKey) -> Option<Edge> {
        self.edges.remove(key)
    }

    pub fn edge_between(&self, a: NodeKey, b: NodeKey) -> Option<EdgeKey> {
        self.edges
            .iter()
            .find(|(_, edge)| edge.touches(a) && edge.other(a) == Some(b))
            .map(|(key, _)| key)
    }

    pub fn incident_edges(&self, node: NodeKey) -> Vec<EdgeKey> {
        self.edges
            .iter()
            .filter(|(_, edge)| edge.touches(node))
            .map(|(key, _)| key)
            .collect()
    }

    pub fn elements(&self) -> &[TriElement] {
        &self.elements
    }

    /// Builds a triangle element over three existing nodes
    ///
    /// # Returns
    /// The position of the new element in `elements()`
    pub fn add_element(&mut self, a: NodeKey, b: NodeKey, c: NodeKey) -> Result<usize, FeldsparError> {
        let element = TriElement::new(&self.nodes, [a, b, c])?;
        self.elements.push(element);
        Ok(self.elements.len() - 1)
    }

    /// Splits the borrow so elements can be ticked against the node arena
    pub fn nodes_and_elements_mut(&mut self) -> (&SlotMap<NodeKey, Node>, &mut [TriElement]) {
        (&self.nodes, &mut self.elements)
    }

    /// Splits the borrow so edges can push forces onto nodes
    pub fn nodes_and_edges_mut(&mut self) -> (&mut SlotMap<NodeKey, Node>, &mut SlotMap<EdgeKey, Edge>) {
        (&mut self.nodes, &mut self.edges)
    }

    pub fn forces(&self) -> &[f64] {
        &self.forces
    }

    pub fn nodal_force(&self, key: NodeKey) -> Result<Vector2<f64>, FeldsparError> {
        let index = self.nodes.get(key).ok_or(FeldsparError::StaleNode)?.index;
        Ok(Vector2::new(
            self.forces[DOF * index],
            self.forces[DOF * index + 1],
        ))
    }

    pub fn set_nodal_force(&mut self, key: NodeKey, force: Vector2<f64>) -> Result<(), FeldsparError> {
        let index = self.nodes.get(key).ok_or(FeldsparError::StaleNode)?.index;
        self.forces[DOF * index] = force.x;
        self.forces[DOF * index + 1] = force.y;
        Ok(())
    }

    /// Turns a drag gesture into a nodal force
    ///
    /// Short drags clear the force.
    pub fn set_force_from_drag(&mut self, key: NodeKey, drag: Vector2<f64>) -> Result<(), FeldsparError> {
        if drag.norm() > MIN_FORCE_DRAG {
            self.set_nodal_force(key, drag)
        } else {
            self.set_nodal_force(key, Vector2::zeros())
        }
    }

    pub fn clear_forces(&mut self) {
        self.forces.iter_mut().for_each(|f| *f = 0.0);
    }

    pub fn set_constraint(&mut self, key: NodeKey, constraint: Constraint) -> Result<(), FeldsparError> {
        self.nodes.get_mut(key).ok_or(FeldsparError::StaleNode)?.constraint = constraint;
        Ok(())
    }

    pub fn cycle_constraint(&mut self, key: NodeKey) -> Result<Constraint, FeldsparError> {
        let node = self.nodes.get_mut(key).ok_or(FeldsparError::StaleNode)?;
        node.constraint = node.constraint.cycled();
        Ok(node.constraint)
    }

    /// Constraint flags in dense order
    pub fn constraints(&self) -> Vec<Constraint> {
        self.order.iter().map(|&key| self.nodes[key].constraint).collect()
    }
}
