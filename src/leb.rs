//! Longest edge bisection over right isosceles triangles.
//!
//! Every cell carries seven anchor points. Looking from the tip (anchor 0)
//! towards the hypotenuse:
//!
//! ```text
//!            0
//!          /   \
//!         1  3  2
//!        /       \
//!       6 ---5--- 4
//! ```
//!
//! Subdividing a cell splits it along 0-5 into a left and a right child whose
//! tip is anchor 5. Children reuse the parent's graph nodes wherever their
//! anchors coincide.

use std::f64::consts::FRAC_PI_4;

use nalgebra::{Rotation2, Vector2};

use crate::{datatypes::NodeKey, error::FeldsparError, graph::Graph};

pub const DEFAULT_ROOT_SIZE: f64 = 550.0;
pub const ROOT_HEADING: u8 = 3;

const ANCHORS: usize = 7;
const CENTRE: usize = 3;

const INTERNAL_EDGES: [(usize, usize); 6] = [(3, 1), (3, 2), (3, 5), (0, 3), (1, 5), (2, 5)];
const BORDER_EDGES: [(usize, usize); 6] = [(0, 1), (0, 2), (6, 1), (6, 5), (4, 2), (4, 5)];
const HYPOTENUSE_EDGES: [(usize, usize); 2] = [(5, 4), (5, 6)];

/// Parent anchor to child anchor pairs for nodes a child inherits
const RIGHT_CHILD_NODES: [(usize, usize); 5] = [(0, 6), (1, 5), (3, 1), (5, 0), (6, 4)];
const LEFT_CHILD_NODES: [(usize, usize); 5] = [(0, 4), (2, 5), (3, 2), (4, 6), (5, 0)];

/// Unit vector for one of eight compass headings, 45 degrees apart
///
/// Heading 0 points along `+y`, heading 2 along `+x`.
pub fn heading_vector(heading: u8) -> Vector2<f64> {
    let diagonal = std::f64::consts::FRAC_1_SQRT_2;
    match heading % 8 {
        0 => Vector2::new(0.0, 1.0),
        1 => Vector2::new(diagonal, diagonal),
        2 => Vector2::new(1.0, 0.0),
        3 => Vector2::new(diagonal, -diagonal),
        4 => Vector2::new(0.0, -1.0),
        5 => Vector2::new(-diagonal, -diagonal),
        6 => Vector2::new(-1.0, 0.0),
        _ => Vector2::new(-diagonal, diagonal),
    }
}

/// Neighbour relation, seen from a cell's tip looking at its hypotenuse
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Left,
    Right,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellId(usize);

impl CellId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
pub struct LebCell {
    pub level: usize,
    pub parent: Option<CellId>,
    pub left: Option<CellId>,
    pub right: Option<CellId>,
    pub tip: Vector2<f64>,
    pub side: f64,
    pub hypotenuse: f64,
    pub heading: u8,
    pub anchors: [Vector2<f64>; ANCHORS],
    pub grid: [NodeKey; ANCHORS],
}

impl LebCell {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }

    /// The three corners: tip and both ends of the hypotenuse
    pub fn corners(&self) -> [Vector2<f64>; 3] {
        [self.anchors[0], self.anchors[4], self.anchors[6]]
    }

    pub fn contains(&self, position: &Vector2<f64>) -> bool {
        let [a, b, c] = self.corners();
        let d1 = (b - a).perp(&(position - a));
        let d2 = (c - b).perp(&(position - b));
        let d3 = (a - c).perp(&(position - c));
        let has_negative = d1 < 0.0 || d2 < 0.0 || d3 < 0.0;
        let has_positive = d1 > 0.0 || d2 > 0.0 || d3 > 0.0;
        !(has_negative && has_positive)
    }
}

fn anchor_positions(tip: Vector2<f64>, side: f64, heading: u8) -> [Vector2<f64>; ANCHORS] {
    let hypotenuse = side * std::f64::consts::SQRT_2;
    let direction = heading_vector(heading);
    let clockwise = Rotation2::new(-FRAC_PI_4) * direction;
    let counter_clockwise = Rotation2::new(FRAC_PI_4) * direction;

    [
        tip,
        tip + clockwise * (side / 2.0),
        tip + counter_clockwise * (side / 2.0),
        tip + direction * (hypotenuse / 4.0),
        tip + counter_clockwise * side,
        tip + direction * (hypotenuse / 2.0),
        tip + clockwise * side,
    ]
}

/// A hierarchy of LEB cells whose anchors are nodes of a `Graph`
#[derive(Debug, Clone)]
pub struct LebTree {
    root_size: f64,
    cells: Vec<LebCell>,
}

impl Default for LebTree {
    fn default() -> Self {
        LebTree::new(DEFAULT_ROOT_SIZE)
    }
}

impl LebTree {
    pub fn new(root_size: f64) -> LebTree {
        LebTree {
            root_size,
            cells: Vec::new(),
        }
    }

    pub fn root_size(&self) -> f64 {
        self.root_size
    }

    pub fn root(&self) -> Option<CellId> {
        if self.cells.is_empty() {
            None
        } else {
            Some(CellId(0))
        }
    }

    pub fn cell(&self, id: CellId) -> Option<&LebCell> {
        self.cells.get(id.0)
    }

    pub fn cells(&self) -> &[LebCell] {
        &self.cells
    }

    pub fn leaves(&self) -> impl Iterator<Item = CellId> + '_ {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, cell)| cell.is_leaf())
            .map(|(i, _)| CellId(i))
    }

    fn get(&self, id: CellId) -> Result<&LebCell, FeldsparError> {
        self.cells
            .get(id.0)
            .ok_or_else(|| FeldsparError::Leb(format!("no cell with id {}", id.0)))
    }

    /// Creates the root cell with all seven nodes and twelve edges
    pub fn generate(&mut self, graph: &mut Graph) -> Result<CellId, FeldsparError> {
        if !self.cells.is_empty() {
            return Err(FeldsparError::Leb("tree already has a root".to_owned()));
        }

        let anchors = anchor_positions(Vector2::zeros(), self.root_size, ROOT_HEADING);
        let grid = anchors.map(|position| graph.add_node(position));

        for (a, b) in INTERNAL_EDGES.iter().chain(BORDER_EDGES.iter()) {
            graph.add_edge(grid[*a], grid[*b])?;
        }

        self.cells.push(LebCell {
            level: 0,
            parent: None,
            left: None,
            right: None,
            tip: Vector2::zeros(),
            side: self.root_size,
            hypotenuse: self.root_size * std::f64::consts::SQRT_2,
            heading: ROOT_HEADING,
            anchors,
            grid,
        });

        tracing::debug!("generated LEB root of size {}", self.root_size);
        Ok(CellId(0))
    }

    fn make_child(
        &self,
        graph: &mut Graph,
        parent_id: CellId,
        heading: u8,
        inherited: &[(usize, usize)],
        edge_node: usize,
    ) -> Result<LebCell, FeldsparError> {
        let parent = self.get(parent_id)?;
        let tip = parent.anchors[5];
        let side = parent.hypotenuse / 2.0;
        let anchors = anchor_positions(tip, side, heading);

        let mut grid: [Option<NodeKey>; ANCHORS] = [None; ANCHORS];
        for &(from, to) in inherited {
            grid[to] = Some(parent.grid[from]);
        }
        grid[CENTRE] = Some(graph.add_node(anchors[CENTRE]));
        grid[edge_node] = Some(graph.add_node(anchors[edge_node]));

        let mut resolved = [parent.grid[0]; ANCHORS];
        for (slot, key) in resolved.iter_mut().zip(grid) {
            *slot = key.ok_or_else(|| {
                FeldsparError::Leb("child cell is missing an anchor node".to_owned())
            })?;
        }

        for (a, b) in INTERNAL_EDGES {
            graph.add_edge(resolved[a], resolved[b])?;
        }

        Ok(LebCell {
            level: parent.level + 1,
            parent: Some(parent_id),
            left: None,
            right: None,
            tip,
            side,
            hypotenuse: side * std::f64::consts::SQRT_2,
            heading,
            anchors,
            grid: resolved,
        })
    }

    /// Splits a leaf cell into two children
    ///
    /// # Returns
    /// The left and right children, in that order
    pub fn subdivide(
        &mut self,
        id: CellId,
        graph: &mut Graph,
    ) -> Result<(CellId, CellId), FeldsparError> {
        let parent = self.get(id)?;
        if !parent.is_leaf() {
            return Err(FeldsparError::Leb(format!(
                "cell {} is already subdivided",
                id.0
            )));
        }
        let grid = parent.grid;
        let heading = parent.heading;

        // the graph is only touched once every anchor is known to be live
        if let Some(anchor) = grid.iter().position(|&key| graph.node(key).is_none()) {
            return Err(FeldsparError::Leb(format!(
                "cell {} lost its anchor node {anchor}",
                id.0
            )));
        }

        for edge in graph.incident_edges(grid[CENTRE]) {
            graph.remove_edge(edge);
        }
        for (a, b) in [(1, 5), (2, 5)].into_iter().chain(HYPOTENUSE_EDGES) {
            if let Some(edge) = graph.edge_between(grid[a], grid[b]) {
                graph.remove_edge(edge);
            }
        }

        let right = self.make_child(graph, id, (heading + 3) % 8, &RIGHT_CHILD_NODES, 2)?;
        let left = self.make_child(graph, id, (heading + 5) % 8, &LEFT_CHILD_NODES, 1)?;

        graph.add_edge(grid[0], grid[CENTRE])?;
        graph.add_edge(grid[CENTRE], grid[5])?;
        graph.add_edge(right.grid[0], right.grid[2])?;
        graph.add_edge(right.grid[2], right.grid[4])?;
        graph.add_edge(left.grid[0], left.grid[1])?;
        graph.add_edge(left.grid[1], left.grid[6])?;

        let left_id = CellId(self.cells.len());
        self.cells.push(left);
        let right_id = CellId(self.cells.len());
        self.cells.push(right);

        let parent = &mut self.cells[id.0];
        parent.left = Some(left_id);
        parent.right = Some(right_id);

        tracing::debug!(
            "subdivided LEB cell {} into {} and {}",
            id.0,
            left_id.0,
            right_id.0
        );
        Ok((left_id, right_id))
    }

    /// Finds the cell across one of the sides of `id`
    ///
    /// `None` when the neighbour is outside the tree or not subdivided far
    /// enough to have a cell of the same level there.
    pub fn find_adjacent(&self, id: CellId, direction: Direction) -> Option<CellId> {
        let cell = self.cells.get(id.0)?;
        let parent_id = cell.parent?;
        let parent = self.cells.get(parent_id.0)?;
        let is_left = parent.left == Some(id);

        match (direction, is_left) {
            (Direction::Left, true) => parent.right,
            (Direction::Left, false) => {
                let neighbour = self.find_adjacent(parent_id, Direction::Bottom)?;
                self.cells.get(neighbour.0)?.left
            }
            (Direction::Right, false) => parent.left,
            (Direction::Right, true) => {
                let neighbour = self.find_adjacent(parent_id, Direction::Bottom)?;
                self.cells.get(neighbour.0)?.right
            }
            (Direction::Bottom, true) => {
                let neighbour = self.find_adjacent(parent_id, Direction::Right)?;
                self.cells.get(neighbour.0)?.left
            }
            (Direction::Bottom, false) => {
                let neighbour = self.find_adjacent(parent_id, Direction::Left)?;
                self.cells.get(neighbour.0)?.right
            }
        }
    }

    /// The deepest cell containing `position`
    pub fn leaf_at(&self, position: &Vector2<f64>) -> Option<CellId> {
        let mut id = self.root()?;
        if !self.cells[id.0].contains(position) {
            return None;
        }

        loop {
            let cell = &self.cells[id.0];
            let (Some(left), Some(right)) = (cell.left, cell.right) else {
                return Some(id);
            };
            if self.cells[left.0].contains(position) {
                id = left;
            } else if self.cells[right.0].contains(position) {
                id = right;
            } else {
                return None;
            }
        }
    }

    /// Follows a string of `L` and `R` child choices from the root
    pub fn find_by_path(&self, path: &str) -> Result<CellId, FeldsparError> {
        let mut id = self
            .root()
            .ok_or_else(|| FeldsparError::Leb("tree has not been generated".to_owned()))?;

        for (depth, step) in path.chars().enumerate() {
            let cell = &self.cells[id.0];
            let child = match step {
                'L' | 'l' => cell.left,
                'R' | 'r' => cell.right,
                other => {
                    return Err(FeldsparError::Leb(format!(
                        "invalid path step '{other}' in \"{path}\""
                    )))
                }
            };
            id = child.ok_or_else(|| {
                FeldsparError::Leb(format!(
                    "path \"{path}\" runs past a leaf at depth {depth}"
                ))
            })?;
        }

        Ok(id)
    }
}
