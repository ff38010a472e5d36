pub mod constraint;
pub mod datatypes;
pub mod element;
pub mod error;
pub mod graph;
pub mod leb;
pub mod linalg;
pub mod mass_spring;
pub mod post_processor;
pub mod sandbox;
pub mod scene;
pub mod solver;

pub use datatypes::{Constraint, EdgeKey, NodeKey};
pub use error::FeldsparError;
pub use graph::Graph;
pub use sandbox::{Sandbox, SimulationMode, TickStatus};
pub use solver::{FemSolver, TickReport};
