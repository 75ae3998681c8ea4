pub mod graph;
pub mod node;

pub use graph::{DependencyGraph, DependencyTrackingLevel};
pub use node::{CondEdge, DependencyNode, Edge, NodeId};
