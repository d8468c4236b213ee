//! Signal routing: which agent may talk to which.
//!
//! - [`InteractionGraph`]: agents with allowed and forbidden edge sets
//! - [`CommunicationMatrix`]: read-only adjacency queries
//! - [`SignalRouter`]: forbidden-path policy, validation, conflict report

pub mod graph;
pub mod matrix;
pub mod policy;
pub mod router;

pub use graph::InteractionGraph;
pub use matrix::CommunicationMatrix;
pub use router::{EdgeSet, RoutedGraph, RoutingConflict, SignalRouter};
