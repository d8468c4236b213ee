//! Role graph construction: executors from a role proposer (or the minimal
//! fallback set), their permissions and prompts, plus the requester.

pub mod builder;
pub mod fallback;

pub use builder::{validate_agents, RoleGraphBuilder};
