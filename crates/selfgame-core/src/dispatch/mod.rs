//! Dynamic dispatch over the communication matrix.

pub mod dispatcher;
pub mod requirements;
pub mod scoring;

pub use dispatcher::{DispatchRecord, DispatchState, DynamicDispatcher};
pub use scoring::CandidateScore;
