//! Domain model (ids, lifecycle state).

pub mod ids;
pub mod state;

pub use ids::RequestId;
pub use state::WorkerState;
